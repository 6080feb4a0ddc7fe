pub mod config;
pub mod error;
pub mod event_loop;
pub mod kubernetes;
pub mod occupancy;
pub mod proxy;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;
