pub mod autoscaler;
pub mod tracker;
