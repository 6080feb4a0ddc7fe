pub mod cache;
pub mod models;
pub mod reconciler;
pub mod scaler;
pub mod watcher;
