pub mod publisher;
pub mod synthesizer;
