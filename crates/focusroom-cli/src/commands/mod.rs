pub mod config;
pub mod daemon;
pub mod history;
pub mod recover;
pub mod stats;
pub mod timer;
