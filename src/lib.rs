pub mod constants;
pub mod difficulty;
pub mod host;
pub mod policy;
pub mod runtime;
pub mod sandbox;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod tracker;
pub mod types;
pub mod wipe;
