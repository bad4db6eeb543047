pub mod adapters;
pub mod config;
pub mod error;
pub mod persistence;
pub mod rl;

pub use adapters::BridgeServer;
pub use config::AppConfig;
pub use error::{Result, TrainerError};
pub use persistence::RunContext;
pub use rl::{Role, Trainer};
