//! Training Infrastructure
//!
//! Episode aggregation, checkpointing, and the online trainer.

pub mod checkpointing;
pub mod episode;
pub mod trainer;

pub use checkpointing::CheckpointManager;
pub use episode::{EpisodeInfo, EpisodeStats, EpisodeSummary, RoleSummary};
pub use trainer::{
    ActionDecision, ActionSource, IngestReport, RoleUpdate, RoundDiagnostics, Trainer,
    TrainerSinks, TransitionReport, UpdateSummary,
};
