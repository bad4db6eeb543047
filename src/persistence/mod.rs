//! Persistence Layer for Run Artifacts
//!
//! This module provides the file-backed sinks of a training run:
//! - Run identity, directory layout, metadata snapshot and latest-run pointer
//! - Schema-checked per-episode metrics CSV
//! - Per-update JSON-lines event log

pub mod metrics_log;
pub mod run;
pub mod update_log;

pub use metrics_log::{metrics_header, MetricsLog, MetricsRow, LEGACY_SUFFIX, METRICS_COLUMNS};
pub use run::RunContext;
pub use update_log::{UpdateLog, UpdateRecord};
