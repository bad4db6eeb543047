use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::rl::config::{PPOConfig, TrainingConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ppo: PPOConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the WebSocket bridge
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port (0 picks a free port)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

/// Environment flags recorded in the run metadata when set
pub const DEFAULT_METADATA_ENV_KEYS: [&str; 12] = [
    "TRAIN_APPROACH",
    "TRAIN_VARIANT",
    "TRAIN_RUN_ID",
    "AI_IS_IT",
    "AI_CONTROL_ALL_AGENTS",
    "AI_DISTANCE_REWARD_SCALE",
    "AI_SEEKER_TIME_PENALTY",
    "AI_WIN_BONUS",
    "AI_MAX_STEPS_PER_EPISODE",
    "AI_STEP_TICK_INTERVAL",
    "SELF_PLAY_ROUNDS",
    "SELF_PLAY_DURATION",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root directory of all runs
    #[serde(default = "default_logs_root")]
    pub logs_root: PathBuf,
    /// Directory of `policy_<role>.mpk` and the legacy `policy.mpk`
    #[serde(default = "default_policy_dir")]
    pub policy_dir: PathBuf,
    /// Approach label grouping related runs
    #[serde(default = "default_approach")]
    pub approach: String,
    /// Run id; a `%Y%m%d_%H%M%S` timestamp when unset
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default = "default_metadata_env_keys")]
    pub metadata_env_keys: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            logs_root: default_logs_root(),
            policy_dir: default_policy_dir(),
            approach: default_approach(),
            run_id: None,
            metadata_env_keys: default_metadata_env_keys(),
        }
    }
}

fn default_logs_root() -> PathBuf {
    PathBuf::from("logs")
}

fn default_policy_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_approach() -> String {
    "default".to_string()
}

fn default_metadata_env_keys() -> Vec<String> {
    DEFAULT_METADATA_ENV_KEYS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/selfplay.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TAG_TRAINER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TAG_TRAINER__PPO__LR, etc.)
            .add_source(
                Environment::with_prefix("TAG_TRAINER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let ppo = &self.ppo;

        if !(0.0..=1.0).contains(&ppo.gamma) {
            errors.push(format!("ppo.gamma must be within [0, 1], got {}", ppo.gamma));
        }
        if !(0.0..=1.0).contains(&ppo.gae_lambda) {
            errors.push(format!(
                "ppo.gae_lambda must be within [0, 1], got {}",
                ppo.gae_lambda
            ));
        }
        if ppo.clip_ratio <= 0.0 || ppo.clip_ratio >= 1.0 {
            errors.push("ppo.clip_ratio must be between 0 and 1".to_string());
        }
        if ppo.lr <= 0.0 {
            errors.push("ppo.lr must be positive".to_string());
        }
        if ppo.target_kl <= 0.0 {
            errors.push("ppo.target_kl must be positive".to_string());
        }
        if ppo.hidden_dim == 0 {
            errors.push("ppo.hidden_dim must be positive".to_string());
        }
        if self.training.batch_target == 0 {
            errors.push("training.batch_target must be positive".to_string());
        }
        if self.training.action_cache_capacity == 0 {
            errors.push("training.action_cache_capacity must be positive".to_string());
        }
        if self.run.approach.trim().is_empty() {
            errors.push("run.approach must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_from_empty_dir() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.training.batch_target, 2048);
        assert_eq!(config.training.max_checkpoints, 8);
        assert_eq!(config.ppo.train_iters, 80);
        assert_eq!(config.run.approach, "default");
        assert!(config.run.run_id.is_none());
        assert_eq!(config.run.metadata_env_keys.len(), 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[training]\nbatch_target = 64\nmax_checkpoints = 0\n\n[ppo]\ntarget_kl = 0.02\n\n[run]\napproach = \"curriculum\"\n",
        )
        .unwrap();
        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.training.batch_target, 64);
        assert_eq!(config.training.max_checkpoints, 0);
        assert!((config.ppo.target_kl - 0.02).abs() < 1e-9);
        assert!((config.ppo.gamma - 0.99).abs() < 1e-6);
        assert_eq!(config.run.approach, "curriculum");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.ppo.gamma = 1.5;
        config.training.batch_target = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
