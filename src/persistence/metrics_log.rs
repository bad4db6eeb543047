//! Per-episode metrics CSV with a fixed column schema.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, TrainerError};

/// Column order of `metrics.csv`
pub const METRICS_COLUMNS: [&str; 21] = [
    "episode",
    "episode_id",
    "reward_mean",
    "reward_sum",
    "steps",
    "updates",
    "advantage_mean",
    "advantage_std",
    "policy_loss",
    "value_loss",
    "seeker_reward_sum",
    "seeker_reward_mean",
    "seeker_steps",
    "seeker_avg_distance",
    "hider_reward_sum",
    "hider_reward_mean",
    "hider_steps",
    "hider_avg_distance",
    "winner",
    "terminal_reason",
    "duration_sec",
];

/// Suffix appended to a metrics file whose header no longer matches
pub const LEGACY_SUFFIX: &str = ".legacy";

pub fn metrics_header() -> String {
    METRICS_COLUMNS.join(",")
}

/// One completed episode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsRow {
    pub episode: u64,
    pub episode_id: i64,
    pub reward_mean: f32,
    pub reward_sum: f32,
    pub steps: usize,
    /// Successful role updates so far
    pub updates: u64,
    pub advantage_mean: f32,
    pub advantage_std: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub seeker_reward_sum: f32,
    pub seeker_reward_mean: f32,
    pub seeker_steps: usize,
    pub seeker_avg_distance: f32,
    pub hider_reward_sum: f32,
    pub hider_reward_mean: f32,
    pub hider_steps: usize,
    pub hider_avg_distance: f32,
    pub winner: String,
    pub terminal_reason: String,
    pub duration_sec: f64,
}

impl MetricsRow {
    pub fn to_csv_line(&self) -> String {
        [
            self.episode.to_string(),
            self.episode_id.to_string(),
            self.reward_mean.to_string(),
            self.reward_sum.to_string(),
            self.steps.to_string(),
            self.updates.to_string(),
            self.advantage_mean.to_string(),
            self.advantage_std.to_string(),
            self.policy_loss.to_string(),
            self.value_loss.to_string(),
            self.seeker_reward_sum.to_string(),
            self.seeker_reward_mean.to_string(),
            self.seeker_steps.to_string(),
            self.seeker_avg_distance.to_string(),
            self.hider_reward_sum.to_string(),
            self.hider_reward_mean.to_string(),
            self.hider_steps.to_string(),
            self.hider_avg_distance.to_string(),
            csv_field(&self.winner),
            csv_field(&self.terminal_reason),
            self.duration_sec.to_string(),
        ]
        .join(",")
    }
}

/// Free-text fields come from the client; commas and quotes are escaped
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Append-only metrics log
#[derive(Debug, Clone)]
pub struct MetricsLog {
    path: PathBuf,
}

impl MetricsLog {
    /// Open the log, migrating a file with a stale header aside.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let header = metrics_header();

        if path.exists() {
            let existing = read_first_line(&path).unwrap_or_default();
            if existing.trim_end() == header {
                return Ok(Self { path });
            }
            let backup = legacy_path(&path);
            fs::rename(&path, &backup).map_err(|e| TrainerError::persistence(&path, e))?;
            warn!(
                path = ?path,
                backup = ?backup,
                "metrics header changed; moved old log aside"
            );
        }

        fs::write(&path, format!("{}\n", header)).map_err(|e| TrainerError::persistence(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, row: &MetricsRow) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| TrainerError::persistence(&self.path, e))?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", row.to_csv_line())
            .and_then(|_| writer.flush())
            .map_err(|e| TrainerError::persistence(&self.path, e))
    }
}

fn legacy_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(LEGACY_SUFFIX);
    PathBuf::from(name)
}

fn read_first_line(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_new_log_gets_header() {
        let dir = tempdir().unwrap();
        let log = MetricsLog::open(dir.path().join("metrics.csv")).unwrap();
        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, format!("{}\n", metrics_header()));
    }

    #[test]
    fn test_matching_header_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let log = MetricsLog::open(&path).unwrap();
        log.append(&MetricsRow::default()).unwrap();

        MetricsLog::open(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(!legacy_path(&path).exists());
    }

    #[test]
    fn test_stale_header_moves_to_legacy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        fs::write(&path, "episode,reward\n1,2.0\n").unwrap();

        MetricsLog::open(&path).unwrap();
        let legacy = dir.path().join("metrics.csv.legacy");
        assert_eq!(fs::read_to_string(&legacy).unwrap(), "episode,reward\n1,2.0\n");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}\n", metrics_header())
        );
    }

    #[test]
    fn test_row_has_every_column() {
        let row = MetricsRow {
            episode: 3,
            episode_id: 17,
            winner: "seeker".into(),
            terminal_reason: "caught, early".into(),
            ..Default::default()
        };
        let line = row.to_csv_line();
        assert!(line.starts_with("3,17,"));
        assert!(line.contains(",seeker,\"caught, early\","));
        assert_eq!(
            row.to_csv_line().split(',').count(),
            METRICS_COLUMNS.len() + 1
        );
        let plain = MetricsRow::default().to_csv_line();
        assert_eq!(plain.split(',').count(), METRICS_COLUMNS.len());
    }
}
