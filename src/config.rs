//! Daemon configuration.
//!
//! `{data_dir}/config.toml` — all fields are optional overrides.
//! Priority: CLI / env var  >  TOML  >  built-in default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
const DEFAULT_REQUEST_TTL_HOURS: i64 = 24;

// ─── SchedulerConfig ─────────────────────────────────────────────────────────

/// Scheduler configuration (`[scheduler]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks (recurrence + overdue sweep).
    /// Default: 60. Sensible range is 60–300.
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
        }
    }
}

// ─── DeletionConfig ──────────────────────────────────────────────────────────

/// Bulk-deletion quorum configuration (`[deletion]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeletionConfig {
    /// Hours before a pending request expires (lazy, observed on next
    /// access). Default: 24.
    pub request_ttl_hours: i64,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            request_ttl_hours: DEFAULT_REQUEST_TTL_HOURS,
        }
    }
}

// ─── ScoringConfig ───────────────────────────────────────────────────────────

/// KPI point table (`[scoring]` in config.toml). Defaults mirror the
/// standard table; all values are tunable per deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Completed ≥ 24h before due. Default: +2.
    pub assignee_early: i64,
    /// Completed within ±24h of due. Default: +1.
    pub assignee_ontime: i64,
    /// Completed ≥ 24h after due. Default: −1.
    pub assignee_late: i64,
    /// Still open past the penalty window. Default: −2.
    pub penalty_overdue: i64,
    /// Creator credit for any completion. Default: +1.
    pub creator_completion: i64,
    /// Creator bonus when the completion was punctual. Default: +1.
    pub creator_ontime_bonus: i64,
    /// Consecutive punctual completions per streak bonus. Default: 3.
    pub streak_length: u32,
    /// Points per streak bonus. Default: +3.
    pub streak_bonus: i64,
    /// Hours past due before the overdue penalty fires. Default: 48.
    pub overdue_penalty_after_hours: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            assignee_early: 2,
            assignee_ontime: 1,
            assignee_late: -1,
            penalty_overdue: -2,
            creator_completion: 1,
            creator_ontime_bonus: 1,
            streak_length: 3,
            streak_bonus: 3,
            overdue_penalty_after_hours: 48,
        }
    }
}

// ─── TOML config file ────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Log level filter string, e.g. "debug", "info,taskhive=trace".
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    /// Scheduler configuration (`[scheduler]`).
    scheduler: Option<SchedulerConfig>,
    /// Deletion quorum configuration (`[deletion]`).
    deletion: Option<DeletionConfig>,
    /// KPI point table (`[scoring]`).
    scoring: Option<ScoringConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── HiveConfig ──────────────────────────────────────────────────────────────

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct HiveConfig {
    pub data_dir: PathBuf,
    pub log: String,
    pub log_format: String,
    pub scheduler: SchedulerConfig,
    pub deletion: DeletionConfig,
    pub scoring: ScoringConfig,
}

impl HiveConfig {
    /// Merge the TOML file over built-in defaults. CLI/env overrides are
    /// applied by the binary after this.
    pub fn load(data_dir: PathBuf) -> Self {
        let toml_cfg = load_toml(&data_dir).unwrap_or_default();
        Self {
            data_dir,
            log: toml_cfg.log.unwrap_or_else(|| "info".to_string()),
            log_format: toml_cfg.log_format.unwrap_or_else(|| "pretty".to_string()),
            scheduler: toml_cfg.scheduler.unwrap_or_default(),
            deletion: toml_cfg.deletion.unwrap_or_default(),
            scoring: toml_cfg.scoring.unwrap_or_default(),
        }
    }

    pub fn default_data_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskhive")
    }
}
