use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default ceiling on the number of transcript points one ROI may select.
pub const MAX_TRANSCRIPT_POINTS_LIMIT: usize = 100_000;

/// Number of tiles decoded concurrently; batches run one after another.
pub const TILE_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub max_transcript_points: usize,
    pub tile_batch_size: usize,
    /// Collapse matched points that share an exact position.
    pub dedupe_positions: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_transcript_points: MAX_TRANSCRIPT_POINTS_LIMIT,
            tile_batch_size: TILE_BATCH_SIZE,
            dedupe_positions: true,
        }
    }
}

impl DetectionConfig {
    /// Defaults overridden by `ROI_MAX_TRANSCRIPT_POINTS`,
    /// `ROI_TILE_BATCH_SIZE` and `ROI_DEDUPE_POSITIONS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_transcript_points: env_var_usize(
                "ROI_MAX_TRANSCRIPT_POINTS",
                d.max_transcript_points,
            ),
            tile_batch_size: env_var_usize("ROI_TILE_BATCH_SIZE", d.tile_batch_size).max(1),
            dedupe_positions: env_var_bool("ROI_DEDUPE_POSITIONS", d.dedupe_positions),
        }
    }

    pub fn with_limit(max_transcript_points: usize) -> Self {
        Self {
            max_transcript_points,
            ..Self::default()
        }
    }
}

pub fn env_var_usize(name: &str, default: usize) -> usize {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring {name}={raw:?}: not a non-negative integer");
            default
        }),
        Err(_) => default,
    }
}

pub fn env_var_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warn!("ignoring {name}={raw:?}: not a boolean");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let c = DetectionConfig::default();
        assert_eq!(c.max_transcript_points, MAX_TRANSCRIPT_POINTS_LIMIT);
        assert_eq!(c.tile_batch_size, 20);
        assert!(c.dedupe_positions);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c: DetectionConfig = serde_json::from_str(r#"{"max_transcript_points": 5}"#).unwrap();
        assert_eq!(c.max_transcript_points, 5);
        assert_eq!(c.tile_batch_size, TILE_BATCH_SIZE);
    }

    #[test]
    fn unset_env_vars_use_defaults() {
        assert_eq!(env_var_usize("ROI_TEST_SURELY_UNSET_USIZE", 7), 7);
        assert!(env_var_bool("ROI_TEST_SURELY_UNSET_BOOL", true));
    }
}
