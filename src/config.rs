//! Configuration System
//!
//! Loads `SchedulerConfig` from environment variables prefixed
//! `TENSORSCHED_`, falling back to `SchedulerConfig::default()` when unset.
//! This is the typed replacement for the scattered `DEBUG`/`FUSE_ARANGE`-
//! style env-var reads the system this crate is modeled on does at every
//! call site.
//!
//! ## Example
//!
//! ```bash
//! TENSORSCHED_DEBUG_LEVEL=2 TENSORSCHED_FUSE_ARANGE=true cargo run --bin schedule-dump
//! ```

use figment::providers::Env;
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// 0 = silent, 1 = summary info log per schedule, 2 = per-demotion debug events.
    #[serde(default)]
    pub debug_level: u8,

    /// Allow the arange-fusion heuristic to skip realizing a reduce whose
    /// output is immediately consumed by an arange-shaped elementwise chain.
    #[serde(default)]
    pub fuse_arange: bool,

    /// Allow a conv-backward double reduce to merge into one kernel.
    #[serde(default)]
    pub fuse_conv_bw: bool,

    /// Skip realizing an EXPAND whose only consumer can absorb it directly.
    #[serde(default)]
    pub dont_realize_expand: bool,

    /// Capture `(sink, var_vals, ast)` per kernel into the in-memory
    /// process-replay cache (see `schedule::replay_cache`).
    #[serde(default)]
    pub capture_process_replay: bool,

    /// Emit a `tracing` event per schedule suitable for a graph visualizer
    /// to consume; this crate does not ship a visualizer itself.
    #[serde(default)]
    pub viz: bool,

    /// Device name stamped onto freshly injected buffers.
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_device() -> String {
    "CPU".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            debug_level: 0,
            fuse_arange: false,
            fuse_conv_bw: false,
            dont_realize_expand: false,
            capture_process_replay: false,
            viz: false,
            device: default_device(),
        }
    }
}

impl SchedulerConfig {
    /// Load from `TENSORSCHED_*` environment variables, falling back to
    /// `Self::default()` for anything unset.
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(SchedulerConfig::default()))
            .merge(Env::prefixed("TENSORSCHED_"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fully_conservative() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.debug_level, 0);
        assert!(!cfg.fuse_arange);
        assert!(!cfg.fuse_conv_bw);
        assert_eq!(cfg.device, "CPU");
    }

    #[test]
    fn from_env_falls_back_to_default_when_unset() {
        // Relies on no TENSORSCHED_* vars being set in the test environment.
        let cfg = SchedulerConfig::from_env().expect("figment extraction should succeed with defaults");
        assert_eq!(cfg, SchedulerConfig::default());
    }
}
