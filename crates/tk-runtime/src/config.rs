use std::env;

use log::warn;

/// Environment variable enabling per-call kernel timing.
pub const ENV_ENABLE_PROFILING: &str = "TK_ENABLE_PROFILING";
/// Environment variable setting the reduction region alignment in bytes.
pub const ENV_WORKSPACE_ALIGNMENT: &str = "TK_WORKSPACE_ALIGNMENT";

/// Execution settings fixed at handle creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Record kernel time for every operator call.
    pub profiling: bool,
    /// Byte alignment of the second ping-pong region inside a reduction
    /// workspace. `1` packs the regions back to back.
    pub region_alignment: usize,
    /// Largest work-group (product of local sizes) a launch may use.
    pub max_local_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            profiling: false,
            region_alignment: 1,
            max_local_size: 1024,
        }
    }
}

impl ExecutionConfig {
    /// Defaults overridden by `TK_ENABLE_PROFILING` and
    /// `TK_WORKSPACE_ALIGNMENT`. Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_ENABLE_PROFILING) {
            match parse_bool(&raw) {
                Some(v) => config.profiling = v,
                None => warn!("ignoring {ENV_ENABLE_PROFILING}={raw:?}: expected a boolean"),
            }
        }

        if let Some(raw) = lookup(ENV_WORKSPACE_ALIGNMENT) {
            match raw.trim().parse::<usize>() {
                Ok(v) if v > 0 => config.region_alignment = v,
                _ => warn!("ignoring {ENV_WORKSPACE_ALIGNMENT}={raw:?}: expected a positive byte count"),
            }
        }

        config
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
