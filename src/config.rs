use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ClockKind {
    /// Coarse clock refined by counting busy-loop increments up to the next edge
    Interpolation,
    /// Counter incremented by a dedicated background thread
    SharedCounter,
}

impl ClockKind {
    pub fn name(&self) -> &'static str {
        match self {
            ClockKind::Interpolation => "interpolation",
            ClockKind::SharedCounter => "shared-counter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CoarseSource {
    /// CLOCK_MONOTONIC_COARSE (scheduler tick resolution)
    Kernel,
    /// CLOCK_MONOTONIC truncated to `resolution_ns`
    Quantized,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub repetitions: usize,
    /// Target cache capacity in bytes.
    pub cache_size: usize,
    /// Eviction buffer size in bytes; must exceed `cache_size`.
    pub eviction_set_size: usize,
    pub prime_rounds: u32,
    pub warm_repetitions: u32,
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            repetitions: 1000,
            cache_size: 32 * 1024 * 1024,
            eviction_set_size: 64 * 1024 * 1024,
            prime_rounds: 3,
            warm_repetitions: crate::cache::DEFAULT_WARM_REPETITIONS,
            seed: None,
        }
    }
}

impl SessionConfig {
    /// Clamp tuning knobs to valid ranges and reject configurations that
    /// cannot produce a meaningful session.
    pub fn validate(&mut self) -> Result<(), Error> {
        self.prime_rounds = self.prime_rounds.clamp(1, 16);
        self.warm_repetitions = self.warm_repetitions.clamp(1, 1_000_000);

        if self.repetitions == 0 {
            return Err(Error::InvalidConfig(
                "repetitions must be greater than 0".into(),
            ));
        }
        if self.eviction_set_size <= self.cache_size {
            return Err(Error::InvalidConfig(format!(
                "eviction set size ({}B) must exceed cache size ({}B)",
                self.eviction_set_size, self.cache_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub coarse: CoarseSource,
    pub resolution_ns: u64,
    pub counter_region_bytes: usize,
    pub counter_startup_timeout_ms: u64,
    pub shared_counter: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            coarse: CoarseSource::Quantized,
            resolution_ns: 100_000,
            counter_region_bytes: 64,
            counter_startup_timeout_ms: 1000,
            shared_counter: true,
        }
    }
}

impl ClockConfig {
    /// Clamp fields to valid ranges. The counter region is rounded up to a
    /// whole number of 8-byte words.
    pub fn validate(&mut self) {
        self.resolution_ns = self.resolution_ns.clamp(1, 1_000_000_000);
        self.counter_region_bytes = (self.counter_region_bytes.clamp(8, 4096) + 7) & !7;
        self.counter_startup_timeout_ms = self.counter_startup_timeout_ms.clamp(10, 60_000);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub clock: ClockConfig,
}

/// Load configuration from a TOML file.
///
/// - If `explicit_path` is `Some` and the file is missing, returns an error.
/// - If `explicit_path` is `None`, tries `/etc/cachetimer.toml`; if missing, returns defaults.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config, Error> {
    let path = match explicit_path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::InvalidArgs(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let default = Path::new("/etc/cachetimer.toml");
            if !default.exists() {
                return Ok(Config::default());
            }
            default.to_path_buf()
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgs(format!("failed to read config {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| {
        Error::InvalidArgs(format!("failed to parse config {}: {}", path.display(), e))
    })?;

    Ok(config)
}
