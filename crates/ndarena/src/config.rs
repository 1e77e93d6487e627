// EngineConfig: how the engine builds its backend and picks devices
//
// Built either with the `with_*` methods or from the environment:
//
//   NDARENA_DEFAULT_DEVICE   context text, e.g. `cpu`, `gpu(1)`
//   NDARENA_GPUS             number of simulated GPU devices
//   NDARENA_DEVICE_CAPACITY  per-device byte limit
//
// Unset variables keep their defaults; set but unparsable variables are an
// invalid-argument error.

use std::str::FromStr;

use ndarena_core::{Context, Error, Result};

pub const ENV_DEFAULT_DEVICE: &str = "NDARENA_DEFAULT_DEVICE";
pub const ENV_GPUS: &str = "NDARENA_GPUS";
pub const ENV_DEVICE_CAPACITY: &str = "NDARENA_DEVICE_CAPACITY";

/// Engine construction settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Device used when callers do not name one. `None` picks `gpu(0)` if a
    /// GPU exists, else `cpu(0)`.
    pub default_device: Option<Context>,
    /// Simulated GPU devices on the host backend.
    pub gpus: usize,
    /// Per-device byte limit; `None` is unbounded.
    pub device_capacity: Option<usize>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default device.
    pub fn with_default_device(mut self, context: Context) -> Self {
        self.default_device = Some(context);
        self
    }

    /// Set the number of simulated GPUs.
    pub fn with_gpus(mut self, gpus: usize) -> Self {
        self.gpus = gpus;
        self
    }

    /// Set the per-device byte limit.
    pub fn with_device_capacity(mut self, bytes: usize) -> Self {
        self.device_capacity = Some(bytes);
        self
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(device) = parse_var::<Context>(&lookup, ENV_DEFAULT_DEVICE)? {
            config.default_device = Some(device);
        }
        if let Some(gpus) = parse_var::<usize>(&lookup, ENV_GPUS)? {
            config.gpus = gpus;
        }
        if let Some(bytes) = parse_var::<usize>(&lookup, ENV_DEVICE_CAPACITY)? {
            config.device_capacity = Some(bytes);
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| Error::InvalidArgument(format!("{key}: cannot parse '{raw}'")))
}
