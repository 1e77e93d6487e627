use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Kind of compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device binding for arrays and managers: device kind plus index.
///
/// Contexts are plain values. Whether the device actually exists is decided
/// by the backend when the context is resolved, not when it is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Context {
    kind: DeviceKind,
    index: usize,
}

impl Context {
    pub const fn new(kind: DeviceKind, index: usize) -> Self {
        Self { kind, index }
    }

    /// `cpu(0)`.
    pub const fn cpu() -> Self {
        Self::new(DeviceKind::Cpu, 0)
    }

    /// `gpu(0)`.
    pub const fn gpu() -> Self {
        Self::new(DeviceKind::Gpu, 0)
    }

    pub const fn gpu_at(index: usize) -> Self {
        Self::new(DeviceKind::Gpu, index)
    }

    pub const fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub fn is_gpu(&self) -> bool {
        self.kind == DeviceKind::Gpu
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.index)
    }
}

/// Accepts `cpu`, `gpu`, `cpu(0)`, `gpu(1)` and `gpu:1`, ignoring case.
impl FromStr for Context {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("invalid device context '{s}'"));
        let text = s.trim().to_ascii_lowercase();

        let (kind, rest) = if let Some(rest) = text.strip_prefix("cpu") {
            (DeviceKind::Cpu, rest)
        } else if let Some(rest) = text.strip_prefix("gpu") {
            (DeviceKind::Gpu, rest)
        } else {
            return Err(invalid());
        };

        let index = if rest.is_empty() {
            "0"
        } else if let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            inner
        } else if let Some(inner) = rest.strip_prefix(':') {
            inner
        } else {
            return Err(invalid());
        };

        let index = index.trim().parse::<usize>().map_err(|_| invalid())?;
        Ok(Context::new(kind, index))
    }
}
