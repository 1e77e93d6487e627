use std::fmt;

use crate::context::{Context, DeviceKind};
use crate::error::{Error, Result};

// Backend: the native buffer interface
//
// The core never touches array memory itself. Every buffer is allocated,
// written, read and freed through a Backend, addressed by an opaque
// BufferHandle. A backend may keep buffers in host memory, on a GPU, or
// behind an FFI boundary; the manager and array code only see handles.
//
// Managers hold the backend as `Arc<dyn Backend>` so the process-wide system
// manager can be created once without the whole crate becoming generic over
// the backend type.

/// Opaque reference to a backend buffer.
///
/// A handle is owned by exactly one array at a time, so it is neither `Clone`
/// nor `Copy`. Passing it to [`Backend::free`] consumes it.
#[derive(PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

impl BufferHandle {
    /// Wrap a backend-specific identifier. Only backends should call this.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Bytes in use on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    /// Bytes held by live buffers.
    pub used: usize,
    /// Highest `used` value observed.
    pub peak: usize,
    /// Device capacity, `None` when unbounded.
    pub capacity: Option<usize>,
}

impl MemoryUsage {
    /// Bytes still available, `None` when unbounded.
    pub fn available(&self) -> Option<usize> {
        self.capacity.map(|c| c.saturating_sub(self.used))
    }
}

/// The handle-based interface every buffer provider implements.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short backend name, e.g. `"host"`.
    fn name(&self) -> &str;

    /// Number of devices of `kind` this backend can allocate on.
    fn device_count(&self, kind: DeviceKind) -> usize;

    /// Allocate a zero-filled buffer of `n_bytes` on `context`.
    fn allocate(&self, n_bytes: usize, context: &Context) -> Result<BufferHandle>;

    /// Release a buffer. The handle is consumed.
    fn free(&self, handle: BufferHandle) -> Result<()>;

    /// Overwrite the whole buffer. `bytes` must match the allocated size.
    fn write(&self, handle: &BufferHandle, bytes: &[u8]) -> Result<()>;

    /// Copy the whole buffer out.
    fn read(&self, handle: &BufferHandle) -> Result<Vec<u8>>;

    /// Current memory accounting for `context`.
    fn memory_usage(&self, context: &Context) -> Result<MemoryUsage>;

    /// Check that `context` names an existing device.
    fn validate(&self, context: &Context) -> Result<()> {
        let available = self.device_count(context.kind());
        if context.index() < available {
            Ok(())
        } else {
            Err(Error::DeviceUnavailable {
                context: *context,
                available,
            })
        }
    }
}
