//! # ndarena-host
//!
//! Host-memory [`Backend`] for ndarena.
//!
//! Buffers are plain zero-initialised byte boxes kept in a table keyed by
//! handle id. Device `cpu(0)` always exists; `gpu(i)` devices can be
//! simulated with [`HostBackend::with_gpus`] so device resolution and
//! per-device accounting can be exercised without a driver. An optional
//! per-device capacity makes allocations fail with `OutOfMemory` once it is
//! exceeded.
//!
//! ```ignore
//! let backend = Arc::new(HostBackend::new().with_gpus(2).with_capacity(1 << 20));
//! let root = NDManager::new_root(backend, Context::cpu())?;
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, trace};

use ndarena_core::backend::{Backend, BufferHandle, MemoryUsage};
use ndarena_core::context::{Context, DeviceKind};
use ndarena_core::error::{Error, Result};

/// Backend that keeps every buffer in process memory.
#[derive(Debug, Default)]
pub struct HostBackend {
    gpus: usize,
    capacity: Option<usize>,
    state: Mutex<HostState>,
}

#[derive(Debug, Default)]
struct HostState {
    next_id: u64,
    buffers: HashMap<u64, HostBuffer>,
    usage: HashMap<Context, MemoryUsage>,
}

#[derive(Debug)]
struct HostBuffer {
    context: Context,
    data: Box<[u8]>,
}

impl HostBackend {
    /// A backend with one CPU device and no GPUs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `n` simulated GPU devices, `gpu(0)` to `gpu(n - 1)`.
    pub fn with_gpus(mut self, n: usize) -> Self {
        self.gpus = n;
        self
    }

    /// Limit every device to `bytes` of live buffers.
    pub fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity = Some(bytes);
        self
    }

    /// Number of buffers currently allocated across all devices.
    pub fn live_buffers(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Bytes currently allocated across all devices.
    pub fn live_bytes(&self) -> usize {
        self.lock().usage.values().map(|u| u.used).sum()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn empty_usage(&self) -> MemoryUsage {
        MemoryUsage {
            capacity: self.capacity,
            ..MemoryUsage::default()
        }
    }
}

impl Backend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn device_count(&self, kind: DeviceKind) -> usize {
        match kind {
            DeviceKind::Cpu => 1,
            DeviceKind::Gpu => self.gpus,
        }
    }

    fn allocate(&self, n_bytes: usize, context: &Context) -> Result<BufferHandle> {
        self.validate(context)?;
        let empty = self.empty_usage();
        let mut state = self.lock();

        let usage = state.usage.entry(*context).or_insert(empty);
        if let Some(available) = usage.available() {
            if n_bytes > available {
                return Err(Error::OutOfMemory {
                    context: *context,
                    requested: n_bytes,
                    available,
                });
            }
        }
        usage.used += n_bytes;
        usage.peak = usage.peak.max(usage.used);

        let id = state.next_id;
        state.next_id += 1;
        state.buffers.insert(
            id,
            HostBuffer {
                context: *context,
                data: vec![0u8; n_bytes].into_boxed_slice(),
            },
        );
        debug!("[host:{context}] alloc %{id} {n_bytes} bytes");
        Ok(BufferHandle::from_raw(id))
    }

    fn free(&self, handle: BufferHandle) -> Result<()> {
        let id = handle.raw();
        let mut state = self.lock();
        let buffer = state.buffers.remove(&id).ok_or(Error::UnknownHandle(id))?;
        if let Some(usage) = state.usage.get_mut(&buffer.context) {
            usage.used -= buffer.data.len();
        }
        debug!("[host:{}] free %{id}", buffer.context);
        Ok(())
    }

    fn write(&self, handle: &BufferHandle, bytes: &[u8]) -> Result<()> {
        let id = handle.raw();
        let mut state = self.lock();
        let buffer = state
            .buffers
            .get_mut(&id)
            .ok_or(Error::UnknownHandle(id))?;
        if buffer.data.len() != bytes.len() {
            return Err(Error::ByteLengthMismatch {
                expected: buffer.data.len(),
                got: bytes.len(),
            });
        }
        buffer.data.copy_from_slice(bytes);
        trace!("[host:{}] write %{id} {} bytes", buffer.context, bytes.len());
        Ok(())
    }

    fn read(&self, handle: &BufferHandle) -> Result<Vec<u8>> {
        let id = handle.raw();
        let state = self.lock();
        let buffer = state.buffers.get(&id).ok_or(Error::UnknownHandle(id))?;
        Ok(buffer.data.to_vec())
    }

    fn memory_usage(&self, context: &Context) -> Result<MemoryUsage> {
        self.validate(context)?;
        let empty = self.empty_usage();
        Ok(self.lock().usage.get(context).copied().unwrap_or(empty))
    }
}
