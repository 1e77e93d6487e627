use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::arena::SlotKey;
use crate::backend::{Backend, BufferHandle};
use crate::context::Context;
use crate::dtype::{self, DType, WithDType};
use crate::error::{Error, Result};
use crate::format;
use crate::manager::{ManagerInner, NDManager};
use crate::shape::Shape;

// NDArray: handle to one backend buffer
//
// An array does not own its buffer directly. The buffer handle lives in the
// slot table of the owning manager and the array carries the key. Every
// access goes through the manager's lock: if the manager has been closed, or
// the key no longer resolves, the access fails with `ArrayClosed` instead of
// reading freed memory.
//
// Shape, dtype and context never change after creation, so they are cached
// here. The accessors still check liveness so that a closed array fails fast
// on every read.

/// A handle to an N-dimensional buffer owned by an [`NDManager`].
///
/// Arrays are move-only: there is no `Clone`, and [`NDArray::attach`] moves
/// the registration to another manager.
pub struct NDArray {
    manager: Arc<ManagerInner>,
    key: SlotKey,
    shape: Shape,
    dtype: DType,
    context: Context,
}

impl NDArray {
    pub(crate) fn new(
        manager: Arc<ManagerInner>,
        key: SlotKey,
        shape: Shape,
        dtype: DType,
        context: Context,
    ) -> Self {
        NDArray {
            manager,
            key,
            shape,
            dtype,
            context,
        }
    }

    /// Run `f` with the backend and this array's handle while the owning
    /// manager's lock is held, so the buffer cannot be freed concurrently.
    fn with_handle<R>(&self, f: impl FnOnce(&dyn Backend, &BufferHandle) -> Result<R>) -> Result<R> {
        let state = self.manager.lock();
        if state.closed {
            return Err(Error::ArrayClosed);
        }
        let handle = state.slots.get(self.key).ok_or(Error::ArrayClosed)?;
        f(self.manager.backend.as_ref(), handle)
    }

    fn ensure_alive(&self) -> Result<()> {
        let state = self.manager.lock();
        if state.closed || !state.slots.contains(self.key) {
            return Err(Error::ArrayClosed);
        }
        Ok(())
    }

    // Accessors

    pub fn shape(&self) -> Result<&Shape> {
        self.ensure_alive()?;
        Ok(&self.shape)
    }

    pub fn dtype(&self) -> Result<DType> {
        self.ensure_alive()?;
        Ok(self.dtype)
    }

    pub fn context(&self) -> Result<Context> {
        self.ensure_alive()?;
        Ok(self.context)
    }

    pub fn elem_count(&self) -> Result<usize> {
        Ok(self.shape()?.elem_count())
    }

    /// Buffer length in bytes: element count times dtype width.
    pub fn size_in_bytes(&self) -> Result<usize> {
        self.ensure_alive()?;
        Ok(self.shape.size_in_bytes(self.dtype))
    }

    /// Id of the manager that currently owns this array.
    pub fn manager_id(&self) -> u64 {
        self.manager.id
    }

    pub fn is_closed(&self) -> bool {
        self.ensure_alive().is_err()
    }

    // Writes

    /// Overwrite the buffer with typed data.
    ///
    /// `T` must be the array's element type (no implicit narrowing), and
    /// `data.len()` must equal the element count.
    pub fn set<T: WithDType>(&self, data: &[T]) -> Result<()> {
        self.with_handle(|backend, handle| {
            if T::DTYPE != self.dtype {
                return Err(Error::DTypeMismatch {
                    expected: self.dtype,
                    got: T::DTYPE,
                });
            }
            let expected = self.shape.elem_count();
            if data.len() != expected {
                return Err(Error::ElementCountMismatch {
                    expected,
                    got: data.len(),
                });
            }
            backend.write(handle, &dtype::encode(data))
        })
    }

    /// Overwrite the buffer with raw little-endian bytes.
    pub fn set_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.with_handle(|backend, handle| {
            let expected = self.shape.size_in_bytes(self.dtype);
            if bytes.len() != expected {
                return Err(Error::ByteLengthMismatch {
                    expected,
                    got: bytes.len(),
                });
            }
            backend.write(handle, bytes)
        })
    }

    /// Overwrite the buffer from f64 values, converting each to the array's
    /// dtype. Values that do not fit the dtype exactly are rejected.
    pub fn set_f64(&self, data: &[f64]) -> Result<()> {
        self.with_handle(|backend, handle| {
            let expected = self.shape.elem_count();
            if data.len() != expected {
                return Err(Error::ElementCountMismatch {
                    expected,
                    got: data.len(),
                });
            }
            backend.write(handle, &dtype::encode_f64(self.dtype, data)?)
        })
    }

    // Reads

    /// Copy the raw little-endian buffer contents.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.with_handle(|backend, handle| backend.read(handle))
    }

    /// Copy the values out as `T`, which must be the array's element type.
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        let bytes = self.to_bytes()?;
        if T::DTYPE != self.dtype {
            return Err(Error::DTypeMismatch {
                expected: self.dtype,
                got: T::DTYPE,
            });
        }
        Ok(dtype::decode(&bytes))
    }

    /// Copy the values out widened to f64 (for inspection).
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let bytes = self.to_bytes()?;
        Ok(dtype::decode_f64(self.dtype, &bytes))
    }

    // Ownership

    /// Move this array's registration to `manager`.
    ///
    /// After attaching, closing the previous owner no longer releases this
    /// array; closing `manager` does.
    pub fn attach(&mut self, manager: &NDManager) -> Result<()> {
        let target = manager.inner();
        if Arc::ptr_eq(&self.manager, target) {
            return self.ensure_alive();
        }
        if !self.manager.same_backend(target) {
            return Err(Error::InvalidArgument(format!(
                "cannot attach an array from backend '{}' to a manager on backend '{}'",
                self.manager.backend.name(),
                target.backend.name()
            )));
        }

        let (mut src, mut dst) = ManagerInner::lock_pair(&self.manager, target);
        if src.closed {
            return Err(Error::ArrayClosed);
        }
        if dst.closed {
            return Err(Error::ManagerClosed { id: target.id });
        }
        let handle = src.slots.remove(self.key).ok_or(Error::ArrayClosed)?;
        let key = dst.slots.insert(handle);
        drop((src, dst));

        trace!(
            "array moved from manager #{} to #{}",
            self.manager.id,
            target.id
        );
        self.manager = Arc::clone(target);
        self.key = key;
        Ok(())
    }

    /// Free the buffer now instead of when the owning manager closes.
    pub fn release(self) -> Result<()> {
        let handle = {
            let mut state = self.manager.lock();
            if state.closed {
                return Err(Error::ArrayClosed);
            }
            state.slots.remove(self.key).ok_or(Error::ArrayClosed)?
        };
        trace!("manager #{} release {:?}", self.manager.id, handle);
        self.manager.backend.free(handle)
    }
}

impl fmt::Debug for NDArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NDArray(shape={}, dtype={}, context={}, manager=#{}{})",
            self.shape,
            self.dtype,
            self.context,
            self.manager.id,
            if self.is_closed() { ", closed" } else { "" }
        )
    }
}

/// Renders the header and values (see [`format::format`]). A closed array
/// renders its header followed by `<closed>`.
impl fmt::Display for NDArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match format::format(self) {
            Ok(text) => f.write_str(&text),
            Err(_) => writeln!(
                f,
                "{} <closed>",
                format::header(&self.shape, &self.context, self.dtype)
            ),
        }
    }
}
