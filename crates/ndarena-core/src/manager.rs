use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, trace, warn};

use crate::arena::SlotTable;
use crate::array::NDArray;
use crate::backend::{Backend, BufferHandle};
use crate::context::Context;
use crate::dtype::{self, DType, WithDType};
use crate::error::{Error, Result};
use crate::shape::Shape;

// NDManager: arena that owns arrays and child managers
//
// Managers form a forest. Each node holds:
//
//   - a slot table of buffer handles for the arrays it owns
//   - strong references to its child managers
//   - a weak reference to its parent
//
// Closing a node closes its children first (post-order), then frees every
// handle in its table through the backend, then unregisters itself from the
// parent. Arrays keep a strong reference to the node that owns them, so a
// closed node outlives its handles long enough to answer "closed" instead of
// dangling.
//
// The state lock is never held while recursing into children or while
// locking the parent, so closing a subtree cannot deadlock against itself.

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ManagerInner {
    pub(crate) id: u64,
    pub(crate) context: Context,
    pub(crate) backend: Arc<dyn Backend>,
    parent: Option<Weak<ManagerInner>>,
    state: Mutex<ManagerState>,
}

#[derive(Default)]
pub(crate) struct ManagerState {
    pub(crate) closed: bool,
    children: HashMap<u64, Arc<ManagerInner>>,
    pub(crate) slots: SlotTable<BufferHandle>,
}

impl ManagerInner {
    fn new(
        backend: Arc<dyn Backend>,
        context: Context,
        parent: Option<Weak<ManagerInner>>,
    ) -> Arc<Self> {
        Arc::new(ManagerInner {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            context,
            backend,
            parent,
            state: Mutex::new(ManagerState::default()),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock two distinct managers in id order.
    pub(crate) fn lock_pair<'a>(
        a: &'a ManagerInner,
        b: &'a ManagerInner,
    ) -> (MutexGuard<'a, ManagerState>, MutexGuard<'a, ManagerState>) {
        if a.id < b.id {
            let ga = a.lock();
            let gb = b.lock();
            (ga, gb)
        } else {
            let gb = b.lock();
            let ga = a.lock();
            (ga, gb)
        }
    }

    pub(crate) fn same_backend(&self, other: &ManagerInner) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.backend) as *const (),
            Arc::as_ptr(&other.backend) as *const (),
        )
    }

    fn close(&self) -> Result<()> {
        let (children, handles) = {
            let mut state = self.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            (mem::take(&mut state.children), state.slots.drain())
        };

        let mut first_err = None;
        for child in children.into_values() {
            if let Err(e) = child.close() {
                first_err.get_or_insert(e);
            }
        }

        let released = handles.len();
        for handle in handles {
            trace!("manager #{} free {:?}", self.id, handle);
            if let Err(e) = self.backend.free(handle) {
                first_err.get_or_insert(e);
            }
        }

        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.lock().children.remove(&self.id);
        }

        debug!("manager #{} closed, released {released} arrays", self.id);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn closed_err(&self) -> Error {
        Error::ManagerClosed { id: self.id }
    }
}

/// An arena that owns arrays and sub-managers and releases them together.
///
/// Arrays are created only through a manager and stay registered with it
/// until the manager is closed, the array is released, or the array is
/// attached to another manager. Dropping an `NDManager` closes it, which
/// gives scoped acquisition:
///
/// ```ignore
/// let scope = engine.new_base_manager()?;
/// let a = scope.zeros((2, 3), DType::F32)?;
/// drop(scope); // `a` is now closed
/// ```
pub struct NDManager {
    inner: Arc<ManagerInner>,
}

impl NDManager {
    /// Create a root manager (no parent) on `context`.
    ///
    /// The context is checked against the backend immediately, so a missing
    /// device is reported here rather than on first allocation.
    pub fn new_root(backend: Arc<dyn Backend>, context: Context) -> Result<Self> {
        backend.validate(&context)?;
        let inner = ManagerInner::new(backend, context, None);
        debug!("root manager #{} created on {context}", inner.id);
        Ok(NDManager { inner })
    }

    /// Create a child manager on this manager's context.
    pub fn new_sub_manager(&self) -> Result<NDManager> {
        self.new_sub_manager_on(self.inner.context)
    }

    /// Create a child manager whose default context is `context`.
    pub fn new_sub_manager_on(&self, context: Context) -> Result<NDManager> {
        self.inner.backend.validate(&context)?;
        let mut state = self.inner.lock();
        if state.closed {
            return Err(self.inner.closed_err());
        }
        let child = ManagerInner::new(
            Arc::clone(&self.inner.backend),
            context,
            Some(Arc::downgrade(&self.inner)),
        );
        state.children.insert(child.id, Arc::clone(&child));
        debug!("manager #{} created under #{}", child.id, self.inner.id);
        Ok(NDManager { inner: child })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Default context for arrays created without an explicit one.
    pub fn context(&self) -> Context {
        self.inner.context
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of arrays directly owned by this manager.
    pub fn array_count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Number of live child managers.
    pub fn child_count(&self) -> usize {
        self.inner.lock().children.len()
    }

    /// Allocate an array of `shape` and `dtype` on `context`.
    ///
    /// The buffer is zero-filled by the backend and registered with this
    /// manager before the array is returned.
    pub fn create(
        &self,
        shape: impl Into<Shape>,
        dtype: DType,
        context: Context,
    ) -> Result<NDArray> {
        let shape = shape.into();
        let n_bytes = byte_len(&shape, dtype)?;
        let backend = &self.inner.backend;
        backend.validate(&context)?;

        let mut state = self.inner.lock();
        if state.closed {
            return Err(self.inner.closed_err());
        }
        let handle = backend.allocate(n_bytes, &context)?;
        trace!(
            "manager #{} alloc {:?} {n_bytes} bytes {shape} {dtype} on {context}",
            self.inner.id,
            handle
        );
        let key = state.slots.insert(handle);
        drop(state);

        Ok(NDArray::new(
            Arc::clone(&self.inner),
            key,
            shape,
            dtype,
            context,
        ))
    }

    /// Allocate and fill an array from typed data on the default context.
    pub fn create_from<T: WithDType>(&self, data: &[T], shape: impl Into<Shape>) -> Result<NDArray> {
        let array = self.create(shape, T::DTYPE, self.inner.context)?;
        array.set(data)?;
        Ok(array)
    }

    /// A 1-D array holding `data`.
    pub fn create_vec<T: WithDType>(&self, data: &[T]) -> Result<NDArray> {
        self.create_from(data, data.len())
    }

    /// Allocate and fill an array from f64 values converted to `dtype`.
    pub fn create_from_f64(
        &self,
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
    ) -> Result<NDArray> {
        let array = self.create(shape, dtype, self.inner.context)?;
        array.set_f64(data)?;
        Ok(array)
    }

    /// Zero-filled array on the default context.
    pub fn zeros(&self, shape: impl Into<Shape>, dtype: DType) -> Result<NDArray> {
        self.create(shape, dtype, self.inner.context)
    }

    /// One-filled array on the default context.
    pub fn ones(&self, shape: impl Into<Shape>, dtype: DType) -> Result<NDArray> {
        self.full(shape, 1.0, dtype)
    }

    /// Array filled with `value` on the default context.
    ///
    /// Fails with an invalid-argument error if `value` is not representable
    /// in `dtype` (e.g. `0.5` or `300.0` for uint8).
    pub fn full(&self, shape: impl Into<Shape>, value: f64, dtype: DType) -> Result<NDArray> {
        let shape = shape.into();
        byte_len(&shape, dtype)?;
        let bytes = dtype::encode_f64(dtype, &vec![value; shape.elem_count()])?;
        let array = self.create(shape, dtype, self.inner.context)?;
        array.set_bytes(&bytes)?;
        Ok(array)
    }

    /// Close this manager: close all descendants, release all owned arrays,
    /// then detach from the parent. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    pub(crate) fn inner(&self) -> &Arc<ManagerInner> {
        &self.inner
    }
}

/// Byte length of a `shape` of `dtype`, rejecting sizes that overflow `usize`.
fn byte_len(shape: &Shape, dtype: DType) -> Result<usize> {
    shape.checked_size_in_bytes(dtype).ok_or_else(|| {
        Error::InvalidArgument(format!("shape {shape} of {dtype} overflows the address space"))
    })
}

impl Drop for NDManager {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            warn!("manager #{} failed to close cleanly: {e}", self.inner.id);
        }
    }
}

impl fmt::Debug for NDManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("NDManager")
            .field("id", &self.inner.id)
            .field("context", &self.inner.context)
            .field("backend", &self.inner.backend.name())
            .field("closed", &state.closed)
            .field("arrays", &state.slots.len())
            .field("children", &state.children.len())
            .finish()
    }
}
