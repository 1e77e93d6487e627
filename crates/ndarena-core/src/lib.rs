//! # ndarena-core
//!
//! Device-aware N-dimensional array handles with arena-scoped lifetimes.
//!
//! This crate provides:
//! - [`NDManager`]: an arena owning arrays and child managers; closing it
//!   releases everything below it
//! - [`NDArray`]: a move-only handle to a backend buffer
//! - [`Shape`] / [`DType`] / [`Context`]: buffer geometry, element type, device
//! - [`Backend`] trait: the opaque allocate/free/write/read buffer interface
//! - [`format`]: diagnostic text rendering of arrays
// - arena: generation-checked slot tables backing each manager
// - backend: Backend trait, BufferHandle, MemoryUsage
// - manager/array: the ownership tree and the handles it hands out

mod arena;
pub mod array;
pub mod backend;
pub mod context;
pub mod dtype;
pub mod error;
pub mod format;
pub mod manager;
pub mod shape;

pub use array::NDArray;
pub use backend::{Backend, BufferHandle, MemoryUsage};
pub use context::{Context, DeviceKind};
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use manager::NDManager;
pub use shape::Shape;
