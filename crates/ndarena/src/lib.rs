//! # ndarena
//!
//! Device-aware N-dimensional arrays with arena-scoped lifetimes.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use ndarena::prelude::*;
//!
//! # fn main() -> ndarena::Result<()> {
//! let scope = Engine::global().new_base_manager()?;
//! let a = scope.create_from(&[1.0f32, 2.0, 3.0], 3)?;
//! assert_eq!(a.to_vec::<f32>()?, vec![1.0, 2.0, 3.0]);
//! scope.close()?; // `a` is released
//! assert!(a.is_closed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `ndarena-core` | NDManager, NDArray, Shape, DType, Context, Backend trait, formatting |
//! | `ndarena-host` | Host-memory backend with simulated GPUs and allocation accounting |
//!
//! ## Modules
//!
//! - [`engine`]: process-wide Engine, system manager, default device
//! - [`config`]: EngineConfig builder and environment loading
//! - [`init`]: Initializer strategies (zeros, ones, constant, uniform, normal)
//! - [`checkpoint`]: Locate model parameter files by epoch

/// Re-export core types.
pub use ndarena_core::{
    backend::{Backend, BufferHandle, MemoryUsage},
    format, Context, DType, DeviceKind, Error, NDArray, NDManager, Result, Shape,
    WithDType,
};

/// Re-export the host backend.
pub use ndarena_host::HostBackend;

/// Engine: process-wide entry point owning the backend and system manager.
pub mod engine;

/// Engine configuration, from code or the environment.
pub mod config;

/// Initializers: strategies that allocate and fill arrays.
pub mod init;

/// Checkpoint: locate saved model parameters by epoch.
pub mod checkpoint;

pub use engine::Engine;

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::checkpoint::Checkpoint;
    pub use crate::config::EngineConfig;
    pub use crate::engine::Engine;
    pub use crate::init::{Constant, Initializer, Normal, Ones, Uniform, Zeros};
    pub use crate::{Context, DType, HostBackend, NDArray, NDManager, Shape};
}
