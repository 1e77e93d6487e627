use crate::context::Context;
use crate::dtype::DType;

/// All errors that can occur within ndarena.
///
/// One enum covers argument validation, closed-resource access, device
/// resolution, backend allocation failures and checkpoint lookup, so every
/// crate in the workspace propagates the same `Result`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Flattened input length differs from the array's element count.
    #[error("invalid argument: expected {expected} elements, got {got}")]
    ElementCountMismatch { expected: usize, got: usize },

    /// Raw byte input length differs from the array's buffer size.
    #[error("invalid argument: expected {expected} bytes, got {got}")]
    ByteLengthMismatch { expected: usize, got: usize },

    /// Typed access with an element type that is not the array's dtype.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// Operation on a manager after `close()`.
    #[error("manager #{id} is closed")]
    ManagerClosed { id: u64 },

    /// Access to an array whose buffer was released.
    #[error("array is closed: its buffer was released")]
    ArrayClosed,

    /// The requested device does not exist on this backend.
    #[error("device {context} is unavailable ({available} such devices present)")]
    DeviceUnavailable { context: Context, available: usize },

    /// The backend cannot satisfy an allocation.
    #[error("out of memory on {context}: requested {requested} bytes, {available} available")]
    OutOfMemory {
        context: Context,
        requested: usize,
        available: usize,
    },

    /// A buffer handle the backend does not know.
    #[error("unknown buffer handle %{0}")]
    UnknownHandle(u64),

    /// No parameter file matched the expected checkpoint pattern.
    #[error("parameter files not found: {expected}")]
    CheckpointNotFound { expected: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Whether this error reports access to a released manager or array.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::ManagerClosed { .. } | Error::ArrayClosed)
    }

    /// Whether this error reports a rejected argument.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Error::ElementCountMismatch { .. }
                | Error::ByteLengthMismatch { .. }
                | Error::InvalidArgument(_)
        )
    }
}

/// Convenience Result type used throughout ndarena.
pub type Result<T> = std::result::Result<T, Error>;
