use opencl3::error_codes::ClError;

/// Error types of this library.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    /// Status reported by the OpenCL driver, surfaced verbatim. The optional
    /// string carries a program build log when one is available.
    #[error("OpenCL error: {0}{}", match .1 {
        Some(log) => format!(" {}", log),
        None => String::new(),
    })]
    Driver(ClError, Option<String>),

    /// Error when a handle cannot be constructed or retained.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Error when arguments cannot be marshaled to the native call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Errors that rarely happen and don't deserve their own error type.
    #[error("{0}")]
    Generic(String),
}

/// Convenience type alias for [`BridgeError`] based [`Result`]s.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

impl From<ClError> for BridgeError {
    fn from(error: ClError) -> Self {
        BridgeError::Driver(error, None)
    }
}

/// Maps a native status code to a result, keeping the code verbatim.
pub(crate) fn check(status: crate::sys::cl_int) -> BridgeResult<()> {
    if status == crate::sys::CL_SUCCESS {
        Ok(())
    } else {
        Err(BridgeError::Driver(ClError(status), None))
    }
}
