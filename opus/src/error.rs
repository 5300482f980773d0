//! Error types for opus sessions and stream adapters.

use crate::ffi;

/// Result type alias for giztoy-opus.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for opus session and stream operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Native encoder/decoder creation failed.
    #[error("opus: codec init failed: {message} (code {code})")]
    CodecInit { code: i32, message: String },

    /// A native encode/decode/query call returned a negative status.
    #[error("opus: codec runtime error: {message} (code {code})")]
    CodecRuntime { code: i32, message: String },

    /// The session was used after `destroy()`.
    #[error("opus: session used after destroy")]
    UseAfterDestroy,

    /// The input ended with a partially filled frame.
    #[error("opus: unfinished frame, {missing_samples} samples missing")]
    UnfinishedFrame { missing_samples: usize },

    /// Data does not fit into the native input region.
    #[error("opus: {len} bytes do not fit into an input region of {capacity} bytes")]
    PacketTooLarge { len: usize, capacity: usize },

    /// Invalid configuration value.
    #[error("opus: invalid config: {0}")]
    Configuration(String),
}

impl Error {
    pub(crate) fn init(code: i32) -> Self {
        Self::CodecInit {
            code,
            message: ffi::error_string(code),
        }
    }

    pub(crate) fn runtime(code: i32) -> Self {
        Self::CodecRuntime {
            code,
            message: ffi::error_string(code),
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Returns the native status code for codec errors.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::CodecInit { code, .. } | Self::CodecRuntime { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Maps a native return value to `Ok(value)` or `CodecRuntime`.
pub(crate) fn check(ret: i32) -> Result<usize> {
    if ret < 0 {
        Err(Error::runtime(ret))
    } else {
        Ok(ret as usize)
    }
}
