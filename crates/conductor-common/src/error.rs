//! Error types for conductor.
//!
//! This module defines [`DispatchError`], the error taxonomy of the
//! request-dispatch path. Every variant is surfaced to the HTTP boundary;
//! nothing is recovered inside the dispatcher, and neither cache stores
//! failure outcomes.

use std::io;

use thiserror::Error;

/// Errors produced on the request-dispatch path.
///
/// An unknown route is not represented here: the HTTP front end answers
/// 404 before the dispatcher is ever invoked.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The instrument's module bytes could not be read.
    #[error("Module load failed for '{path}': {source}")]
    ModuleLoad {
        /// Host path of the module that could not be read.
        path: String,
        #[source]
        source: io::Error,
    },

    /// The engine rejected the module bytes.
    #[error("Module compilation failed: {reason}")]
    ModuleCompile {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The engine failed to create an instance (e.g. invalid mount).
    #[error("Instantiation failed: {reason}")]
    Instantiate {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// The instrument exited with a non-zero WASI exit code.
    ///
    /// The stdout captured before exit travels with the error for
    /// diagnostics. It is never stored in the response cache.
    #[error("Module exited with code {code}")]
    ModuleExit {
        /// The non-zero WASI exit code.
        code: i32,
        /// Stdout bytes written before the exit.
        stdout: Vec<u8>,
    },

    /// The instrument trapped (OOB memory access, unreachable, etc.).
    #[error("Module trapped: {message}")]
    ModuleTrap {
        /// Description of the trap.
        message: String,
    },

    /// The request was cancelled or timed out.
    #[error("Dispatch cancelled")]
    Cancelled,

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invariant violation inside the dispatch runtime.
    #[error("Internal error: {reason}")]
    Internal {
        /// Description of the violated invariant.
        reason: String,
    },
}

impl DispatchError {
    /// Create a new `ModuleCompile` error.
    pub fn compile(reason: impl Into<String>) -> Self {
        Self::ModuleCompile {
            reason: reason.into(),
        }
    }

    /// Create a new `Instantiate` error.
    pub fn instantiate(reason: impl Into<String>) -> Self {
        Self::Instantiate {
            reason: reason.into(),
        }
    }

    /// Create a new `ModuleTrap` error.
    pub fn trap(message: impl Into<String>) -> Self {
        Self::ModuleTrap {
            message: message.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a new `Internal` error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error came from the module itself
    /// (non-zero exit or trap) rather than the host pipeline.
    pub fn is_module_failure(&self) -> bool {
        matches!(self, Self::ModuleExit { .. } | Self::ModuleTrap { .. })
    }

    /// Returns `true` if this error indicates cancellation or timeout.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
