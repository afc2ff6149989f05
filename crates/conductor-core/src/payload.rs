//! Request payload codec.
//!
//! Every invocation receives a JSON object on stdin:
//!
//! ```json
//! { "params": { "name": "Alice" }, "seed": -3917237402873 }
//! ```
//!
//! `params` carries the parsed query parameters (first value wins on
//! repeats) and `seed` is a fresh signed 64-bit integer from the OS
//! CSPRNG. Key order in the encoded object is unspecified; instruments
//! must not depend on it and should ignore unknown fields.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use conductor_common::DispatchError;

/// The JSON payload written to an instrument's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Query parameters, first-value-wins on duplicate keys.
    pub params: HashMap<String, String>,

    /// Per-request random seed.
    pub seed: i64,
}

impl RequestPayload {
    /// Build a payload from parsed parameters with a fresh random seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS random source fails.
    pub fn new(params: HashMap<String, String>) -> Result<Self, DispatchError> {
        Ok(Self {
            params,
            seed: random_seed()?,
        })
    }

    /// Encode the payload as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, DispatchError> {
        serde_json::to_vec(self)
            .map_err(|e| DispatchError::internal(format!("payload encoding failed: {e}")))
    }
}

/// Draw a signed 64-bit seed from the OS CSPRNG, little-endian.
pub fn random_seed() -> Result<i64, DispatchError> {
    let mut buf = [0u8; 8];
    getrandom::getrandom(&mut buf)
        .map_err(|e| DispatchError::internal(format!("random seed unavailable: {e}")))?;
    Ok(i64::from_le_bytes(buf))
}
