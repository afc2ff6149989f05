//! HTTP front end for conductor.
//!
//! This crate maps HTTP traffic onto the dispatch runtime:
//!
//! - Path lookup against the configured route table (unknown paths: 404)
//! - Query parsing (first value wins) and raw-query fingerprinting
//! - Instrument stdout forwarded verbatim as the response body
//! - `/health` and `/stats` built-in endpoints
//!
//! # Quick Start
//!
//! ```ignore
//! use conductor_common::ConfigFile;
//! use conductor_server::ConductorServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigFile::from_file("config.toml")?;
//!     ConductorServer::new(&config)?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod handler;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use router::build_router;
pub use server::{ConductorServer, TestHandle};
pub use state::AppState;
