//! Per-request instance lifecycle.
//!
//! This module runs one invocation of an instrument:
//!
//! 1. Build a fresh WASI context: stdin over the payload bytes, a capped
//!    in-memory stdout, and exactly the configured mount (or no
//!    filesystem at all)
//! 2. Instantiate the compiled module with a fresh store
//! 3. Call the WASI entry point `_start`
//! 4. Classify the outcome and hand back captured stdout
//!
//! Instances are single-use by construction: the store (and with it the
//! instance, its linear memory, and its WASI state) is dropped on every
//! exit path before the outcome is returned. Compiled modules are shared
//! `Arc`s and survive the store.

use bytes::Bytes;
use tracing::{debug, instrument, warn};
use wasmtime::{Linker, Store, Trap};
use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{DirPerms, FilePerms, I32Exit, WasiCtxBuilder};

use conductor_common::{DispatchError, ExecutionConfig};

use crate::module::CompiledModule;
use crate::route::Mount;
use crate::WasmEngine;

/// Guest stderr is for diagnostics only; cap it well below stdout.
const STDERR_CAPACITY: usize = 64 * 1024;

/// How one invocation of `_start` ended.
#[derive(Debug)]
pub enum ExitStatus {
    /// The entry point returned, or the module called `exit(0)`.
    Success,

    /// The module called `exit` with a non-zero code.
    Exit(i32),

    /// The module trapped (OOB access, unreachable, etc.).
    Trap {
        /// Description of the trap.
        message: String,
    },
}

impl ExitStatus {
    /// Returns `true` for a clean completion.
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }
}

/// Everything one invocation needs besides the compiled module.
///
/// Environment variables and command-line arguments are always empty;
/// the payload arrives on stdin.
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    /// JSON payload served to the instrument as stdin.
    pub stdin: Bytes,

    /// Optional filesystem mount; absent means no filesystem surface.
    pub mount: Option<Mount>,

    /// Request id for tracing correlation.
    pub request_id: String,
}

/// Result of a completed invocation.
#[derive(Debug)]
pub struct InvokeOutcome {
    /// How the instrument ended.
    pub status: ExitStatus,

    /// Everything the instrument wrote to stdout.
    pub stdout: Bytes,
}

/// Per-request execution context stored in the Wasmtime store.
pub struct RequestContext {
    wasi: WasiP1Ctx,

    /// Request id for tracing correlation.
    pub request_id: String,
}

/// Runs instrument invocations against a shared engine.
///
/// The WASI linker is built once and reused; each invocation gets its
/// own store and WASI context.
pub struct InstanceRunner {
    engine: WasmEngine,
    execution: ExecutionConfig,
    linker: Linker<RequestContext>,
}

impl InstanceRunner {
    /// Create a runner with the WASI preview1 surface registered.
    ///
    /// # Errors
    ///
    /// Returns an error if WASI registration fails.
    pub fn new(engine: WasmEngine, execution: ExecutionConfig) -> Result<Self, DispatchError> {
        let mut linker = Linker::new(engine.inner());
        preview1::add_to_linker_async(&mut linker, |ctx: &mut RequestContext| &mut ctx.wasi)
            .map_err(|e| {
                DispatchError::invalid_config(format!("Failed to register WASI: {e}"))
            })?;

        Ok(Self {
            engine,
            execution,
            linker,
        })
    }

    /// Get the engine this runner executes on.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }

    /// Run one invocation of `_start` and capture stdout.
    ///
    /// The instance is destroyed before this returns, whatever the
    /// outcome. An epoch-deadline interrupt (the instrument outlived its
    /// deadline) surfaces as `Cancelled`.
    ///
    /// # Errors
    ///
    /// Returns `Instantiate` if the mount is invalid, instantiation
    /// fails, or the module exports no `_start`; `Cancelled` on
    /// interruption.
    #[instrument(skip(self, module, config), fields(request_id = %config.request_id))]
    pub async fn run(
        &self,
        module: &CompiledModule,
        config: InvocationConfig,
    ) -> Result<InvokeOutcome, DispatchError> {
        let stdout = MemoryOutputPipe::new(self.execution.max_response_bytes);
        let stderr = MemoryOutputPipe::new(STDERR_CAPACITY);

        let mut builder = WasiCtxBuilder::new();
        builder.stdin(MemoryInputPipe::new(config.stdin));
        builder.stdout(stdout.clone());
        builder.stderr(stderr.clone());

        if let Some(mount) = &config.mount {
            builder
                .preopened_dir(
                    &mount.host_path,
                    &mount.guest_path,
                    DirPerms::all(),
                    FilePerms::all(),
                )
                .map_err(|e| {
                    DispatchError::instantiate(format!(
                        "Mount '{}' -> '{}' failed: {e}",
                        mount.host_path.display(),
                        mount.guest_path
                    ))
                })?;
        }

        let context = RequestContext {
            wasi: builder.build_p1(),
            request_id: config.request_id,
        };

        let mut store = Store::new(self.engine.inner(), context);
        if self.engine.config().epoch_interruption {
            // One epoch tick per millisecond from the server's ticker task
            store.set_epoch_deadline(self.execution.timeout_ms);
        }

        debug!("Instantiating module");

        let instance = self
            .linker
            .instantiate_async(&mut store, module.inner())
            .await
            .map_err(|e| DispatchError::instantiate(format!("Instantiation failed: {e}")))?;

        let start = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .map_err(|e| {
                DispatchError::instantiate(format!("Entry point '_start' not found: {e}"))
            })?;

        debug!("Invoking entry point");

        let result = start.call_async(&mut store, ()).await;

        // Tear the instance down before interpreting the outcome
        drop(store);

        let stderr_bytes = stderr.contents();
        if !stderr_bytes.is_empty() {
            warn!(
                stderr = %String::from_utf8_lossy(&stderr_bytes),
                "Instrument wrote to stderr"
            );
        }

        let status = match result {
            Ok(()) => ExitStatus::Success,
            Err(err) => classify_invoke_error(err)?,
        };

        Ok(InvokeOutcome {
            status,
            stdout: stdout.contents(),
        })
    }
}

/// Interpret a failed `_start` call.
///
/// A clean WASI `exit(0)` arrives as an error-shaped value but is a
/// success; an epoch interrupt means the deadline fired and becomes
/// `Cancelled`; everything else is the module's own failure.
fn classify_invoke_error(err: wasmtime::Error) -> Result<ExitStatus, DispatchError> {
    if let Some(exit) = err.downcast_ref::<I32Exit>() {
        return Ok(if exit.0 == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Exit(exit.0)
        });
    }

    if let Some(trap) = err.downcast_ref::<Trap>() {
        if *trap == Trap::Interrupt {
            return Err(DispatchError::Cancelled);
        }
        return Ok(ExitStatus::Trap {
            message: format!("{trap:?}"),
        });
    }

    Ok(ExitStatus::Trap {
        message: err.to_string(),
    })
}

impl std::fmt::Debug for InstanceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRunner").finish_non_exhaustive()
    }
}
