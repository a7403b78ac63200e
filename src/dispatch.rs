//! Dispatch strategies: where a chain execution actually runs.
//!
//! Handler bodies are allowed to suspend in blocking style — waiting on a
//! database, a downstream call, a legacy synchronous adapter — so they must
//! never run on the transport engine's I/O threads. The chain therefore hands
//! its entire execution (head handler through failure routing) to a
//! [`Dispatch`] implementation as one opaque body, and the strategy decides
//! which execution context runs it. Once dispatched, the body stays on that
//! context until the exchange terminates; there is no mid-chain migration.

use std::future::Future;
use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio::runtime;
use tracing::debug;

use crate::context::Context;

/// One complete chain execution: head handler through failure routing,
/// resolving to the finished exchange.
pub type ChainExecution = Pin<Box<dyn Future<Output = Context> + Send>>;

/// Raised when the dispatch mechanism itself cannot run the body.
///
/// This is a capacity or lifecycle problem with the execution context, not an
/// application failure: it is reported up to the transport loop rather than
/// routed through the failure handlers.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker execution context failed to run the chain: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Pluggable policy for scheduling a chain execution onto an execution context.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    async fn dispatch(&self, body: ChainExecution) -> Result<Context, DispatchError>;
}

// ── Worker dispatch ───────────────────────────────────────────────────────────

/// Dispatches chain executions onto a dedicated worker runtime.
///
/// This is the default strategy. The runtime's threads are owned by this
/// dispatcher alone, so a chain that blocks one of them stalls other chains
/// at worst — never the accept loop or connection I/O.
pub struct WorkerDispatcher {
    handle: runtime::Handle,
    // Kept so the runtime outlives the handle; shut down without blocking on
    // drop, which may happen inside an async context.
    runtime: Option<runtime::Runtime>,
}

impl WorkerDispatcher {
    /// A worker runtime sized by tokio's default (one thread per core).
    pub fn new() -> io::Result<Self> {
        Self::build(None)
    }

    /// A worker runtime with exactly `threads` worker threads.
    pub fn with_threads(threads: usize) -> io::Result<Self> {
        Self::build(Some(threads))
    }

    fn build(threads: Option<usize>) -> io::Result<Self> {
        let mut builder = runtime::Builder::new_multi_thread();
        builder.thread_name("rudder-worker").enable_all();
        if let Some(threads) = threads {
            builder.worker_threads(threads);
        }
        let rt = builder.build()?;
        debug!(threads = ?threads, "worker dispatcher started");
        Ok(Self {
            handle: rt.handle().clone(),
            runtime: Some(rt),
        })
    }
}

#[async_trait]
impl Dispatch for WorkerDispatcher {
    async fn dispatch(&self, body: ChainExecution) -> Result<Context, DispatchError> {
        Ok(self.handle.spawn(body).await?)
    }
}

impl Drop for WorkerDispatcher {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}

// ── Inline dispatch ───────────────────────────────────────────────────────────

/// Runs the chain execution directly on the calling task.
///
/// For deployments where every handler is genuinely cooperative and the extra
/// hop to a worker runtime buys nothing. A handler that blocks under this
/// strategy occupies a transport thread — use [`WorkerDispatcher`] unless
/// that trade-off is understood.
pub struct InlineDispatcher;

#[async_trait]
impl Dispatch for InlineDispatcher {
    async fn dispatch(&self, body: ChainExecution) -> Result<Context, DispatchError> {
        Ok(body.await)
    }
}
