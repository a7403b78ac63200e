//! # rudder
//!
//! Declarative routing, middleware chains and failure dispatch for
//! hyper-based services. Nothing more. Nothing less.
//!
//! ## The contract
//!
//! hyper owns the sockets, the connection lifecycle, header parsing and
//! low-level I/O. rudder does not — by design. The transport does transport
//! things; rudder turns a nested description of routes, per-scope filters and
//! per-scope failure handlers into the one dispatchable handler the transport
//! invokes per request, and guarantees three things:
//!
//! - **Order** — outer-scope filters run before inner-scope filters before
//!   the terminal route handler, in declaration order, for every match.
//! - **Termination** — any failure raised anywhere in a chain is captured at
//!   the dispatch boundary and routed to the handler registered for its exact
//!   type, or answered with an empty 500. No request hangs un-terminated.
//! - **Early validation** — blank prefixes and templates, empty chains and
//!   duplicate handlers are rejected while the server is being built, never
//!   discovered at request time.
//!
//! Handler chains never run on the transport's I/O threads: each chain
//! execution is handed whole to a pluggable [`Dispatch`] strategy, by default
//! a dedicated worker runtime where blocking-style suspension is safe.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use rudder::{handler, Context, Fault, Server};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("no pet {0}")]
//! struct NoSuchPet(String);
//!
//! async fn trace(ctx: &mut Context) -> Result<(), Fault> {
//!     tracing::info!(path = ctx.path(), "request");
//!     ctx.next().await
//! }
//!
//! async fn get_pet(ctx: &mut Context) -> Result<(), Fault> {
//!     let id = ctx.param("id").unwrap_or_default().to_owned();
//!     if id == "0" {
//!         return Err(NoSuchPet(id).into());
//!     }
//!     ctx.send(format!(r#"{{"id":"{id}"}}"#));
//!     Ok(())
//! }
//!
//! async fn pet_not_found(ctx: &mut Context) -> Result<(), Fault> {
//!     ctx.set_status(StatusCode::NOT_FOUND);
//!     ctx.send("");
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rudder::Error> {
//!     Server::builder()
//!         .port(3000)
//!         .routing("/v1", vec![handler(trace)], |v1| {
//!             v1.on::<NoSuchPet>(pet_not_found);
//!             v1.scope("/pets", vec![], |pets| {
//!                 pets.get("/{id}", get_pet)
//!             })
//!         })
//!         .build()?
//!         .serve()
//!         .await
//! }
//! ```

mod chain;
mod context;
mod dispatch;
mod error;
mod failure;
mod handler;
mod method;
mod router;
mod scope;
mod server;

pub mod health;

pub use chain::HandlerChain;
pub use context::Context;
pub use dispatch::{ChainExecution, Dispatch, DispatchError, InlineDispatcher, WorkerDispatcher};
pub use error::Error;
pub use failure::{ChainExhausted, Failure, FailureRouter, Fault, FaultNotAttached};
pub use handler::{blocking, handler, BoxedHandler, Handle, Handler};
pub use method::Method;
pub use router::RoutingTable;
pub use scope::Scope;
pub use server::{Server, ServerBuilder};
