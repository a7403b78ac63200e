//! Failures raised by handlers and the router that dispatches them.
//!
//! Any error a handler raises is captured at the chain's dispatch boundary as
//! a [`Fault`] and handed to the [`FailureRouter`], which looks up a handler
//! registered for the failure's **exact** concrete type and falls back to a
//! fixed empty-body 500 when none matches. The two guarantees this module
//! upholds:
//!
//! - every request reaches a terminal response, even when no application code
//!   anticipated the failure;
//! - matching is by exact type only — a handler registered for one failure
//!   type does not catch other types, related or not.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::Context;
use crate::handler::{BoxedHandler, Handle, Handler};

// ── Fault ─────────────────────────────────────────────────────────────────────

/// Satisfied by any error type a handler may raise.
///
/// Blanket-implemented: any `'static` [`std::error::Error`] that is `Send`
/// qualifies, so `thiserror`-derived application errors work unchanged.
pub trait Failure: StdError + Send + 'static {
    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;
}

impl<T: StdError + Send + 'static> Failure for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A captured failure travelling from the raise site to the failure router.
///
/// Constructed implicitly: `Err(e.into())` or `?` inside a handler. The
/// concrete type is preserved and drives exact-type routing.
pub struct Fault {
    inner: Box<dyn Failure>,
}

impl Fault {
    pub fn new<E: Failure>(failure: E) -> Self {
        Self {
            inner: Box::new(failure),
        }
    }

    /// The [`TypeId`] of the concrete failure, the key the router matches on.
    ///
    /// Deliberately not called `type_id`: an inherent method of that name
    /// would shadow [`Any::type_id`], which reports the `TypeId` of `Fault`
    /// itself.
    pub fn failure_type_id(&self) -> TypeId {
        self.inner.as_any().type_id()
    }

    pub fn is<E: Failure>(&self) -> bool {
        self.failure_type_id() == TypeId::of::<E>()
    }

    pub fn downcast_ref<E: Failure>(&self) -> Option<&E> {
        self.inner.as_any().downcast_ref()
    }
}

impl<E: Failure> From<E> for Fault {
    fn from(failure: E) -> Self {
        Self::new(failure)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

// ── Built-in failures ─────────────────────────────────────────────────────────

/// Raised when a handler delegates past the last position in its chain.
///
/// This is an ordinary application failure: register a handler for it to get
/// default-fallthrough behavior (a 404, say) when no terminal handler claims
/// the request; unhandled, it falls through to the empty 500 like any other
/// fault.
#[derive(Debug, Error)]
#[error("no more handlers in chain")]
pub struct ChainExhausted;

/// Raised when the failure router is invoked on an exchange that carries no
/// captured failure.
///
/// This is a programming-contract violation on the caller's side, never a
/// request-level condition, and it is always raised — silently succeeding
/// here would hide the broken call site.
#[derive(Debug, Error)]
#[error("no failure attached to exchange for {path}")]
pub struct FaultNotAttached {
    pub path: String,
}

// ── Failure router ────────────────────────────────────────────────────────────

/// Routes a captured failure to the handler registered for its exact type.
#[derive(Clone)]
pub struct FailureRouter {
    handlers: HashMap<TypeId, BoxedHandler>,
    fallback: BoxedHandler,
}

impl FailureRouter {
    /// An empty router with the default fallback: empty-body 500.
    pub fn new() -> Self {
        Self::from_map(HashMap::new(), unhandled_fallback())
    }

    /// An empty router with a replacement fallback handler.
    pub fn with_fallback(fallback: impl Handler) -> Self {
        Self::from_map(HashMap::new(), fallback.into_handler())
    }

    pub(crate) fn from_map(handlers: HashMap<TypeId, BoxedHandler>, fallback: BoxedHandler) -> Self {
        Self { handlers, fallback }
    }

    /// Registers a handler for the exact failure type `E`.
    ///
    /// Re-registering the same type replaces the previous handler.
    pub fn register<E: Failure>(&mut self, handler: impl Handler) {
        self.handlers
            .insert(TypeId::of::<E>(), handler.into_handler());
    }

    /// Dispatches the failure attached to `ctx`.
    ///
    /// Requires a captured failure on the exchange; raises
    /// [`FaultNotAttached`] otherwise. A failure type with no registered
    /// handler goes to the fallback, which terminates the exchange.
    pub async fn route(&self, ctx: &mut Context) -> Result<(), Fault> {
        let type_id = match ctx.fault() {
            Some(fault) => fault.failure_type_id(),
            None => {
                return Err(FaultNotAttached {
                    path: ctx.path().to_owned(),
                }
                .into());
            }
        };

        match self.handlers.get(&type_id) {
            Some(handler) => {
                debug!(path = ctx.path(), "routing failure to registered handler");
                handler.handle(ctx).await
            }
            None => self.fallback.handle(ctx).await,
        }
    }
}

impl Default for FailureRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal handler for failures nobody registered for.
///
/// Uncaught application failures are indistinguishable from each other at the
/// wire level: a generic 500 with an empty body. The detail stays in the log.
struct UnhandledFailureHandler;

#[async_trait]
impl Handle for UnhandledFailureHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
        warn!(
            path = ctx.path(),
            fault = ?ctx.fault(),
            "no failure handler registered, responding 500"
        );
        ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        ctx.send(Bytes::new());
        Ok(())
    }
}

pub(crate) fn unhandled_fallback() -> BoxedHandler {
    BoxedHandler::new(UnhandledFailureHandler)
}
