//! Ordered handler chains with a single failure-capture boundary.

use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use tracing::{debug, error};

use crate::context::Context;
use crate::dispatch::{ChainExecution, Dispatch, DispatchError};
use crate::error::Error;
use crate::failure::FailureRouter;
use crate::handler::BoxedHandler;

/// An ordered, duplicate-free sequence of handlers bound to a failure router
/// and a dispatch strategy.
///
/// One chain is built per resolved route and reused by every request to that
/// route, so it holds no per-request state: the traversal cursor lives on the
/// [`Context`], and each handler delegates by inviting the exchange to visit
/// its successor (`ctx.next().await`) rather than by holding a reference to
/// it. That keeps handlers freely shareable across scopes and chains.
///
/// Failure capture is a single boundary around the whole invocation: whatever
/// any handler raises — including [`ChainExhausted`](crate::ChainExhausted)
/// from delegating past the tail — is attached to the exchange and routed,
/// and the exchange always terminates.
pub struct HandlerChain {
    handlers: Arc<[BoxedHandler]>,
    router: FailureRouter,
    dispatcher: Arc<dyn Dispatch>,
}

impl HandlerChain {
    /// Builds a chain from the given handlers, in order.
    ///
    /// Rejects an empty list ([`Error::EmptyChain`]) and a list containing
    /// the same handler instance twice ([`Error::DuplicateHandlers`]) — a
    /// repeated instance would make "advance to the next handler" ambiguous
    /// about which occurrence is current. Identity is instance identity:
    /// clones of one [`BoxedHandler`] count as the same handler, two separate
    /// registrations of the same `async fn` do not.
    pub fn new(
        handlers: Vec<BoxedHandler>,
        router: FailureRouter,
        dispatcher: Arc<dyn Dispatch>,
    ) -> Result<Self, Error> {
        if handlers.is_empty() {
            return Err(Error::EmptyChain);
        }

        for (i, a) in handlers.iter().enumerate() {
            if handlers[i + 1..].iter().any(|b| BoxedHandler::ptr_eq(a, b)) {
                return Err(Error::DuplicateHandlers);
            }
        }

        Ok(Self {
            handlers: handlers.into(),
            router,
            dispatcher,
        })
    }

    /// Runs the chain for one exchange.
    ///
    /// The cursor is attached at the head, then the entire execution — head
    /// handler, every delegation, and any failure routing — is handed to the
    /// dispatch strategy as one body. An `Err` here means the dispatcher
    /// itself could not run the body; that is a capacity problem for the
    /// transport loop, not an application failure.
    pub async fn invoke(&self, mut ctx: Context) -> Result<Context, DispatchError> {
        let handlers = Arc::clone(&self.handlers);
        let router = self.router.clone();

        let body: ChainExecution = Box::pin(async move {
            ctx.begin_chain(Arc::clone(&handlers));

            if let Err(fault) = handlers[0].handle(&mut ctx).await {
                debug!(path = ctx.path(), fault = %fault, "chain raised, routing failure");
                ctx.attach_fault(fault);

                if let Err(residual) = router.route(&mut ctx).await {
                    // Last resort: the failure handler itself failed (or the
                    // routing contract was violated). The client still gets a
                    // terminal response.
                    error!(
                        path = ctx.path(),
                        fault = %residual,
                        "failure handling failed, terminating with 500"
                    );
                    ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                    ctx.send(Bytes::new());
                }
            }

            ctx
        });

        self.dispatcher.dispatch(body).await
    }
}
