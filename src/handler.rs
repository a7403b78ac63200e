//! Handler contract and the three equivalent handler shapes.
//!
//! A handler is a unit of work that receives the request [`Context`], may
//! mutate its response state, may delegate onward with `ctx.next().await`,
//! and may raise a [`Fault`]. Three construction shapes are accepted:
//!
//! 1. a bare `async fn(&mut Context) -> Result<(), Fault>` — the everyday
//!    shape, accepted anywhere an `impl Handler` is expected;
//! 2. an object implementing [`Handle`], normalized by [`BoxedHandler::new`] —
//!    use this when the handler carries state (counters, clients, config);
//! 3. a legacy synchronous closure wrapped by [`blocking`] — it runs on the
//!    worker dispatcher's execution context, so blocking inside it is safe.
//!
//! All three normalize to a [`BoxedHandler`] with identical return/raise
//! semantics; the adapters wrap, they never change behavior.
//!
//! # How handlers are stored
//!
//! The scope tree needs to hold handlers of *different* concrete types in one
//! structure, so the typed world is bridged to a trait-object world once, at
//! registration: `Arc<dyn Handle>` behind the [`BoxedHandler`] newtype. The
//! `Arc` matters twice over — it makes per-request sharing a single atomic
//! increment, and its pointer identity is what the chain's duplicate check
//! compares. Cloning a `BoxedHandler` therefore yields *the same* handler;
//! registering a fresh `async fn` twice yields two distinct ones.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::failure::Fault;

// ── Canonical contract ────────────────────────────────────────────────────────

/// The canonical handler contract: one suspending method.
///
/// Implement this directly for stateful handlers and wrap them with
/// [`BoxedHandler::new`]; plain `async fn`s satisfy [`Handler`] automatically
/// and never need to touch this trait.
///
/// ```rust
/// use async_trait::async_trait;
/// use rudder::{Context, Fault, Handle};
///
/// struct Greeter { name: &'static str }
///
/// #[async_trait]
/// impl Handle for Greeter {
///     async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
///         ctx.send(format!("hello from {}", self.name));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handle: Send + Sync + 'static {
    async fn handle(&self, ctx: &mut Context) -> Result<(), Fault>;
}

/// A normalized, shareable handler.
///
/// This is the single internal shape every registration collapses to. Clones
/// share identity: a `BoxedHandler` cloned into several scopes is *one*
/// handler as far as the duplicate-in-chain check is concerned.
#[derive(Clone)]
pub struct BoxedHandler(Arc<dyn Handle>);

impl BoxedHandler {
    /// Normalizes an object-shape handler.
    pub fn new(handler: impl Handle) -> Self {
        Self(Arc::new(handler))
    }

    /// Invokes the underlying handler.
    pub async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
        self.0.handle(ctx).await
    }

    /// Identity comparison: do both wrappers point at the same handler?
    pub(crate) fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

// ── Function shape ────────────────────────────────────────────────────────────

/// Lifetime-carrying view of an async handler function.
///
/// `async fn(&mut Context) -> …` returns a future that borrows its argument,
/// so a plain `Fn(&mut Context) -> Fut` bound cannot name the return type.
/// This helper trait ties the future's lifetime to the borrow; the blanket
/// [`Handler`] impl then requires `for<'a> HandlerFn<'a>`, which `async fn`
/// items satisfy.
#[doc(hidden)]
pub trait HandlerFn<'a>: Send + Sync + 'static {
    type Future: Future<Output = Result<(), Fault>> + Send + 'a;

    fn invoke(&'a self, ctx: &'a mut Context) -> Self::Future;
}

impl<'a, F, Fut> HandlerFn<'a> for F
where
    F: Fn(&'a mut Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Fault>> + Send + 'a,
{
    type Future = Fut;

    fn invoke(&'a self, ctx: &'a mut Context) -> Fut {
        self(ctx)
    }
}

/// Newtype bridging the function shape to the canonical contract.
struct FnHandler<F>(F);

#[async_trait]
impl<F> Handle for FnHandler<F>
where
    F: for<'a> HandlerFn<'a>,
{
    async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
        self.0.invoke(ctx).await
    }
}

// ── Legacy synchronous shape ──────────────────────────────────────────────────

/// Newtype bridging a synchronous closure to the canonical contract.
struct BlockingHandler<F>(F);

#[async_trait]
impl<F> Handle for BlockingHandler<F>
where
    F: Fn(&mut Context) -> Result<(), Fault> + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
        (self.0)(ctx)
    }
}

/// Adapts a legacy synchronous handler.
///
/// The closure runs inside whatever execution context the chain's dispatch
/// strategy provides; under the default worker dispatcher it may block
/// without stalling the transport's I/O threads. A blocking handler cannot
/// delegate with `ctx.next()` — give it the terminal position in its chain.
pub fn blocking<F>(f: F) -> BoxedHandler
where
    F: Fn(&mut Context) -> Result<(), Fault> + Send + Sync + 'static,
{
    BoxedHandler::new(BlockingHandler(f))
}

// ── Registration conversion ───────────────────────────────────────────────────

/// Accepted by every registration point (`route`, filters, failure handlers).
///
/// The trait is **sealed**: it exists only to let registration methods accept
/// both bare `async fn`s and pre-normalized [`BoxedHandler`]s through one
/// parameter, and its set of implementors is fixed.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F> private::Sealed for F where F: for<'a> HandlerFn<'a> {}

impl<F> Handler for F
where
    F: for<'a> HandlerFn<'a>,
{
    fn into_handler(self) -> BoxedHandler {
        BoxedHandler::new(FnHandler(self))
    }
}

impl private::Sealed for BoxedHandler {}

impl Handler for BoxedHandler {
    fn into_handler(self) -> BoxedHandler {
        self
    }
}

/// Pre-erases any accepted handler shape.
///
/// Use this to build filter vectors, or to hold on to one handler instance
/// and register it in several places:
///
/// ```rust
/// use rudder::{handler, Context, Fault};
///
/// async fn audit(ctx: &mut Context) -> Result<(), Fault> {
///     ctx.next().await
/// }
///
/// let shared = handler(audit);
/// let filters = vec![shared.clone()];
/// ```
pub fn handler(h: impl Handler) -> BoxedHandler {
    h.into_handler()
}
