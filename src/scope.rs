//! Nested routing configuration: scopes, filters and deferred build.
//!
//! A [`Scope`] is pure configuration data — no I/O happens until the server
//! starts. Each scope owns a path prefix, an ordered filter list, a map of
//! route templates to per-method handlers, a map of failure types to
//! handlers, and child scopes. Nested scope bodies are **deferred**: calling
//! [`Scope::scope`] validates the prefix and records the initializer, but the
//! body only runs during [`Scope::build`], after the parent's failure map has
//! been merged into the child. A configuration mistake inside a nested body
//! therefore surfaces at build time, never at request time.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::chain::HandlerChain;
use crate::dispatch::Dispatch;
use crate::error::Error;
use crate::failure::{unhandled_fallback, Failure, FailureRouter};
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::router::RoutingTable;

type InitFn = Box<dyn Fn(&mut Scope) -> Result<(), Error> + Send + Sync>;

/// A deferred child scope: resolved prefix and filters captured at
/// declaration, body not yet run.
struct ChildSpec {
    prefix: String,
    filters: Vec<BoxedHandler>,
    init: InitFn,
}

/// A node in the routing configuration tree.
///
/// Mutable only while being configured; [`build`](Scope::build) freezes it
/// into a [`RoutingTable`] and can be called repeatedly, producing fresh
/// chains with identical behavior each time.
pub struct Scope {
    prefix: String,
    filters: Vec<BoxedHandler>,
    routes: HashMap<String, HashMap<Method, BoxedHandler>>,
    failures: HashMap<TypeId, BoxedHandler>,
    children: Vec<ChildSpec>,
}

impl Scope {
    /// A root scope under `prefix`.
    ///
    /// The root prefix may be empty; a non-empty prefix must not be
    /// whitespace-only. It is stored trimmed.
    pub fn new(prefix: &str) -> Result<Self, Error> {
        if !prefix.is_empty() && prefix.trim().is_empty() {
            return Err(Error::BlankPrefix);
        }
        Ok(Self::with_parts(prefix.trim().to_owned(), Vec::new()))
    }

    pub(crate) fn with_parts(prefix: String, filters: Vec<BoxedHandler>) -> Self {
        Self {
            prefix,
            filters,
            routes: HashMap::new(),
            failures: HashMap::new(),
            children: Vec::new(),
        }
    }

    // ── Route registration ────────────────────────────────────────────────────

    /// Registers a handler for `method` under `prefix + template`.
    ///
    /// The template may be empty (the scope's own prefix is the route) but
    /// must not be whitespace-only; it is stored trimmed. Parameters use
    /// `{name}` syntax, retrieved with [`Context::param`](crate::Context::param).
    /// Registering the same `(method, resolved template)` twice keeps the
    /// last handler.
    pub fn route(
        &mut self,
        method: Method,
        template: &str,
        handler: impl Handler,
    ) -> Result<(), Error> {
        if !template.is_empty() && template.trim().is_empty() {
            return Err(Error::BlankTemplate);
        }

        let resolved = format!("{}{}", self.prefix, template.trim());
        self.routes
            .entry(resolved)
            .or_default()
            .insert(method, handler.into_handler());
        Ok(())
    }

    pub fn head(&mut self, template: &str, handler: impl Handler) -> Result<(), Error> {
        self.route(Method::Head, template, handler)
    }

    pub fn get(&mut self, template: &str, handler: impl Handler) -> Result<(), Error> {
        self.route(Method::Get, template, handler)
    }

    pub fn post(&mut self, template: &str, handler: impl Handler) -> Result<(), Error> {
        self.route(Method::Post, template, handler)
    }

    pub fn put(&mut self, template: &str, handler: impl Handler) -> Result<(), Error> {
        self.route(Method::Put, template, handler)
    }

    pub fn patch(&mut self, template: &str, handler: impl Handler) -> Result<(), Error> {
        self.route(Method::Patch, template, handler)
    }

    pub fn delete(&mut self, template: &str, handler: impl Handler) -> Result<(), Error> {
        self.route(Method::Delete, template, handler)
    }

    pub fn options(&mut self, template: &str, handler: impl Handler) -> Result<(), Error> {
        self.route(Method::Options, template, handler)
    }

    // ── Nesting ───────────────────────────────────────────────────────────────

    /// Opens a nested scope under `prefix` with additional filters.
    ///
    /// The child inherits this scope's filters (parent filters first, order
    /// preserved) and resolves its prefix against this scope's. `init` is
    /// deferred: it runs during [`build`](Scope::build), after failure
    /// handlers have been inherited. The prefix must be non-blank.
    pub fn scope(
        &mut self,
        prefix: &str,
        filters: Vec<BoxedHandler>,
        init: impl Fn(&mut Scope) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        if prefix.trim().is_empty() {
            return Err(Error::BlankPrefix);
        }

        let mut combined = self.filters.clone();
        combined.extend(filters);
        self.children.push(ChildSpec {
            prefix: format!("{}{}", self.prefix, prefix.trim()),
            filters: combined,
            init: Box::new(init),
        });
        Ok(())
    }

    /// Opens a nested scope with additional filters but no prefix change.
    pub fn filter(
        &mut self,
        filters: Vec<BoxedHandler>,
        init: impl Fn(&mut Scope) -> Result<(), Error> + Send + Sync + 'static,
    ) {
        let mut combined = self.filters.clone();
        combined.extend(filters);
        self.children.push(ChildSpec {
            prefix: self.prefix.clone(),
            filters: combined,
            init: Box::new(init),
        });
    }

    // ── Failure handlers ──────────────────────────────────────────────────────

    /// Registers a handler for failures of the exact type `E` raised in this
    /// scope or any descendant.
    ///
    /// A descendant re-registering the same type shadows this registration
    /// for its own subtree. Re-registering within one scope overwrites.
    pub fn on<E: Failure>(&mut self, handler: impl Handler) {
        self.failures
            .insert(TypeId::of::<E>(), handler.into_handler());
    }

    // ── Build ─────────────────────────────────────────────────────────────────

    /// Freezes this scope tree into a flattened routing table.
    ///
    /// Depth-first: every child is materialized with this scope's failure
    /// handlers merged in (the child's own declarations win), the child's
    /// deferred body runs — the first place a nested configuration error can
    /// surface — and its resolved routes fold into the table. Each direct
    /// route becomes a [`HandlerChain`] of this scope's filters plus the
    /// route handler.
    pub fn build(&self, dispatcher: Arc<dyn Dispatch>) -> Result<RoutingTable, Error> {
        self.build_with_fallback(dispatcher, unhandled_fallback())
    }

    pub(crate) fn build_with_fallback(
        &self,
        dispatcher: Arc<dyn Dispatch>,
        fallback: BoxedHandler,
    ) -> Result<RoutingTable, Error> {
        let mut table = RoutingTable::new();
        self.resolve(&dispatcher, &fallback, &mut table)?;
        Ok(table)
    }

    fn resolve(
        &self,
        dispatcher: &Arc<dyn Dispatch>,
        fallback: &BoxedHandler,
        table: &mut RoutingTable,
    ) -> Result<(), Error> {
        let router = FailureRouter::from_map(self.failures.clone(), fallback.clone());

        for (template, by_method) in &self.routes {
            for (&method, handler) in by_method {
                let mut handlers = self.filters.clone();
                handlers.push(handler.clone());

                debug!(%method, template, "found route");
                let chain = HandlerChain::new(handlers, router.clone(), Arc::clone(dispatcher))?;
                table.insert(method, template, chain)?;
            }
        }

        for child in &self.children {
            let mut scope = Self::with_parts(child.prefix.clone(), child.filters.clone());
            // Inherited entries seed the child's map; the deferred body runs
            // next, so the child's own registrations overwrite them.
            scope.failures = self.failures.clone();
            (child.init)(&mut scope)?;
            scope.resolve(dispatcher, fallback, table)?;
        }

        Ok(())
    }
}
