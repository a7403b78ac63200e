//! Per-request exchange state.
//!
//! A [`Context`] is created for every inbound request and dropped when the
//! response has been written. It is the *only* mutable state touched while a
//! request is being handled: the routing table, the handler chains and the
//! failure maps are all frozen after the build pass and shared across
//! concurrent requests without locking.
//!
//! # The chain cursor
//!
//! Handler chains are shared by every concurrent request for their route, so
//! the "current position in the chain" cannot live on the chain itself. It
//! lives here instead: the chain attaches an immutable handler slice plus an
//! index when it starts running, and [`Context::next`] advances the index and
//! invokes the successor. Advancing past the last handler raises
//! [`ChainExhausted`], an ordinary [`Fault`] that application code may catch
//! with a registered failure handler.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use tracing::warn;

use crate::failure::{ChainExhausted, Fault};
use crate::handler::BoxedHandler;
use crate::method::Method;

/// One HTTP request/response exchange.
pub struct Context {
    method: Method,
    path: String,
    request_headers: HeaderMap,
    request_body: Bytes,
    params: HashMap<String, String>,

    status: StatusCode,
    response_headers: HeaderMap,
    response_body: Bytes,
    ended: bool,

    attachments: HashMap<TypeId, Box<dyn Any + Send>>,

    chain: Option<Arc<[BoxedHandler]>>,
    position: usize,
    fault: Option<Fault>,
}

impl Context {
    /// Creates an exchange with no request headers, body or parameters.
    ///
    /// This is the entry point for driving chains outside a real server, e.g.
    /// from tests or a custom transport integration. The server constructs
    /// its contexts from the incoming hyper request instead.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self::with_request(method, path.into(), HeaderMap::new(), Bytes::new())
    }

    pub(crate) fn with_request(
        method: Method,
        path: String,
        request_headers: HeaderMap,
        request_body: Bytes,
    ) -> Self {
        Self {
            method,
            path,
            request_headers,
            request_body,
            params: HashMap::new(),
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: Bytes::new(),
            ended: false,
            attachments: HashMap::new(),
            chain: None,
            position: 0,
            fault: None,
        }
    }

    /// Replaces the request body. Intended for test setups.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.request_body = body.into();
        self
    }

    // ── Request side ──────────────────────────────────────────────────────────

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &Bytes {
        &self.request_body
    }

    /// Case-insensitive request header lookup; non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request_headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/pets/{id}`, `ctx.param("id")` on `/pets/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    // ── Response side ─────────────────────────────────────────────────────────

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Adds a response header. Invalid names or values are dropped with a log
    /// line rather than aborting the exchange.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.response_headers.insert(name, value);
            }
            _ => warn!(name, "dropping invalid response header"),
        }
    }

    /// Sets the response body and ends the exchange.
    pub fn send(&mut self, body: impl Into<Bytes>) {
        self.response_body = body.into();
        self.ended = true;
    }

    /// Ends the exchange with the response state accumulated so far.
    ///
    /// A handler that returns without calling [`send`](Self::send) or
    /// [`end`](Self::end) still terminates the exchange: whatever status and
    /// body are present when the chain completes get written to the client.
    pub fn end(&mut self) {
        self.ended = true;
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn response_body(&self) -> &Bytes {
        &self.response_body
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Freezes the accumulated response state into a hyper-compatible response.
    pub fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.response_body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.response_headers;
        response
    }

    // ── Attachments ───────────────────────────────────────────────────────────

    /// Attaches a value to this exchange, keyed by its type.
    ///
    /// This is how filters hand data to downstream handlers (request ids,
    /// authenticated principals, …). A second attachment of the same type
    /// replaces the first.
    pub fn put_attachment<T: Send + 'static>(&mut self, value: T) {
        self.attachments.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn attachment<T: Send + 'static>(&self) -> Option<&T> {
        self.attachments
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    pub fn take_attachment<T: Send + 'static>(&mut self) -> Option<T> {
        self.attachments
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|v| *v)
    }

    // ── Faults ────────────────────────────────────────────────────────────────

    /// The failure captured at the chain boundary, if any.
    ///
    /// Failure handlers read this to inspect what went wrong.
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Attaches a captured failure to this exchange.
    pub fn attach_fault(&mut self, fault: Fault) {
        self.fault = Some(fault);
    }

    pub fn take_fault(&mut self) -> Option<Fault> {
        self.fault.take()
    }

    // ── Chain traversal ───────────────────────────────────────────────────────

    pub(crate) fn begin_chain(&mut self, handlers: Arc<[BoxedHandler]>) {
        self.chain = Some(handlers);
        self.position = 0;
    }

    /// Delegates this exchange to the next handler in the chain.
    ///
    /// Advancing is strictly forward and single-use per position: calling
    /// `next` on the last handler — or again after the chain is exhausted —
    /// raises [`ChainExhausted`] rather than silently doing nothing, so a
    /// missing terminal handler is observable and can itself be caught by a
    /// registered failure handler.
    pub async fn next(&mut self) -> Result<(), Fault> {
        let Some(chain) = self.chain.clone() else {
            return Err(ChainExhausted.into());
        };

        if self.position + 1 >= chain.len() {
            return Err(ChainExhausted.into());
        }

        self.position += 1;
        chain[self.position].handle(self).await
    }
}
