//! Flattened routing table: the single top-level handler handed to the
//! transport engine.
//!
//! One radix tree per HTTP method — O(path-length) lookup via [`matchit`].
//! Built once from a [`Scope`](crate::Scope) tree; read-only and safe for
//! unsynchronized concurrent lookups afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use matchit::Router as MatchitRouter;

use crate::chain::HandlerChain;
use crate::context::Context;
use crate::dispatch::DispatchError;
use crate::error::Error;
use crate::method::Method;

/// The frozen routing table: `(method, path template)` to handler chain.
pub struct RoutingTable {
    routes: HashMap<Method, MatchitRouter<Arc<HandlerChain>>>,
}

impl RoutingTable {
    pub(crate) fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Registers a resolved route. An empty resolved path registers as `"/"`.
    pub(crate) fn insert(
        &mut self,
        method: Method,
        template: &str,
        chain: HandlerChain,
    ) -> Result<(), Error> {
        let path = if template.is_empty() { "/" } else { template };

        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(chain))
            .map_err(|source| Error::InvalidTemplate {
                template: path.to_owned(),
                source,
            })
    }

    /// Resolves a request to its handler chain and extracted path parameters.
    pub fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(Arc<HandlerChain>, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let chain = Arc::clone(matched.value);
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((chain, params))
    }

    /// Handles one exchange end to end: resolve, invoke the chain, freeze the
    /// response. Unmatched requests answer an empty 404.
    ///
    /// An `Err` means the chain's dispatch strategy could not run the body at
    /// all; the transport loop decides how to report that to the client.
    pub async fn dispatch(
        &self,
        mut ctx: Context,
    ) -> Result<http::Response<Full<Bytes>>, DispatchError> {
        let path = ctx.path().to_owned();

        match self.lookup(ctx.method(), &path) {
            Some((chain, params)) => {
                ctx.set_params(params);
                let ctx = chain.invoke(ctx).await?;
                Ok(ctx.into_response())
            }
            None => Ok(status_response(StatusCode::NOT_FOUND)),
        }
    }
}

/// An empty-body response with the given status.
pub(crate) fn status_response(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
