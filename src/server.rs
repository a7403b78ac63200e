//! Server assembly: binds a routing definition and network options to the
//! hyper transport.
//!
//! There is no chain-of-responsibility logic here — this module is wiring.
//! The routing tree builds into a [`RoutingTable`], the table becomes the one
//! top-level handler hyper invokes per request, and the network options are
//! passed through to the listener and connection builder.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before SIGKILL. The accept
//! loop reacts by refusing new connections immediately, letting in-flight
//! connection tasks run to completion, and then returning from
//! [`Server::serve`]. Size the grace period above your slowest request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpSocket;
use tracing::{error, info};

use crate::context::Context;
use crate::dispatch::{Dispatch, WorkerDispatcher};
use crate::error::Error;
use crate::failure::unhandled_fallback;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::router::{status_response, RoutingTable};
use crate::scope::Scope;

/// Default is to listen to requests directed to any host.
const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port used by the server.
const DEFAULT_PORT: u16 = 8080;

/// Default listen backlog when none is configured.
const DEFAULT_BACKLOG: u32 = 1024;

type InitFn = Box<dyn Fn(&mut Scope) -> Result<(), Error> + Send + Sync>;

/// The recorded top-level routing definition, deferred until `build()`.
struct RootSpec {
    prefix: String,
    filters: Vec<BoxedHandler>,
    init: InitFn,
}

/// Configures and assembles a [`Server`].
///
/// ```rust,no_run
/// use rudder::{Context, Fault, Server};
///
/// async fn list_pets(ctx: &mut Context) -> Result<(), Fault> {
///     ctx.send(r#"[]"#);
///     Ok(())
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), rudder::Error> {
///     Server::builder()
///         .port(3000)
///         .routing("/v1", vec![], |api| {
///             api.get("/pets", list_pets)
///         })
///         .build()?
///         .serve()
///         .await
/// }
/// ```
pub struct ServerBuilder {
    host: String,
    port: u16,
    worker_threads: Option<usize>,
    backlog: Option<u32>,
    connection_high_water: Option<usize>,
    connection_low_water: Option<usize>,
    no_request_timeout: Option<Duration>,
    dispatcher: Option<Arc<dyn Dispatch>>,
    unhandled: Option<BoxedHandler>,
    routing: Option<RootSpec>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            worker_threads: None,
            backlog: None,
            connection_high_water: None,
            connection_low_water: None,
            no_request_timeout: None,
            dispatcher: None,
            unhandled: None,
            routing: None,
        }
    }

    /// The IP address to listen on; defaults to `0.0.0.0`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// The TCP port to listen on; defaults to 8080.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Worker thread count for the default [`WorkerDispatcher`]; ignored when
    /// a custom dispatcher is set.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Listen backlog passed to the socket.
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = Some(backlog);
        self
    }

    /// Stop accepting new connections once this many are in flight.
    pub fn connection_high_water(mut self, count: usize) -> Self {
        self.connection_high_water = Some(count);
        self
    }

    /// Resume accepting once in-flight connections drain to this count.
    ///
    /// Must be strictly below the high water mark; [`build`](Self::build)
    /// rejects the pair otherwise, since an overlapping pair would re-arm
    /// accepting in the same loop iteration that paused it.
    pub fn connection_low_water(mut self, count: usize) -> Self {
        self.connection_low_water = Some(count);
        self
    }

    /// Close connections whose first request headers do not arrive in time.
    pub fn no_request_timeout(mut self, timeout: Duration) -> Self {
        self.no_request_timeout = Some(timeout);
        self
    }

    /// Replaces the dispatch strategy used by every handler chain.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatch>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Replaces the fallback handler for failures no scope registered for.
    ///
    /// The default answers an empty-body 500.
    pub fn on_unhandled(mut self, handler: impl Handler) -> Self {
        self.unhandled = Some(handler.into_handler());
        self
    }

    /// Defines the server routing under `prefix` with server-wide filters.
    ///
    /// The body is deferred to [`build`](Self::build). Calling `routing`
    /// again discards the previous definition entirely — last call wins.
    pub fn routing(
        mut self,
        prefix: impl Into<String>,
        filters: Vec<BoxedHandler>,
        init: impl Fn(&mut Scope) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.routing = Some(RootSpec {
            prefix: prefix.into(),
            filters,
            init: Box::new(init),
        });
        self
    }

    /// Builds the routing table and resolves the listen address.
    ///
    /// This is where the whole configuration is validated: blank prefixes and
    /// templates, empty or duplicate chains, and template conflicts all
    /// surface here, before a socket is ever bound. `build` can be called
    /// again; each call produces an independent server over fresh chains.
    pub fn build(&self) -> Result<Server, Error> {
        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("{}:{}", self.host, self.port)))?;

        if let (Some(high), Some(low)) = (self.connection_high_water, self.connection_low_water) {
            if low >= high {
                return Err(Error::InvalidWaterMarks { high, low });
            }
        }

        let dispatcher: Arc<dyn Dispatch> = match &self.dispatcher {
            Some(dispatcher) => Arc::clone(dispatcher),
            None => match self.worker_threads {
                Some(threads) => Arc::new(WorkerDispatcher::with_threads(threads)?),
                None => Arc::new(WorkerDispatcher::new()?),
            },
        };

        let fallback = self
            .unhandled
            .clone()
            .unwrap_or_else(unhandled_fallback);

        let table = match &self.routing {
            Some(spec) => {
                if !spec.prefix.is_empty() && spec.prefix.trim().is_empty() {
                    return Err(Error::BlankPrefix);
                }
                let mut root =
                    Scope::with_parts(spec.prefix.trim().to_owned(), spec.filters.clone());
                (spec.init)(&mut root)?;
                root.build_with_fallback(dispatcher, fallback)?
            }
            None => RoutingTable::new(),
        };

        Ok(Server {
            addr,
            table: Arc::new(table),
            backlog: self.backlog.unwrap_or(DEFAULT_BACKLOG),
            connection_high_water: self.connection_high_water,
            connection_low_water: self.connection_low_water,
            no_request_timeout: self.no_request_timeout,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled HTTP server: a frozen routing table plus listener settings.
pub struct Server {
    addr: SocketAddr,
    table: Arc<RoutingTable>,
    backlog: u32,
    connection_high_water: Option<usize>,
    connection_low_water: Option<usize>,
    no_request_timeout: Option<Duration>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The frozen routing table, for embedding in a custom transport loop.
    pub fn routing_table(&self) -> Arc<RoutingTable> {
        Arc::clone(&self.table)
    }

    /// Starts accepting connections and dispatching them through the table.
    ///
    /// Returns only after a full graceful shutdown: SIGTERM or Ctrl-C,
    /// followed by all in-flight connections completing.
    pub async fn serve(self) -> Result<(), Error> {
        let socket = if self.addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(self.addr)?;
        let listener = socket.listen(self.backlog)?;

        info!(addr = %self.addr, "rudder listening");

        // JoinSet tracks every spawned connection task so shutdown can wait
        // for them all, and so the water marks can count in-flight work.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        let high_water = self.connection_high_water.unwrap_or(usize::MAX);
        let low_water = self
            .connection_low_water
            .unwrap_or_else(|| high_water.saturating_sub(1));
        let mut draining = false;

        loop {
            // Accept gating with hysteresis: stop at the high water mark,
            // resume only once in-flight connections fall to the low one.
            if tasks.len() >= high_water {
                draining = true;
            }
            if tasks.len() <= low_water {
                draining = false;
            }

            tokio::select! {
                // `biased` checks arms top-to-bottom: a shutdown signal stops
                // accepting immediately, even with connections queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept(), if !draining => {
                    let (stream, remote_addr) = match res {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let table = Arc::clone(&self.table);
                    let no_request_timeout = self.no_request_timeout;
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // One call per request on the connection, not one per
                        // connection.
                        let svc = service_fn(move |req| {
                            let table = Arc::clone(&table);
                            async move { handle_request(table, req).await }
                        });

                        // auto::Builder negotiates HTTP/1.1 or HTTP/2.
                        let mut conn = ConnBuilder::new(TokioExecutor::new());
                        if let Some(timeout) = no_request_timeout {
                            conn.http1().timer(TokioTimer::new()).header_read_timeout(timeout);
                        }

                        if let Err(e) = conn.serve_connection(io, svc).await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet stays bounded.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("rudder stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Converts one hyper request into a [`Context`], runs it through the table,
/// and converts the finished exchange back.
///
/// The error type is [`Infallible`]: every failure mode ends in a terminal
/// response (405 for unroutable methods, 400 for unreadable bodies, 500 when
/// the dispatch strategy itself fails), so hyper never sees an error.
async fn handle_request(
    table: Arc<RoutingTable>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let method = match req.method().as_str().parse::<Method>() {
        Ok(method) => method,
        Err(()) => return Ok(status_response(StatusCode::METHOD_NOT_ALLOWED)),
    };
    let path = req.uri().path().to_owned();

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(path, "failed to read request body: {e}");
            return Ok(status_response(StatusCode::BAD_REQUEST));
        }
    };

    let ctx = Context::with_request(method, path, parts.headers, body);

    match table.dispatch(ctx).await {
        Ok(response) => Ok(response),
        Err(e) => {
            // Capacity or lifecycle failure in the dispatch strategy. The
            // client still gets a terminal response.
            error!("dispatch failed: {e}");
            Ok(status_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal: SIGTERM (Kubernetes) or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // On non-Unix platforms only Ctrl-C is available.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
