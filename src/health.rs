//! Built-in Kubernetes health-check handlers.
//!
//! Kubernetes asks two questions; these handlers answer them.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them like any other handler:
//!
//! ```rust,no_run
//! use rudder::{health, Server};
//!
//! let builder = Server::builder().routing("", vec![], |root| {
//!     root.get("/healthz", health::liveness)?;
//!     root.get("/readyz", health::readiness)
//! });
//! ```
//!
//! Replace `readiness` with your own handler to gate on dependency
//! availability (database connections, downstream services, …).

use crate::context::Context;
use crate::failure::Fault;

/// Kubernetes liveness probe handler.
///
/// Always `200 OK` with body `"ok"`: if the process can respond to HTTP at
/// all, it is alive. Intentionally has no dependencies.
pub async fn liveness(ctx: &mut Context) -> Result<(), Fault> {
    ctx.send("ok");
    Ok(())
}

/// Kubernetes readiness probe handler (default implementation).
///
/// Always `200 OK` with body `"ready"`. Replace it if your application needs
/// a warm-up period or must verify dependency health first.
pub async fn readiness(ctx: &mut Context) -> Result<(), Fault> {
    ctx.send("ready");
    Ok(())
}
