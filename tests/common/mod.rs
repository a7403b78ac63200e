//! Shared test fixtures: instrumented handlers and a few canned failures.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use rudder::{BoxedHandler, Context, Dispatch, Fault, Handle, InlineDispatcher};

/// Invocation order shared between instrumented handlers and the test body.
pub type Log = Arc<Mutex<Vec<&'static str>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<&'static str> {
    log.lock().unwrap().clone()
}

/// Records its label on invocation, then either delegates (filter) or
/// terminates the exchange with its label as the body (handler).
struct Recorder {
    label: &'static str,
    log: Log,
    delegate: bool,
}

#[async_trait]
impl Handle for Recorder {
    async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
        self.log.lock().unwrap().push(self.label);
        if self.delegate {
            ctx.next().await
        } else {
            ctx.send(self.label);
            Ok(())
        }
    }
}

/// An instrumented filter: records `label`, then delegates.
pub fn filter(label: &'static str, log: &Log) -> BoxedHandler {
    BoxedHandler::new(Recorder {
        label,
        log: Arc::clone(log),
        delegate: true,
    })
}

/// An instrumented terminal handler: records `label`, responds with it.
pub fn terminal(label: &'static str, log: &Log) -> BoxedHandler {
    BoxedHandler::new(Recorder {
        label,
        log: Arc::clone(log),
        delegate: false,
    })
}

/// A handler that raises whatever `make` produces.
pub fn raising(make: impl Fn() -> Fault + Send + Sync + 'static) -> BoxedHandler {
    struct Raiser<F>(F);

    #[async_trait]
    impl<F> Handle for Raiser<F>
    where
        F: Fn() -> Fault + Send + Sync + 'static,
    {
        async fn handle(&self, _ctx: &mut Context) -> Result<(), Fault> {
            Err((self.0)())
        }
    }

    BoxedHandler::new(Raiser(make))
}

/// A handler that terminates the exchange with a fixed status and body.
pub fn respond(status: StatusCode, body: &'static str) -> BoxedHandler {
    struct Responder {
        status: StatusCode,
        body: &'static str,
    }

    #[async_trait]
    impl Handle for Responder {
        async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
            ctx.set_status(self.status);
            ctx.send(self.body);
            Ok(())
        }
    }

    BoxedHandler::new(Responder { status, body })
}

/// The cooperative dispatcher: chain tests need no worker runtime.
pub fn inline() -> Arc<dyn Dispatch> {
    Arc::new(InlineDispatcher)
}

pub async fn read_body(response: http::Response<Full<Bytes>>) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("collecting a Full body cannot fail")
        .to_bytes()
}

#[derive(Debug, thiserror::Error)]
#[error("failure a")]
pub struct FailureA;

#[derive(Debug, thiserror::Error)]
#[error("failure b")]
pub struct FailureB;
