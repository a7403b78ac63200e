mod common;

use http::StatusCode;
use rudder::{Context, FailureRouter, Fault, FaultNotAttached, Method};

use common::{respond, FailureA, FailureB};

#[test]
fn the_failure_type_id_is_the_concrete_type_not_the_container() {
    use std::any::{Any, TypeId};

    let fault: Fault = FailureA.into();
    assert_eq!(fault.failure_type_id(), TypeId::of::<FailureA>());
    // The container stays visible as itself to `Any`-based code.
    assert_eq!(Any::type_id(&fault), TypeId::of::<Fault>());
}

#[test]
fn faults_preserve_the_concrete_type() {
    let fault: Fault = FailureA.into();

    assert!(fault.is::<FailureA>());
    assert!(!fault.is::<FailureB>());
    assert!(fault.downcast_ref::<FailureA>().is_some());
    assert!(fault.downcast_ref::<FailureB>().is_none());
    assert_eq!(fault.to_string(), "failure a");
}

#[tokio::test]
async fn routes_to_the_handler_registered_for_the_exact_type() {
    let mut router = FailureRouter::new();
    router.register::<FailureA>(respond(StatusCode::NOT_FOUND, "a"));
    router.register::<FailureB>(respond(StatusCode::CONFLICT, "b"));

    let mut ctx = Context::new(Method::Get, "/x");
    ctx.attach_fault(FailureB.into());
    router.route(&mut ctx).await.expect("handler succeeds");

    assert_eq!(ctx.status(), StatusCode::CONFLICT);
    assert_eq!(ctx.response_body(), "b".as_bytes());
    assert!(ctx.ended());
}

#[tokio::test]
async fn unregistered_types_fall_through_to_the_empty_500() {
    let mut router = FailureRouter::new();
    router.register::<FailureA>(respond(StatusCode::NOT_FOUND, "a"));

    let mut ctx = Context::new(Method::Get, "/x");
    ctx.attach_fault(FailureB.into());
    router.route(&mut ctx).await.expect("fallback succeeds");

    assert_eq!(ctx.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(ctx.response_body().is_empty());
    assert!(ctx.ended());
}

#[tokio::test]
async fn a_replaced_fallback_handles_unregistered_types() {
    let router = FailureRouter::with_fallback(respond(StatusCode::SERVICE_UNAVAILABLE, "sorry"));

    let mut ctx = Context::new(Method::Get, "/x");
    ctx.attach_fault(FailureA.into());
    router.route(&mut ctx).await.expect("fallback succeeds");

    assert_eq!(ctx.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(ctx.response_body(), "sorry".as_bytes());
}

#[tokio::test]
async fn routing_without_an_attached_fault_raises() {
    let router = FailureRouter::new();

    let mut ctx = Context::new(Method::Get, "/broken");
    let err = router
        .route(&mut ctx)
        .await
        .expect_err("nothing was attached");

    assert!(err.is::<FaultNotAttached>());
    let detail = err.downcast_ref::<FaultNotAttached>().expect("exact type");
    assert_eq!(detail.path, "/broken");
}

#[tokio::test]
async fn re_registering_a_type_replaces_the_handler() {
    let mut router = FailureRouter::new();
    router.register::<FailureA>(respond(StatusCode::NOT_FOUND, "first"));
    router.register::<FailureA>(respond(StatusCode::GONE, "second"));

    let mut ctx = Context::new(Method::Get, "/x");
    ctx.attach_fault(FailureA.into());
    router.route(&mut ctx).await.expect("handler succeeds");

    assert_eq!(ctx.status(), StatusCode::GONE);
    assert_eq!(ctx.response_body(), "second".as_bytes());
}

#[tokio::test]
async fn failure_handlers_may_consume_the_fault() {
    async fn consume(ctx: &mut Context) -> Result<(), Fault> {
        let fault = ctx.take_fault().expect("a fault was attached");
        assert!(fault.is::<FailureA>());
        assert!(ctx.fault().is_none());
        ctx.send("consumed");
        Ok(())
    }

    let mut router = FailureRouter::new();
    router.register::<FailureA>(consume);

    let mut ctx = Context::new(Method::Get, "/x");
    ctx.attach_fault(FailureA.into());
    router.route(&mut ctx).await.expect("handler succeeds");

    assert_eq!(ctx.response_body(), "consumed".as_bytes());
    assert!(ctx.fault().is_none());
}

#[tokio::test]
async fn failure_handlers_may_inspect_the_fault() {
    #[derive(Debug, thiserror::Error)]
    #[error("no pet {0}")]
    struct NoSuchPet(String);

    async fn pet_not_found(ctx: &mut Context) -> Result<(), Fault> {
        let id = ctx
            .fault()
            .and_then(|f| f.downcast_ref::<NoSuchPet>())
            .map(|f| f.0.clone())
            .unwrap_or_default();
        ctx.set_status(StatusCode::NOT_FOUND);
        ctx.send(format!("unknown pet {id}"));
        Ok(())
    }

    let mut router = FailureRouter::new();
    router.register::<NoSuchPet>(pet_not_found);

    let mut ctx = Context::new(Method::Get, "/pets/9");
    ctx.attach_fault(NoSuchPet("9".into()).into());
    router.route(&mut ctx).await.expect("handler succeeds");

    assert_eq!(ctx.status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.response_body(), "unknown pet 9".as_bytes());
}
