mod common;

use http::StatusCode;
use rudder::{Context, Error, Method, Server};

use common::{entries, inline, log, read_body, terminal};

#[tokio::test]
async fn a_second_routing_definition_discards_the_first() {
    let order = log();
    let old = terminal("old", &order);
    let new = terminal("new", &order);

    let server = Server::builder()
        .dispatcher(inline())
        .routing("/old", vec![], move |r| r.get("/route", old.clone()))
        .routing("/new", vec![], move |r| r.get("/route", new.clone()))
        .build()
        .expect("valid configuration");

    let table = server.routing_table();
    assert!(table.lookup(Method::Get, "/old/route").is_none());
    assert!(table.lookup(Method::Get, "/new/route").is_some());

    let response = table
        .dispatch(Context::new(Method::Get, "/old/route"))
        .await
        .expect("dispatch succeeds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = table
        .dispatch(Context::new(Method::Get, "/new/route"))
        .await
        .expect("dispatch succeeds");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "new");
    assert_eq!(entries(&order), vec!["new"]);
}

#[test]
fn overlapping_water_marks_are_rejected_at_build() {
    let result = Server::builder()
        .connection_high_water(8)
        .connection_low_water(8)
        .build();
    assert!(matches!(result, Err(Error::InvalidWaterMarks { high: 8, low: 8 })));

    let result = Server::builder()
        .connection_high_water(8)
        .connection_low_water(16)
        .build();
    assert!(matches!(result, Err(Error::InvalidWaterMarks { .. })));
}

#[test]
fn ordered_water_marks_pass_validation() {
    let result = Server::builder()
        .connection_high_water(8)
        .connection_low_water(4)
        .build();
    assert!(result.is_ok());
}
