//! Full-stack test: a real listener, raw HTTP/1.1 over a TCP socket.

use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http::StatusCode;
use rudder::{handler, Context, Fault, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

static HITS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, thiserror::Error)]
#[error("no pet {0}")]
struct NoSuchPet(String);

async fn tag(ctx: &mut Context) -> Result<(), Fault> {
    ctx.set_header("x-served-by", "rudder");
    ctx.next().await
}

async fn get_pet(ctx: &mut Context) -> Result<(), Fault> {
    HITS.fetch_add(1, Ordering::SeqCst);
    let id = ctx.param("id").unwrap_or_default().to_owned();
    if id == "0" {
        return Err(NoSuchPet(id).into());
    }
    ctx.send(id);
    Ok(())
}

async fn pet_not_found(ctx: &mut Context) -> Result<(), Fault> {
    ctx.set_status(StatusCode::NOT_FOUND);
    ctx.send("missing");
    Ok(())
}

/// Grabs an ephemeral port. A tiny race against another process exists, but
/// the server binds with SO_REUSEADDR so rebinding the port succeeds.
fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

/// Writes one raw HTTP/1.1 request and reads the connection to EOF, retrying
/// the connect until the server has come up.
async fn roundtrip(port: u16, raw: &str) -> String {
    for _ in 0..100 {
        let Ok(mut stream) = TcpStream::connect(("127.0.0.1", port)).await else {
            tokio::time::sleep(Duration::from_millis(10)).await;
            continue;
        };
        stream.write_all(raw.as_bytes()).await.expect("write request");
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .await
            .expect("read response");
        return response;
    }
    panic!("server never started listening on port {port}");
}

fn raw_request(method: &str, path: &str) -> String {
    format!("{method} {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
}

#[tokio::test]
async fn serves_nested_routes_and_failures_over_the_wire() {
    let port = free_port();
    let server = Server::builder()
        .host("127.0.0.1")
        .port(port)
        .no_request_timeout(Duration::from_secs(5))
        .routing("/v1", vec![handler(tag)], |v1| {
            v1.scope("/api", vec![], |api| {
                api.on::<NoSuchPet>(pet_not_found);
                api.get("/pets/{id}", get_pet)
            })
        })
        .build()
        .expect("valid configuration");

    tokio::spawn(server.serve());

    // A matched route runs its handler exactly once, filters included.
    let response = roundtrip(port, &raw_request("GET", "/v1/api/pets/42")).await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.to_lowercase().contains("x-served-by: rudder"), "{response}");
    assert!(response.ends_with("42"), "{response}");
    assert_eq!(HITS.load(Ordering::SeqCst), 1);

    // A raised failure routes to the scope's registered handler.
    let response = roundtrip(port, &raw_request("GET", "/v1/api/pets/0")).await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    assert!(response.ends_with("missing"), "{response}");
    assert_eq!(HITS.load(Ordering::SeqCst), 2);

    // No template matches the partial path: empty 404 straight from the table.
    let response = roundtrip(port, &raw_request("GET", "/v1/api/pets")).await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    assert!(response.to_lowercase().contains("content-length: 0"), "{response}");

    // A method outside the routable set never reaches the table.
    let response = roundtrip(port, &raw_request("PURGE", "/v1/api/pets/42")).await;
    assert!(response.starts_with("HTTP/1.1 405"), "{response}");
    assert_eq!(HITS.load(Ordering::SeqCst), 2);
}
