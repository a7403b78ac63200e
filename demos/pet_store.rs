//! A small pet-store service.
//!
//! Exercises the whole surface: nested scopes, a server-wide filter, a
//! scope-level failure handler, stateful struct handlers, the blocking
//! escape hatch and the built-in health probes.
//!
//! ```sh
//! cargo run --example pet_store
//! curl -i localhost:3000/v1/pets
//! curl -i -X POST -d 'Bella' localhost:3000/v1/pets
//! curl -i localhost:3000/v1/pets/1
//! curl -i localhost:3000/v1/pets/999
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::StatusCode;
use rudder::{blocking, handler, health, BoxedHandler, Context, Fault, Handle, Server};

#[derive(Debug, thiserror::Error)]
#[error("no pet with id {0}")]
struct NoSuchPet(String);

#[derive(Clone)]
struct Pet {
    id: u64,
    name: String,
}

impl Pet {
    fn to_json(&self) -> String {
        format!(r#"{{"id":{},"name":"{}"}}"#, self.id, self.name)
    }
}

#[derive(Default)]
struct Store {
    next_id: AtomicU64,
    pets: Mutex<HashMap<u64, Pet>>,
}

struct ListPets(Arc<Store>);

#[async_trait]
impl Handle for ListPets {
    async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
        let pets = self.0.pets.lock().unwrap();
        let mut entries: Vec<&Pet> = pets.values().collect();
        entries.sort_by_key(|p| p.id);
        let body: Vec<String> = entries.into_iter().map(Pet::to_json).collect();
        ctx.set_header("content-type", "application/json");
        ctx.send(format!("[{}]", body.join(",")));
        Ok(())
    }
}

struct GetPet(Arc<Store>);

#[async_trait]
impl Handle for GetPet {
    async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        let pet = id
            .parse::<u64>()
            .ok()
            .and_then(|id| self.0.pets.lock().unwrap().get(&id).cloned())
            .ok_or(NoSuchPet(id))?;
        ctx.set_header("content-type", "application/json");
        ctx.send(pet.to_json());
        Ok(())
    }
}

struct CreatePet(Arc<Store>);

#[async_trait]
impl Handle for CreatePet {
    async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
        let name = String::from_utf8_lossy(ctx.body()).trim().to_owned();
        let id = self.0.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let pet = Pet { id, name };
        let json = pet.to_json();
        self.0.pets.lock().unwrap().insert(id, pet);
        ctx.set_status(StatusCode::CREATED);
        ctx.set_header("content-type", "application/json");
        ctx.send(json);
        Ok(())
    }
}

struct DeletePet(Arc<Store>);

#[async_trait]
impl Handle for DeletePet {
    async fn handle(&self, ctx: &mut Context) -> Result<(), Fault> {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        let removed = id
            .parse::<u64>()
            .ok()
            .and_then(|id| self.0.pets.lock().unwrap().remove(&id));
        if removed.is_none() {
            return Err(NoSuchPet(id).into());
        }
        ctx.set_status(StatusCode::NO_CONTENT);
        ctx.end();
        Ok(())
    }
}

/// Logs every request passing through the /v1 scope, then delegates.
async fn trace_request(ctx: &mut Context) -> Result<(), Fault> {
    tracing::info!(method = %ctx.method(), path = ctx.path(), "request");
    ctx.next().await
}

async fn pet_not_found(ctx: &mut Context) -> Result<(), Fault> {
    let detail = ctx
        .fault()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "unknown pet".to_owned());
    ctx.set_status(StatusCode::NOT_FOUND);
    ctx.set_header("content-type", "application/json");
    ctx.send(format!(r#"{{"error":"{detail}"}}"#));
    Ok(())
}

/// A deliberately blocking handler: safe because chains run on the worker
/// dispatcher, never on hyper's I/O threads.
fn inventory_report(store: Arc<Store>) -> BoxedHandler {
    blocking(move |ctx| {
        // Stand-in for a synchronous legacy call.
        std::thread::sleep(std::time::Duration::from_millis(50));
        let count = store.pets.lock().unwrap().len();
        ctx.send(format!(r#"{{"pets":{count}}}"#));
        Ok(())
    })
}

#[tokio::main]
async fn main() -> Result<(), rudder::Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let store = Arc::new(Store::default());

    let list = BoxedHandler::new(ListPets(Arc::clone(&store)));
    let get = BoxedHandler::new(GetPet(Arc::clone(&store)));
    let create = BoxedHandler::new(CreatePet(Arc::clone(&store)));
    let delete = BoxedHandler::new(DeletePet(Arc::clone(&store)));
    let report = inventory_report(Arc::clone(&store));

    Server::builder()
        .port(3000)
        .worker_threads(4)
        .routing("", vec![], move |root| {
            root.get("/healthz", health::liveness)?;
            root.get("/readyz", health::readiness)?;

            let (list, get, create, delete, report) = (
                list.clone(),
                get.clone(),
                create.clone(),
                delete.clone(),
                report.clone(),
            );
            root.scope("/v1", vec![handler(trace_request)], move |v1| {
                v1.on::<NoSuchPet>(pet_not_found);
                v1.get("/report", report.clone())?;
                let (list, get, create, delete) = (
                    list.clone(),
                    get.clone(),
                    create.clone(),
                    delete.clone(),
                );
                v1.scope("/pets", vec![], move |pets| {
                    pets.get("", list.clone())?;
                    pets.post("", create.clone())?;
                    pets.get("/{id}", get.clone())?;
                    pets.delete("/{id}", delete.clone())
                })
            })
        })
        .build()?
        .serve()
        .await
}
