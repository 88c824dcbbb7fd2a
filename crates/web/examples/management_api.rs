//! A small service inventory behind basic authentication.
//!
//! ```text
//! curl -u admin:admin http://127.0.0.1:2812/api/v3/service
//! curl -u admin:admin -H 'Content-Type: application/json' -d '{"name":"Lobby-1","memory":512}' http://127.0.0.1:2812/api/v3/service
//! curl -u admin:admin -X DELETE http://127.0.0.1:2812/api/v3/service/Lobby-1
//! ```

use async_trait::async_trait;
use http::{Response, StatusCode};
use nimbus_web::auth::{BASIC_PROVIDER, BasicAuthProvider, RestUser, SimpleRestUser, UserStore};
use nimbus_web::{
    BoundParams, Endpoint, HandlerDescriptor, HandlerError, HttpContext, ParamSource, ProblemDetails, ResponseBody, Server, ServerConfig,
    endpoint_fn, json_response,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Service {
    name: String,
    memory: u32,
}

type Inventory = Arc<Mutex<BTreeMap<String, Service>>>;

#[derive(Debug)]
struct SingleUser;

impl UserStore for SingleUser {
    fn find_user(&self, id: &str) -> Option<Arc<dyn RestUser>> {
        (id == "admin").then(|| Arc::new(SimpleRestUser::new("admin", ["global:admin"])) as Arc<dyn RestUser>)
    }

    fn check_password(&self, id: &str, password: &str) -> bool {
        id == "admin" && password == "admin"
    }
}

#[derive(Debug)]
struct CreateService {
    inventory: Inventory,
}

#[async_trait]
impl Endpoint for CreateService {
    async fn handle(&self, _ctx: &mut HttpContext, mut params: BoundParams) -> Result<Response<ResponseBody>, HandlerError> {
        let service: Service = params.take(0).ok_or_else(|| ProblemDetails::bad_request("missing-body", "service expected"))?;
        let mut inventory = self.inventory.lock().map_err(|_e| ProblemDetails::internal_error())?;
        if inventory.contains_key(&service.name) {
            return Err(ProblemDetails::new(StatusCode::CONFLICT, "service-exists").into());
        }

        info!(name = %service.name, memory = service.memory, "service created");
        inventory.insert(service.name.clone(), service.clone());
        Ok(json_response(StatusCode::CREATED, &service))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server = Server::new(ServerConfig::default())?;
    server.auth_providers().register(BASIC_PROVIDER, BasicAuthProvider::new(Arc::new(SingleUser)));
    let inventory = Inventory::default();

    let list = Arc::clone(&inventory);
    server.register(HandlerDescriptor::get("/api/v3/service").authenticate([BASIC_PROVIDER], ["service:read"]).handler(endpoint_fn(
        move |_ctx, _params| {
            let services: Vec<Service> = list.lock().map(|services| services.values().cloned().collect()).unwrap_or_default();
            Box::pin(async move { Ok(json_response(StatusCode::OK, &services)) })
        },
    )))?;

    server.register(
        HandlerDescriptor::post("/api/v3/service")
            .authenticate([BASIC_PROVIDER], ["service:write"])
            .param(ParamSource::validated_body::<Service, _>(|service| {
                if service.memory == 0 { Err("memory must be positive".to_owned()) } else { Ok(()) }
            }))
            .handler(CreateService { inventory: Arc::clone(&inventory) }),
    )?;

    let remove = Arc::clone(&inventory);
    server.register(
        HandlerDescriptor::delete("/api/v3/service/{name}")
            .authenticate([BASIC_PROVIDER], ["service:write"])
            .param(ParamSource::path("name"))
            .handler(endpoint_fn(move |_ctx, params| {
                let removed = params.text(0).and_then(|name| remove.lock().ok()?.remove(name));
                Box::pin(async move {
                    match removed {
                        Some(_) => Ok(Response::builder().status(StatusCode::NO_CONTENT).body(ResponseBody::empty()).map_err(HandlerError::other)?),
                        None => Err(ProblemDetails::not_found().detail("unknown service").into()),
                    }
                })
            })),
    )?;

    let running = server.start().await?;
    info!(addresses = ?running.local_addrs(), "management api ready");
    running.wait().await;
    Ok(())
}
