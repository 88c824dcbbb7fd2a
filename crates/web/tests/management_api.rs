use futures::{SinkExt, StreamExt};
use http::{Response, StatusCode};
use nimbus_web::auth::{BASIC_PROVIDER, BasicAuthProvider, RestUser, SimpleRestUser, UserStore};
use nimbus_web::{
    HandlerDescriptor, ListenerConfig, ParamSource, ResponseBody, RunningServer, Server, ServerConfig, endpoint_fn, json_response,
    websocket,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug)]
struct Users(HashMap<&'static str, (&'static str, Arc<dyn RestUser>)>);

impl UserStore for Users {
    fn find_user(&self, id: &str) -> Option<Arc<dyn RestUser>> {
        self.0.get(id).map(|(_, user)| Arc::clone(user))
    }

    fn check_password(&self, id: &str, password: &str) -> bool {
        self.0.get(id).is_some_and(|(expected, _)| *expected == password)
    }
}

async fn start() -> RunningServer {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = ServerConfig { listeners: vec![ListenerConfig::new("127.0.0.1:0".parse().unwrap())], ..ServerConfig::default() };
    let server = Server::new(config).unwrap();

    let mut users = HashMap::new();
    users.insert("admin", ("secret", Arc::new(SimpleRestUser::new("admin", ["global:admin"])) as Arc<dyn RestUser>));
    server.auth_providers().register(BASIC_PROVIDER, BasicAuthProvider::new(Arc::new(Users(users))));

    server
        .register(HandlerDescriptor::get("/api/v3/health").handler(endpoint_fn(|_ctx, _params| {
            Box::pin(async { Ok(json_response(StatusCode::OK, &json!({ "status": "up" }))) })
        })))
        .unwrap();
    server
        .register(
            HandlerDescriptor::get("/api/v3/service/{name}/log/{*lines}")
                .authenticate([BASIC_PROVIDER], ["service:read"])
                .param(ParamSource::path("name"))
                .param(ParamSource::path("lines"))
                .handler(endpoint_fn(|_ctx, params| {
                    Box::pin(async move {
                        Ok(json_response(StatusCode::OK, &json!({ "service": params.text(0), "lines": params.text(1) })))
                    })
                })),
        )
        .unwrap();
    server
        .register(HandlerDescriptor::upgrade("/api/v3/live").handler(endpoint_fn(|ctx, _params| {
            Box::pin(async move {
                websocket::accept(ctx, |mut socket| async move {
                    while let Some(Ok(message)) = socket.next().await {
                        if message.is_text() && socket.send(message).await.is_err() {
                            break;
                        }
                    }
                })
            })
        })))
        .unwrap();

    server.start().await.unwrap()
}

async fn exchange(address: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn serves_registered_handlers() {
    let server = start().await;
    let address = server.local_addrs()[0];

    let response = exchange(address, "GET /api/v3/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.contains("date: "), "{response}");
    assert!(response.ends_with(r#"{"status":"up"}"#), "{response}");
}

#[tokio::test]
async fn unknown_route_is_a_problem() {
    let server = start().await;
    let response = exchange(server.local_addrs()[0], "GET /api/v3/nothing HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");
    assert!(response.contains("content-type: application/problem+json"), "{response}");
    assert!(response.contains(r#""type":"route-not-found""#), "{response}");
}

#[tokio::test]
async fn basic_authentication_guards_handlers() {
    let server = start().await;
    let address = server.local_addrs()[0];
    let request = |authorization: &str| {
        format!("GET /api/v3/service/Lobby-1/log/tail/50 HTTP/1.1\r\nHost: localhost\r\n{authorization}Connection: close\r\n\r\n")
    };

    let response = exchange(address, &request("")).await;
    assert!(response.starts_with("HTTP/1.1 401"), "{response}");

    // admin:wrong
    let response = exchange(address, &request("Authorization: Basic YWRtaW46d3Jvbmc=\r\n")).await;
    assert!(response.starts_with("HTTP/1.1 401"), "{response}");

    // admin:secret
    let response = exchange(address, &request("Authorization: Basic YWRtaW46c2VjcmV0\r\n")).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.ends_with(r#"{"lines":"tail/50","service":"Lobby-1"}"#), "{response}");
}

#[tokio::test]
async fn keep_alive_serves_pipelined_requests() {
    let server = start().await;
    let request = "GET /api/v3/health HTTP/1.1\r\nHost: localhost\r\n\r\nGET /api/v3/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
    let response = exchange(server.local_addrs()[0], request).await;

    assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 2, "{response}");
}

#[tokio::test]
async fn websocket_echo() {
    let server = start().await;
    let url = format!("ws://{}/api/v3/live", server.local_addrs()[0]);

    let (mut socket, response) = tokio_tungstenite::connect_async(url).await.unwrap();
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

    socket.send(Message::text("ping")).await.unwrap();
    let echoed = socket.next().await.unwrap().unwrap();
    assert_eq!(echoed.into_text().unwrap().as_str(), "ping");
    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn plain_get_on_upgrade_route_is_rejected() {
    let server = start().await;
    let response = exchange(server.local_addrs()[0], "GET /api/v3/live HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
}

#[tokio::test]
async fn handlers_registered_after_start_are_served() {
    let server = start().await;
    server
        .registry()
        .register(HandlerDescriptor::get("/api/v3/late").handler(endpoint_fn(|_ctx, _params| {
            Box::pin(async { Ok(Response::new(ResponseBody::from("late"))) })
        })))
        .unwrap();

    let response = exchange(server.local_addrs()[0], "GET /api/v3/late HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(response.ends_with("late"), "{response}");
}
