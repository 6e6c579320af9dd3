//! Scripted API server for exercising kube-backed code in tests

use http::{Method, Request, Response};
use kube::Client;
use kube::client::Body;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tower_test::mock::{self, Handle};

pub type ApiServerHandle = Handle<Request<Body>, Response<Body>>;

/// One expected request and the answer to it
pub struct Exchange {
    method: Method,
    path: String,
    status: u16,
    body: Value,
}

impl Exchange {
    /// Answer with `object` and 200
    pub fn ok(method: Method, path: &str, object: impl Serialize) -> Self {
        Self {
            method,
            path: path.to_string(),
            status: 200,
            body: serde_json::to_value(object).expect("serializable response"),
        }
    }

    /// Answer with a `Status` failure
    pub fn status(method: Method, path: &str, code: u16, reason: &str, message: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            status: code,
            body: json!({
                "kind": "Status",
                "apiVersion": "v1",
                "status": "Failure",
                "message": message,
                "reason": reason,
                "code": code,
            }),
        }
    }

    pub fn not_found(method: Method, path: &str, message: &str) -> Self {
        Self::status(method, path, 404, "NotFound", message)
    }
}

/// A client talking to an in-process API server instead of a cluster
pub fn mock_client() -> (Client, ApiServerHandle) {
    let (service, handle) = mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(service, "default"), handle)
}

/// Answer `exchanges` in order, asserting method and path of each request.
///
/// Resolves to the JSON bodies of the requests, `Value::Null` for empty ones.
pub fn serve(mut handle: ApiServerHandle, exchanges: Vec<Exchange>) -> JoinHandle<Vec<Value>> {
    tokio::spawn(async move {
        let mut bodies = Vec::new();

        for exchange in exchanges {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), exchange.method);
            assert_eq!(request.uri().path(), exchange.path);

            let bytes = request
                .into_body()
                .collect_bytes()
                .await
                .expect("readable request body");
            bodies.push(if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).expect("json request body")
            });

            let payload = serde_json::to_vec(&exchange.body).expect("serializable response");
            send.send_response(
                Response::builder()
                    .status(exchange.status)
                    .body(Body::from(payload))
                    .expect("valid response"),
            );
        }

        bodies
    })
}
