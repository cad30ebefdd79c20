//! Integration tests for the REST helpers against an in-process HTTP server
//! serving canned SMC replies.

use std::convert::Infallible;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use smc_client::elements::{search, user, AdminUser};
use smc_client::rest::SmcClient;
use smc_client::SessionContext;

async fn start_server() -> SessionContext {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let _ = http1::Builder::new()
                    .serve_connection(io, service_fn(handle))
                    .await;
            });
        }
    });

    SessionContext::new(
        format!("http://{addr}/6.4"),
        format!("ws://{addr}"),
        "JSESSIONID=test",
    )
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

async fn handle(request: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    // Every request must carry the session cookie
    let cookie = request
        .headers()
        .get("cookie")
        .and_then(|value| value.to_str().ok());
    if cookie != Some("JSESSIONID=test") {
        return Ok(json_response(
            StatusCode::UNAUTHORIZED,
            &json!({ "message": "not logged in" }),
        ));
    }

    let target = request
        .uri()
        .path_and_query()
        .map_or_else(String::new, ToString::to_string);

    let response = match (request.method().as_str(), target.as_str()) {
        ("GET", "/6.4/elements?filter=helsinki-fw&exact_match=true") => json_response(
            StatusCode::OK,
            &json!({
                "result": [{
                    "name": "helsinki-fw",
                    "type": "single_fw",
                    "href": "/elements/single_fw/1"
                }]
            }),
        ),
        ("GET", "/6.4/elements?filter=missing&exact_match=true") => {
            json_response(StatusCode::OK, &json!({ "result": [] }))
        }
        ("GET", "/6.4/elements/single_fw/1") => json_response(
            StatusCode::OK,
            &json!({ "name": "helsinki-fw", "nodes": [{ "name": "node 1" }] }),
        ),
        ("GET", "/6.4/elements?filter=dlepage&exact_match=true") => json_response(
            StatusCode::OK,
            &json!({
                "result": [{
                    "name": "dlepage",
                    "type": "admin_user",
                    "href": "/elements/admin_user/9"
                }]
            }),
        ),
        ("GET", "/6.4/elements/admin_user/9") => {
            let body = json!({
                "name": "dlepage",
                "link": [
                    { "rel": "self", "href": "/elements/admin_user/9" },
                    { "rel": "change_password", "href": "/elements/admin_user/9/change_password" },
                    { "rel": "enable_disable", "href": "/elements/admin_user/9/enable_disable" },
                ]
            });
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/json")
                .header("etag", "abc123")
                .body(Full::new(Bytes::from(body.to_string())))
                .unwrap()
        }
        ("PUT", "/6.4/elements/admin_user/9/change_password?password=s3cret") => {
            // Modifications must present the element's current ETag
            if request.headers().get("etag").and_then(|v| v.to_str().ok()) != Some("abc123") {
                json_response(
                    StatusCode::CONFLICT,
                    &json!({ "message": "etag mismatch" }),
                )
            } else {
                json_response(StatusCode::OK, &json!({}))
            }
        }
        ("POST", "/6.4/elements/admin_user") => Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/elements/admin_user/10")
            .body(Full::new(Bytes::new()))
            .unwrap(),
        _ => json_response(StatusCode::NOT_FOUND, &json!({ "message": "not found" })),
    };

    Ok(response)
}

#[tokio::test]
async fn element_search_resolves_href_and_body() {
    let client = SmcClient::new(start_server().await);

    let href = search::element_href(&client, "helsinki-fw").await.unwrap();
    assert_eq!(href.as_deref(), Some("/elements/single_fw/1"));

    let body = search::element_as_json(&client, "helsinki-fw")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(body["name"], json!("helsinki-fw"));
}

#[tokio::test]
async fn missing_elements_resolve_to_none() {
    let client = SmcClient::new(start_server().await);

    assert!(search::element_href(&client, "missing")
        .await
        .unwrap()
        .is_none());
    assert!(search::element_as_json(&client, "missing")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn admin_user_create_returns_location() {
    let client = SmcClient::new(start_server().await);

    let href = AdminUser::new("dlepage")
        .with_superuser(true)
        .create(&client)
        .await
        .unwrap();
    assert_eq!(href, "/elements/admin_user/10");
}

#[tokio::test]
async fn change_password_presents_the_element_etag() {
    let client = SmcClient::new(start_server().await);
    user::change_password(&client, "dlepage", "s3cret")
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_operations_carry_the_server_detail() {
    let client = SmcClient::new(start_server().await);

    let err = client.get("/nope").await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("404"), "unexpected error: {message}");
    assert!(message.contains("not found"), "unexpected error: {message}");
}
