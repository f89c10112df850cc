use axum::body::Body;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ALLOW, CONTENT_LENGTH,
};
use http::{Method, Request, Response, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;
use upload_gateway::content_type::content_type_for;
use upload_gateway::mac::Scheme;
use upload_gateway::Config;

const SECRET: &str = "integration-secret";

fn test_config(root: &std::path::Path) -> Config {
    Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        secret: SECRET.to_string(),
        store_root: root.to_path_buf(),
        sub_path: "upload".to_string(),
        log_level: "info".to_string(),
    }
}

fn setup() -> (axum::Router, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = upload_gateway::app(test_config(dir.path()));
    (app, dir)
}

fn assert_cors_headers<B>(resp: &Response<B>) {
    let headers = resp.headers();
    assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN].to_str().unwrap(), "*");
    assert_eq!(
        headers[ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap(),
        "OPTIONS, HEAD, GET, PUT"
    );
    assert_eq!(
        headers[ACCESS_CONTROL_ALLOW_HEADERS].to_str().unwrap(),
        "Authorization, Content-Type"
    );
    assert_eq!(
        headers[ACCESS_CONTROL_ALLOW_CREDENTIALS].to_str().unwrap(),
        "true"
    );
    assert_eq!(headers[ACCESS_CONTROL_MAX_AGE].to_str().unwrap(), "7200");
}

#[tokio::test]
async fn options_lists_the_allowed_methods() {
    let (app, _dir) = setup();

    let resp = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/upload/alice/cat.jpg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[ALLOW].to_str().unwrap(),
        "OPTIONS, HEAD, GET, PUT"
    );
    assert_cors_headers(&resp);
}

#[tokio::test]
async fn options_never_touches_path_or_store() {
    let (app, _dir) = setup();

    // Preflights for paths the data methods would reject still succeed.
    for uri in ["/", "/upload/", "/other/x", "/upload/../etc"] {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "for {uri:?}");
    }
}

#[tokio::test]
async fn unknown_methods_are_rejected_with_allow() {
    let (app, _dir) = setup();

    for method in [Method::POST, Method::DELETE, Method::PATCH] {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method.clone())
                    .uri("/upload/alice/cat.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "for {method}");
        assert_eq!(
            resp.headers()[ALLOW].to_str().unwrap(),
            "OPTIONS, HEAD, GET, PUT"
        );
    }
}

#[tokio::test]
async fn cors_headers_ride_on_every_response() {
    let (app, dir) = setup();
    tokio::fs::create_dir_all(dir.path().join("alice")).await.unwrap();
    tokio::fs::write(dir.path().join("alice/hello.txt"), b"hello")
        .await
        .unwrap();

    // 200
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/upload/alice/hello.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_cors_headers(&resp);

    // 201
    let body = b"fresh";
    let rel = "alice/fresh.txt";
    let sig = Scheme::V2.signature(SECRET.as_bytes(), rel, body.len() as u64, content_type_for(rel));
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri(format!("/upload/{rel}?v2={sig}"))
                .header(CONTENT_LENGTH, body.len())
                .body(Body::from(&body[..]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_cors_headers(&resp);

    // 403
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri("/upload/alice/other.txt")
                .header(CONTENT_LENGTH, 4)
                .body(Body::from("data"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_cors_headers(&resp);

    // 404
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/upload/alice/nope.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_cors_headers(&resp);

    // 405
    let resp = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/upload/alice/hello.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_cors_headers(&resp);
}

#[tokio::test]
async fn error_bodies_are_plaintext_reasons() {
    let (app, _dir) = setup();

    let resp = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/upload/alice/nope.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"not found");
}
