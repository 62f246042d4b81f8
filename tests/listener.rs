//! End-to-end over a real socket.

use std::time::Duration;

use capsium_router::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

mod common;
use common::*;

#[tokio::test]
async fn test_serves_over_tcp_and_shuts_down() {
    let fixture = iso_fixture();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = capsium_router::HttpServer::new(fixture.config.clone(), fixture.registry.clone());
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build().unwrap();

    let res = client.get(format!("http://{addr}/app/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-frame-options"], "SAMEORIGIN");
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), ISO_INDEX);

    let res = client
        .get(format!("http://{addr}/app/"))
        .header("Host", "example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-frame-options"], "DENY");

    let res = client.get(format!("http://{addr}/api/v1/introspect/metadata")).send().await.unwrap();
    let json: serde_json::Value = res.json().await.unwrap();
    assert_eq!(json["packages"][0]["name"], ISO_NAME);

    let res = client.get(format!("http://{addr}/capsium/missing-1.0.0/")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_http1_header_names_are_title_cased() {
    let fixture = iso_fixture();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = capsium_router::HttpServer::new(fixture.config.clone(), fixture.registry.clone());
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"HEAD /app/ HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut raw))
        .await
        .unwrap()
        .unwrap();

    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"), "{raw}");
    assert!(raw.contains("\r\nX-Frame-Options: SAMEORIGIN\r\n"), "{raw}");
    assert!(raw.contains("\r\nX-Content-Type-Options: nosniff\r\n"), "{raw}");
    assert!(raw.contains("\r\nContent-Type: text/html"), "{raw}");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap().unwrap();
}
