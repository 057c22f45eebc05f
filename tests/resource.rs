use drogue_client::openid::NoTokenProvider;
use state_waiter::{Label, Observation, ProbeError, ResourceClient, ResourceProbe, StatusProbe};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// Serve a single canned HTTP response for every connection.
async fn serve(status: &'static str, body: &'static str) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    Url::parse(&format!("http://{addr}/")).unwrap()
}

fn probe(api: Url) -> ResourceProbe {
    let client = ResourceClient::new(reqwest::Client::new(), api, Arc::new(NoTokenProvider));
    let url = client.url(&["v1", "databases", "orders"]).unwrap();
    ResourceProbe::new(client, url, "/status".to_string())
}

#[tokio::test]
async fn present_resource() {
    let api = serve("200 OK", r#"{"name":"orders","status":"creating"}"#).await;

    let observation = probe(api).probe().await.unwrap();

    assert_eq!(observation.label(), Label::from("creating"));
    let snapshot = observation.into_snapshot().unwrap();
    assert_eq!(snapshot["name"], "orders");
}

#[tokio::test]
async fn not_found_is_absent() {
    let api = serve("404 Not Found", "").await;
    let observation = probe(api).probe().await.unwrap();
    assert_eq!(observation, Observation::Absent);
}

#[tokio::test]
async fn gone_is_absent() {
    let api = serve("410 Gone", "").await;
    let observation = probe(api).probe().await.unwrap();
    assert_eq!(observation, Observation::Absent);
}

#[tokio::test]
async fn server_error_fails() {
    let api = serve("500 Internal Server Error", "").await;
    let result = probe(api).probe().await;
    assert!(matches!(result, Err(ProbeError::Client(_))));
}

#[tokio::test]
async fn empty_state_fails() {
    let api = serve("200 OK", r#"{"status":""}"#).await;
    let result = probe(api).probe().await;
    assert!(matches!(result, Err(ProbeError::MissingLabel(_))));
}
