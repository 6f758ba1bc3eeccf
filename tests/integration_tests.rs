use flate2::read::GzDecoder;
use http::{Method, StatusCode, header};
use httpdump::common::spawn_test_server;
use httpdump::{DumpClient, DumpServerTrait, HttpConfig, HttpDumpServer, Origin, OriginPolicy, RequestSnapshot};
use serde_json::{Value, json};
use std::io::Read;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

async fn start(config: HttpConfig) -> (JoinHandle<httpdump::Result<()>>, SocketAddr) {
    spawn_test_server(config).await.unwrap()
}

async fn client(addr: SocketAddr) -> DumpClient {
    DumpClient::connect(addr).await.unwrap()
}

#[tokio::test]
async fn test_get_echoes_args_headers_and_url() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client
        .request(
            Method::GET,
            "/get?a=1&a=2&b=x%20y",
            &[("x-custom", "v1"), ("X-Custom", "v2")],
            &[],
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert!(response.body().ends_with(b"\n"));

    let snapshot: RequestSnapshot = response.json().unwrap();
    assert_eq!(snapshot.args()["a"], vec!["1", "2"]);
    assert_eq!(snapshot.args()["b"], vec!["x y"]);
    assert_eq!(snapshot.headers()["X-Custom"], vec!["v1", "v2"]);
    assert_eq!(snapshot.header("host").unwrap(), [addr.to_string()]);
    assert_eq!(snapshot.url(), format!("http://{addr}/get?a=1&a=2&b=x%20y"));
    assert_eq!(snapshot.origin().ip(), Some("127.0.0.1"));
    assert!(!snapshot.gzipped());

    server.abort();
}

#[tokio::test]
async fn test_get_rejects_other_methods() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client
        .request(Method::POST, "/get", &[], b"payload")
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.text(), "Method Not Allowed\n");

    server.abort();
}

#[tokio::test]
async fn test_headers_route() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client
        .request(Method::GET, "/headers", &[("accept", "*/*")], &[])
        .await
        .unwrap();
    let headers: Value = response.json().unwrap();
    assert_eq!(headers["Accept"], json!(["*/*"]));
    assert_eq!(headers["Host"], json!([addr.to_string()]));

    server.abort();
}

#[tokio::test]
async fn test_status_route() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client.get("/status/204").await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.body().is_empty());

    let response = client.get("/status/418").await.unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

    let response = client.get("/status/abc").await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "status code must be an integer\n");

    for out_of_range in ["/status/99", "/status/1000"] {
        let response = client.get(out_of_range).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.text(), "status code must be in range: 100 - 999\n");
    }

    server.abort();
}

/// Reads from `stream` until `needle` shows up, failing after two seconds
async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    let found = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before {needle:?} arrived");
            received.extend_from_slice(&buf[..n]);
            if String::from_utf8_lossy(&received).contains(needle) {
                break;
            }
        }
    })
    .await;
    let text = String::from_utf8_lossy(&received).into_owned();
    assert!(found.is_ok(), "timed out waiting for {needle:?}, got {text:?}");
    text
}

#[tokio::test]
async fn test_informational_status_is_followed_by_final_response() {
    let (server, addr) = start(HttpConfig::default()).await;

    for code in [100, 102, 103] {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("GET /status/{code} HTTP/1.1\r\nHost: h\r\n\r\n").as_bytes())
            .await
            .unwrap();

        let received = read_until(&mut stream, "content-length: 0\r\n").await;
        assert!(received.starts_with(&format!("HTTP/1.1 {code} ")), "{received}");
        assert!(received.contains("HTTP/1.1 200 OK\r\n"), "{received}");
    }

    let mut client = client(addr).await;
    let response = client.get("/status/100").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.interim(), [StatusCode::CONTINUE]);
    assert!(response.body().is_empty());

    // The connection stays usable afterwards
    assert_eq!(client.get("/ip").await.unwrap().status(), StatusCode::OK);

    let response = client.get("/status/101").await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "status code 101 is not supported\n");

    server.abort();
}

#[tokio::test]
async fn test_path_integers_are_percent_decoded() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client.get("/status/%32%30%34").await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client.get("/bytes/%31%36").await.unwrap();
    assert_eq!(response.body().len(), 16);

    server.abort();
}

#[tokio::test]
async fn test_ip_structured_origin() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client.get("/ip").await.unwrap();
    assert_eq!(response.text(), "{\"origin\":{\"ip\":\"127.0.0.1\"}}\n");

    let response = client
        .request(Method::GET, "/ip", &[("X-Forwarded-For", "203.0.113.7")], &[])
        .await
        .unwrap();
    let body: Value = response.json().unwrap();
    assert_eq!(
        body["origin"],
        json!({"ip": "127.0.0.1", "forwarded_for": "203.0.113.7"})
    );

    server.abort();
}

#[tokio::test]
async fn test_ip_merged_origin() {
    let (server, addr) = start(HttpConfig {
        origin_policy: OriginPolicy::Merged,
        ..Default::default()
    })
    .await;
    let mut client = client(addr).await;

    let response = client
        .request(Method::GET, "/ip", &[("X-Forwarded-For", "203.0.113.7")], &[])
        .await
        .unwrap();
    let body: Value = response.json().unwrap();
    assert_eq!(body["origin"], json!("203.0.113.7"));

    let response = client.get("/ip").await.unwrap();
    let body: Value = response.json().unwrap();
    assert_eq!(body["origin"], json!("127.0.0.1"));

    server.abort();
}

#[tokio::test]
async fn test_user_agent() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client
        .request(Method::GET, "/user-agent", &[("User-Agent", "curl/8.0")], &[])
        .await
        .unwrap();
    assert_eq!(response.text(), "{\"user-agent\":\"curl/8.0\"}\n");

    let response = client.get("/user-agent").await.unwrap();
    assert_eq!(response.text(), "{\"user-agent\":\"\"}\n");

    server.abort();
}

#[tokio::test]
async fn test_bytes_route() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let first = client.get("/bytes/1024").await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(first.body().len(), 1024);

    let second = client.get("/bytes/1024").await.unwrap();
    assert_ne!(first.body(), second.body());

    let empty = client.get("/bytes/0").await.unwrap();
    assert_eq!(empty.status(), StatusCode::OK);
    assert!(empty.body().is_empty());

    let max = client.get("/bytes/102400").await.unwrap();
    assert_eq!(max.body().len(), 102_400);

    for invalid in ["/bytes/102401", "/bytes/-1", "/bytes/ten"] {
        let response = client.get(invalid).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{invalid}");
        assert_eq!(response.text(), "number of bytes must be in range: 0 - 102400\n");
    }

    server.abort();
}

#[tokio::test]
async fn test_stream_caps_documents() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client.get("/stream/150?x=1").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::TRANSFER_ENCODING], "chunked");
    assert_eq!(response.chunks().len(), 100);

    for chunk in response.chunks() {
        assert!(chunk.ends_with(b"\n"));
        let snapshot: RequestSnapshot = serde_json::from_slice(chunk).unwrap();
        assert_eq!(snapshot.args()["x"], vec!["1"]);
        assert_eq!(snapshot.url(), format!("http://{addr}/stream/150?x=1"));
    }

    let response = client.get("/stream/2").await.unwrap();
    assert_eq!(response.chunks().len(), 2);

    let response = client.get("/stream/0").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.chunks().is_empty());

    let response = client.get("/stream/lots").await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "n must be an integer\n");

    server.abort();
}

#[tokio::test]
async fn test_stream_requires_http11() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client
        .send_raw(b"GET /stream/3 HTTP/1.0\r\nHost: example.com\r\n\r\n")
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "your client does not support streaming\n");

    server.abort();
}

#[tokio::test]
async fn test_gzip_negotiation() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client
        .request(Method::GET, "/gzip", &[("Accept-Encoding", "deflate, gzip;q=0.8")], &[])
        .await
        .unwrap();
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    assert_eq!(response.headers()[header::VARY], "Accept-Encoding");

    let mut decoded = Vec::new();
    GzDecoder::new(response.body().as_ref())
        .read_to_end(&mut decoded)
        .unwrap();
    let snapshot: RequestSnapshot = serde_json::from_slice(&decoded).unwrap();
    assert!(snapshot.gzipped());

    let response = client.get("/gzip").await.unwrap();
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    let body: Value = response.json().unwrap();
    assert!(body.get("gzipped").is_none());

    let response = client
        .request(Method::GET, "/gzip", &[("Accept-Encoding", "gzip;q=0")], &[])
        .await
        .unwrap();
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());

    let response = client
        .request(Method::GET, "/gzip", &[("Accept-Encoding", "gzip;q=0, *")], &[])
        .await
        .unwrap();
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());

    server.abort();
}

#[tokio::test]
async fn test_cors_headers() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let preflight = client
        .request(Method::OPTIONS, "/get", &[("Origin", "https://app.example")], &[])
        .await
        .unwrap();
    assert_eq!(preflight.status(), StatusCode::OK);
    assert!(preflight.body().is_empty());
    assert_eq!(
        preflight.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example"
    );
    assert_eq!(
        preflight.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
        "POST, GET, OPTIONS, PUT, DELETE"
    );

    let response = client
        .request(Method::GET, "/ip", &[("Origin", "https://app.example")], &[])
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example"
    );

    let response = client.get("/ip").await.unwrap();
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    server.abort();
}

#[tokio::test]
async fn test_cors_disabled() {
    let (server, addr) = start(HttpConfig {
        cors: false,
        ..Default::default()
    })
    .await;
    let mut client = client(addr).await;

    let response = client
        .request(Method::GET, "/ip", &[("Origin", "https://app.example")], &[])
        .await
        .unwrap();
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    server.abort();
}

#[tokio::test]
async fn test_unknown_path() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client.get("/nope").await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text(), "404 page not found\n");

    server.abort();
}

#[tokio::test]
async fn test_server_header() {
    let (server, addr) = start(HttpConfig {
        server_name: Some("dump-test".to_string()),
        ..Default::default()
    })
    .await;
    let mut client = client(addr).await;

    let response = client.get("/ip").await.unwrap();
    assert_eq!(response.headers()[header::SERVER], "dump-test");

    server.abort();
}

#[tokio::test]
async fn test_keep_alive_reuses_connection() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    for _ in 0..3 {
        let response = client.get("/ip").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONNECTION).is_none());
    }

    let response = client
        .request(Method::GET, "/ip", &[("Connection", "close")], &[])
        .await
        .unwrap();
    assert_eq!(response.headers()[header::CONNECTION], "close");
    assert!(client.get("/ip").await.is_err());

    server.abort();
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let (server, addr) = start(HttpConfig::default()).await;
    let mut client = client(addr).await;

    let response = client
        .send_raw(b"POST /get HTTP/1.1\r\nHost: h\r\nContent-Length: 2097152\r\n\r\n")
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers()[header::CONNECTION], "close");

    server.abort();
}

#[tokio::test]
async fn test_connection_limit() {
    let (server, addr) = start(HttpConfig {
        max_connections: 1,
        ..Default::default()
    })
    .await;

    let mut first = client(addr).await;
    assert_eq!(first.get("/ip").await.unwrap().status(), StatusCode::OK);

    let mut second = client(addr).await;
    assert!(second.get("/ip").await.is_err());

    assert_eq!(first.get("/ip").await.unwrap().status(), StatusCode::OK);

    server.abort();
}

#[tokio::test]
async fn test_shutdown_signal_stops_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpDumpServer::new(HttpConfig {
        bind_addr: addr,
        ..Default::default()
    });
    let shutdown = server.shutdown_signal();
    let handle = tokio::spawn(async move { server.serve(listener).await });

    // A served request proves the accept loop is subscribed
    let mut client = client(addr).await;
    assert_eq!(client.get("/ip").await.unwrap().status(), StatusCode::OK);

    shutdown.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_structured_origin_deserializes() {
    let origin: Origin = serde_json::from_value(json!({"ip": "10.0.0.1"})).unwrap();
    assert_eq!(origin.ip(), Some("10.0.0.1"));

    let origin: Origin = serde_json::from_value(json!("1.2.3.4, 10.0.0.1")).unwrap();
    assert_eq!(origin, Origin::Merged("1.2.3.4, 10.0.0.1".to_string()));
}
