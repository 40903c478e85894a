//! Gateway strategies against a live local upstream.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use docmirror_lib::gateway::Gateway;
use docmirror_lib::gateway::GatewayConfig;
use docmirror_lib::gateway::GatewayRequest;
use docmirror_lib::gateway::MemoryResponseCache;
use http_body_util::Full;
use hyper::Request;
use hyper::Response;
use hyper::body::Bytes;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// A counting upstream that answers every request with a fixed body.
async fn spawn_upstream() -> (SocketAddr, Arc<AtomicUsize>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let task_hits = hits.clone();
    let task = tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            let hits = task_hits.clone();
            tokio::spawn(async move {
                let service = service_fn(move |_request: Request<Incoming>| {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(200)
                                .header("content-type", "application/javascript")
                                // No keep-alive: taking the upstream down in a
                                // test must not leave reusable pooled connections.
                                .header("connection", "close")
                                .body(Full::new(Bytes::from_static(b"console.log(1)")))
                                .unwrap(),
                        )
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (addr, hits, task)
}

fn gateway_for(addr: SocketAddr) -> Gateway {
    let config = GatewayConfig::new(format!("http://{addr}"))
        .with_version("v1")
        .backend_host("docs.example.com")
        .static_asset("/app.js");
    Gateway::new(config, Arc::new(MemoryResponseCache::new()))
}

fn get(url: &str) -> GatewayRequest {
    GatewayRequest::get(Url::parse(url).unwrap())
}

#[tokio::test]
async fn test_cache_first_asset_is_fetched_once() {
    let (addr, hits, upstream) = spawn_upstream().await;
    let gateway = gateway_for(addr);
    let url = format!("http://{addr}/app.js");

    let first = gateway.handle(get(&url)).await;
    assert_eq!(first.status, 200);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let second = gateway.handle(get(&url)).await;
    assert_eq!(second.status, 200);
    assert_eq!(second.body, b"console.log(1)");
    // Served from cache: no second upstream call.
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    upstream.abort();
}

#[tokio::test]
async fn test_network_first_falls_back_to_cached_copy() {
    let (addr, hits, upstream) = spawn_upstream().await;
    let gateway = gateway_for(addr);
    // Not a configured asset path, so this routes network-first.
    let url = format!("http://{addr}/api/state");

    let first = gateway.handle(get(&url)).await;
    assert_eq!(first.status, 200);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Take the upstream down; the stored copy must answer.
    upstream.abort();
    let _ = upstream.await;

    let second = gateway.handle(get(&url)).await;
    assert_eq!(second.status, 200);
    assert_eq!(second.body, b"console.log(1)");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_html_request_with_no_network_and_no_cache_gets_offline_page() {
    // Port 1 is unbound: every connection attempt is refused.
    let gateway = gateway_for("127.0.0.1:1".parse().unwrap());

    let response = gateway
        .handle(get("http://127.0.0.1:1/dashboard").with_accept("text/html,application/xhtml+xml"))
        .await;

    assert_eq!(response.status, 200);
    assert!(
        response
            .headers
            .iter()
            .any(|(name, value)| name == "content-type" && value == "text/html")
    );
    assert!(String::from_utf8(response.body).unwrap().contains("Offline"));
}

#[tokio::test]
async fn test_non_html_failure_surfaces_the_error() {
    let gateway = gateway_for("127.0.0.1:1".parse().unwrap());

    let response = gateway
        .handle(get("http://127.0.0.1:1/api/state"))
        .await;

    assert_eq!(response.status, 502);
}

#[tokio::test]
async fn test_non_get_requests_pass_through_uncached() {
    let (addr, hits, upstream) = spawn_upstream().await;
    let gateway = gateway_for(addr);
    let url = format!("http://{addr}/api/submit");

    let mut request = get(&url);
    request.method = "POST".to_string();
    request.body = b"payload".to_vec();

    let first = gateway.handle(request.clone()).await;
    assert_eq!(first.status, 200);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    upstream.abort();
    let _ = upstream.await;

    // Nothing was cached for the POST: with the upstream gone it fails.
    let second = gateway.handle(request).await;
    assert_eq!(second.status, 502);
}

#[tokio::test]
async fn test_install_precaches_static_assets() {
    let (addr, hits, upstream) = spawn_upstream().await;
    let gateway = gateway_for(addr);

    gateway.install().await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // The pre-cached copy serves without another upstream call.
    let response = gateway.handle(get(&format!("http://{addr}/app.js"))).await;
    assert_eq!(response.status, 200);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    upstream.abort();
}
