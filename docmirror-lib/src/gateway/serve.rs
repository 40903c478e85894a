//! HTTP front end for the gateway.

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::Request;
use hyper::Response;
use hyper::StatusCode;
use hyper::body::Bytes;
use hyper::body::Incoming;
use hyper::header::HeaderName;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

use super::CachedResponse;
use super::Gateway;
use super::GatewayRequest;

/// Serves the gateway on `listener` until `shutdown` is cancelled.
///
/// Accepts both proxy-style absolute-form request URIs and origin-form
/// requests with a `Host` header.
pub async fn serve(gateway: Arc<Gateway>, listener: TcpListener, shutdown: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "gateway listening");
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(%err, "accept failed");
                        continue;
                    }
                };

                let gateway = gateway.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |request| {
                        let gateway = gateway.clone();
                        async move { Ok::<_, Infallible>(handle_http(gateway, request).await) }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!(%peer, %err, "connection error");
                    }
                });
            }
        }
    }

    info!("gateway stopped");
}

async fn handle_http(gateway: Arc<Gateway>, request: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = request.method().as_str().to_string();
    let accept = request
        .headers()
        .get(hyper::header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    let url = match absolute_url(&request) {
        Some(url) => url,
        None => return plain_response(StatusCode::BAD_REQUEST, "missing or invalid host"),
    };

    let headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .filter(|(name, _)| *name != hyper::header::ACCEPT)
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = match request.into_body().collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(_) => return plain_response(StatusCode::BAD_REQUEST, "unreadable body"),
    };

    let response = gateway
        .handle(GatewayRequest {
            method,
            url,
            accept,
            headers,
            body,
        })
        .await;

    to_hyper(response)
}

/// Resolves the request's absolute URL from an absolute-form URI or the
/// `Host` header.
fn absolute_url(request: &Request<Incoming>) -> Option<Url> {
    let uri = request.uri();
    if uri.scheme().is_some() {
        return Url::parse(&uri.to_string()).ok();
    }

    let host = request
        .headers()
        .get(hyper::header::HOST)?
        .to_str()
        .ok()?;
    Url::parse(&format!("http://{host}{uri}")).ok()
}

fn to_hyper(response: CachedResponse) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);

    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            builder = builder.header(name, value);
        }
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn plain_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(message.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
