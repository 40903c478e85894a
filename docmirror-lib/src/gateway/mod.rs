//! Offline gateway at the transport boundary.
//!
//! Intercepts outgoing requests and applies a per-resource caching
//! strategy: network-first for backend and document traffic, cache-first
//! for versioned static assets, and a synthesized offline page when an HTML
//! request can be served neither from the network nor from cache. The
//! gateway knows nothing about datasets; it sees only requests.

mod response_cache;
mod serve;

pub use response_cache::*;
pub use serve::serve;

use std::sync::Arc;

use reqwest::Method;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

use crate::error::ApiError;
use crate::error::Error;

/// The page synthesized when an HTML request fails both network and cache.
const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Offline</title>
  <style>
    body { font-family: sans-serif; text-align: center; padding: 50px; }
    .offline-message { max-width: 400px; margin: 0 auto; }
  </style>
</head>
<body>
  <div class="offline-message">
    <h1>You're Offline</h1>
    <p>Please check your connection and try again.</p>
  </div>
</body>
</html>
"#;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Origin the static assets are served from, e.g. `https://app.example.com`.
    pub origin: String,
    /// Deployment version; namespaces are derived from it, so bumping it
    /// retires the previous deployment's caches on activate.
    pub version: String,
    /// Host substrings identifying the backend (document/auth) services.
    pub backend_hosts: Vec<String>,
    /// Exact request paths pre-cached on install and served cache-first.
    pub static_assets: Vec<String>,
    /// Path prefixes served cache-first (build output directories).
    pub asset_prefixes: Vec<String>,
}

impl GatewayConfig {
    /// Creates a config for the given origin, version `v1`, and no routes.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            version: "v1".to_string(),
            backend_hosts: Vec::new(),
            static_assets: Vec::new(),
            asset_prefixes: Vec::new(),
        }
    }

    /// Sets the deployment version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Adds a backend host substring.
    pub fn backend_host(mut self, host: impl Into<String>) -> Self {
        self.backend_hosts.push(host.into());
        self
    }

    /// Adds a static asset path.
    pub fn static_asset(mut self, path: impl Into<String>) -> Self {
        self.static_assets.push(path.into());
        self
    }

    /// Adds a cache-first path prefix.
    pub fn asset_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.asset_prefixes.push(prefix.into());
        self
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// HTTP method, uppercase.
    pub method: String,
    /// Absolute request URL.
    pub url: Url,
    /// The `Accept` header, if present.
    pub accept: Option<String>,
    /// Remaining request headers.
    pub headers: Vec<(String, String)>,
    /// Request body (empty for GET).
    pub body: Vec<u8>,
}

impl GatewayRequest {
    /// Creates a bare GET request.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            accept: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Sets the `Accept` header.
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    fn accepts_html(&self) -> bool {
        self.accept
            .as_deref()
            .is_some_and(|accept| accept.contains("text/html"))
    }
}

/// How a request is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteClass {
    /// Backend traffic: network-first.
    Backend,
    /// Versioned static asset: cache-first.
    StaticAsset,
    /// HTML documents and everything else: network-first.
    Default,
}

/// The request-caching gateway.
pub struct Gateway {
    config: GatewayConfig,
    cache: Arc<dyn ResponseCache>,
    upstream: reqwest::Client,
}

impl Gateway {
    /// Creates a gateway over the given response cache.
    pub fn new(config: GatewayConfig, cache: Arc<dyn ResponseCache>) -> Self {
        Self {
            config,
            cache,
            upstream: reqwest::Client::new(),
        }
    }

    fn static_namespace(&self) -> String {
        format!("static-{}", self.config.version)
    }

    fn dynamic_namespace(&self) -> String {
        format!("dynamic-{}", self.config.version)
    }

    fn classify(&self, url: &Url) -> RouteClass {
        if let Some(host) = url.host_str() {
            if self
                .config
                .backend_hosts
                .iter()
                .any(|backend| host.contains(backend.as_str()))
            {
                return RouteClass::Backend;
            }
        }

        let path = url.path();
        if self.config.static_assets.iter().any(|asset| asset == path)
            || self
                .config
                .asset_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return RouteClass::StaticAsset;
        }

        RouteClass::Default
    }

    /// Handles one intercepted request.
    ///
    /// Non-GET requests are forwarded untouched and never cached.
    pub async fn handle(&self, request: GatewayRequest) -> CachedResponse {
        if request.method != "GET" {
            return self.passthrough(&request).await;
        }

        let key = request_key(&request.method, request.url.as_str());
        match self.classify(&request.url) {
            RouteClass::Backend | RouteClass::Default => self.network_first(&request, &key).await,
            RouteClass::StaticAsset => self.cache_first(&request, &key).await,
        }
    }

    /// Network-first: try upstream, cache successful responses, fall back
    /// to cache, and synthesize the offline page for HTML requests when
    /// both fail. Non-HTML failures surface the upstream error (502).
    async fn network_first(&self, request: &GatewayRequest, key: &str) -> CachedResponse {
        let namespace = self.dynamic_namespace();

        match self.fetch_upstream(request).await {
            Ok(response) => {
                if response.status == 200 {
                    self.cache.put(&namespace, key, response.clone()).await;
                }
                response
            }
            Err(err) => {
                debug!(url = %request.url, %err, "network failed, trying cache");
                if let Some(cached) = self.cache.match_request(&namespace, key).await {
                    return cached;
                }
                if request.accepts_html() {
                    offline_page()
                } else {
                    bad_gateway(&err)
                }
            }
        }
    }

    /// Cache-first: serve a stored copy if one exists, otherwise fetch and
    /// cache. An upstream failure with no cached copy surfaces the error.
    async fn cache_first(&self, request: &GatewayRequest, key: &str) -> CachedResponse {
        let namespace = self.static_namespace();

        if let Some(cached) = self.cache.match_request(&namespace, key).await {
            return cached;
        }

        match self.fetch_upstream(request).await {
            Ok(response) => {
                if response.status == 200 {
                    self.cache.put(&namespace, key, response.clone()).await;
                }
                response
            }
            Err(err) => {
                warn!(url = %request.url, %err, "cache-first fetch failed");
                bad_gateway(&err)
            }
        }
    }

    async fn passthrough(&self, request: &GatewayRequest) -> CachedResponse {
        match self.fetch_upstream(request).await {
            Ok(response) => response,
            Err(err) => bad_gateway(&err),
        }
    }

    async fn fetch_upstream(&self, request: &GatewayRequest) -> Result<CachedResponse, Error> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ApiError::parse(format!("invalid method '{}'", request.method)))?;

        let mut upstream = self.upstream.request(method, request.url.clone());
        if let Some(ref accept) = request.accept {
            upstream = upstream.header("accept", accept);
        }
        for (name, value) in &request.headers {
            if is_hop_by_hop(name) {
                continue;
            }
            upstream = upstream.header(name, value);
        }
        if !request.body.is_empty() {
            upstream = upstream.body(request.body.clone());
        }

        let response = upstream.send().await.map_err(ApiError::Network)?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(ApiError::Network)?
            .to_vec();

        Ok(CachedResponse::new(status, headers, body))
    }

    /// Pre-populates the static namespace with the configured assets.
    ///
    /// A failed fetch is logged and skipped; install never fails outright.
    pub async fn install(&self) {
        let namespace = self.static_namespace();
        let origin = self.config.origin.trim_end_matches('/');
        let mut cached = 0;

        for asset in &self.config.static_assets {
            let raw = format!("{origin}{asset}");
            let url = match Url::parse(&raw) {
                Ok(url) => url,
                Err(err) => {
                    warn!(url = raw, %err, "invalid static asset url");
                    continue;
                }
            };

            let request = GatewayRequest::get(url);
            let key = request_key("GET", request.url.as_str());
            match self.fetch_upstream(&request).await {
                Ok(response) if response.status == 200 => {
                    self.cache.put(&namespace, &key, response).await;
                    cached += 1;
                }
                Ok(response) => {
                    warn!(url = raw, status = response.status, "pre-cache fetch unsuccessful");
                }
                Err(err) => {
                    warn!(url = raw, %err, "failed to pre-cache asset");
                }
            }
        }

        info!(
            cached,
            total = self.config.static_assets.len(),
            "static asset pre-cache complete"
        );
    }

    /// Drops every cache namespace not belonging to the current version.
    ///
    /// Run on deployment rollover to garbage-collect prior generations.
    pub async fn activate(&self) {
        let keep = [self.static_namespace(), self.dynamic_namespace()];

        for namespace in self.cache.namespaces().await {
            if !keep.contains(&namespace) {
                info!(namespace, "deleting old cache namespace");
                self.cache.delete_namespace(&namespace).await;
            }
        }
    }

    /// Drops every cache namespace (full reset). Returns how many.
    pub async fn clear_caches(&self) -> usize {
        let cleared = self.cache.clear_all().await;
        info!(cleared, "cleared all cache namespaces");
        cleared
    }
}

/// External control commands accepted over the gateway's message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCommand {
    /// Run [`Gateway::activate`] immediately.
    Activate,
    /// Run [`Gateway::clear_caches`].
    ClearCaches,
}

/// Processes [`GatewayCommand`]s until the channel closes.
pub fn spawn_command_listener(
    gateway: Arc<Gateway>,
    mut commands: mpsc::Receiver<GatewayCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            match command {
                GatewayCommand::Activate => gateway.activate().await,
                GatewayCommand::ClearCaches => {
                    gateway.clear_caches().await;
                }
            }
        }
    })
}

fn offline_page() -> CachedResponse {
    CachedResponse::new(
        200,
        vec![("content-type".to_string(), "text/html".to_string())],
        OFFLINE_PAGE.as_bytes().to_vec(),
    )
}

fn bad_gateway(err: &Error) -> CachedResponse {
    CachedResponse::new(
        502,
        vec![("content-type".to_string(), "text/plain".to_string())],
        err.to_string().into_bytes(),
    )
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> Gateway {
        let config = GatewayConfig::new("https://app.example.com")
            .with_version("v2")
            .backend_host("docs.example.com")
            .static_asset("/index.html")
            .static_asset("/manifest.json")
            .asset_prefix("/js/")
            .asset_prefix("/css/");
        Gateway::new(config, Arc::new(MemoryResponseCache::new()))
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_backend_hosts_are_network_first() {
        let gw = gateway();
        assert_eq!(
            gw.classify(&url("https://docs.example.com/collections/servers/documents")),
            RouteClass::Backend
        );
    }

    #[test]
    fn test_static_paths_and_prefixes_are_cache_first() {
        let gw = gateway();
        assert_eq!(
            gw.classify(&url("https://app.example.com/index.html")),
            RouteClass::StaticAsset
        );
        assert_eq!(
            gw.classify(&url("https://app.example.com/js/app.1f3c.js")),
            RouteClass::StaticAsset
        );
    }

    #[test]
    fn test_everything_else_defaults_to_network_first() {
        let gw = gateway();
        assert_eq!(
            gw.classify(&url("https://app.example.com/profile")),
            RouteClass::Default
        );
    }

    #[test]
    fn test_backend_classification_wins_over_paths() {
        let gw = gateway();
        assert_eq!(
            gw.classify(&url("https://docs.example.com/js/app.js")),
            RouteClass::Backend
        );
    }

    #[test]
    fn test_request_key_includes_method_and_url() {
        assert_eq!(
            request_key("GET", "https://a/b?c=1"),
            "GET https://a/b?c=1"
        );
    }

    #[test]
    fn test_offline_page_shape() {
        let page = offline_page();
        assert_eq!(page.status, 200);
        assert!(
            page.headers
                .iter()
                .any(|(n, v)| n == "content-type" && v == "text/html")
        );
        assert!(String::from_utf8(page.body).unwrap().contains("Offline"));
    }

    #[tokio::test]
    async fn test_namespaces_are_versioned() {
        let gw = gateway();
        assert_eq!(gw.static_namespace(), "static-v2");
        assert_eq!(gw.dynamic_namespace(), "dynamic-v2");
    }

    #[tokio::test]
    async fn test_activate_drops_foreign_namespaces() {
        let cache = Arc::new(MemoryResponseCache::new());
        let config = GatewayConfig::new("https://app.example.com").with_version("v2");
        let gw = Gateway::new(config, cache.clone());

        for ns in ["static-v1", "dynamic-v1", "static-v2", "dynamic-v2"] {
            cache
                .put(ns, "GET https://a/x", CachedResponse::new(200, vec![], vec![]))
                .await;
        }

        gw.activate().await;

        let mut remaining = cache.namespaces().await;
        remaining.sort();
        assert_eq!(remaining, ["dynamic-v2", "static-v2"]);
    }
}
