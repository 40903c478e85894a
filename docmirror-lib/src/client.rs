//! HTTP client for the remote document store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Method;
use serde::Deserialize;
use serde::Serialize;

use crate::api::query::Query;
use crate::api::query::QueryPage;
use crate::api::query::url::query_string;
use crate::error::ApiError;
use crate::error::Error;
use crate::model::DatasetRecord;
use crate::store::DocumentStore;

/// Error codes with which the store reports that a collection cannot serve
/// an ordered change-timestamp query (missing index or missing field).
const MISSING_CAPABILITY_CODES: [&str; 2] = ["failed-precondition", "invalid-argument"];

/// A [`DocumentStore`] backed by a remote HTTP document API.
///
/// The client is cheap to clone (uses `Arc` internally) and can be shared
/// across tasks safely.
///
/// # Example
///
/// ```ignore
/// use docmirror_lib::HttpStore;
///
/// let store = HttpStore::builder()
///     .url("https://docs.example.com")
///     .bearer_token("secret")
///     .build();
/// ```
#[derive(Clone)]
pub struct HttpStore {
    inner: Arc<HttpStoreInner>,
}

struct HttpStoreInner {
    base_url: String,
    bearer_token: Option<String>,
    http_client: Client,
    timeout: Option<Duration>,
}

impl HttpStore {
    /// Creates a new builder for constructing a store client.
    pub fn builder() -> HttpStoreBuilder<Missing> {
        HttpStoreBuilder::new()
    }

    /// Returns the base URL of the document store.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.inner.http_client.request(method, url);

        if let Some(ref token) = self.inner.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = self.inner.timeout {
            request = request.timeout(timeout);
        }

        request
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/collections/{}/documents",
            self.inner.base_url.trim_end_matches('/'),
            collection
        )
    }

    /// Reads an error payload off a non-success response.
    async fn error_from_response(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => ApiError::Http {
                status,
                message: parsed.error.message,
                code: Some(parsed.error.code),
            },
            Err(_) => ApiError::http(status, body),
        }
    }
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn query(&self, collection: &str, query: &Query) -> Result<QueryPage, Error> {
        let mut url = self.collection_url(collection);
        let params = query_string(query);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params);
        }

        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(map_request_error)?;

        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            // An index/field complaint on the ordered field is a capability
            // gap, not a plain request failure.
            if err
                .error_code()
                .is_some_and(|code| MISSING_CAPABILITY_CODES.contains(&code))
            {
                return Err(Error::MissingCapability {
                    collection: collection.to_string(),
                    field: query
                        .order_by
                        .as_ref()
                        .map(|o| o.field.clone())
                        .unwrap_or_else(|| "updatedAt".to_string()),
                });
            }
            return Err(err.into());
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|err| ApiError::parse(err.to_string()))?;

        let mut page = QueryPage::new(body.documents);
        if let Some(cursor) = body.next_cursor {
            page = page.with_next_cursor(cursor);
        }
        Ok(page)
    }

    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<(), Error> {
        let url = format!("{}:batchDelete", self.collection_url(collection));

        let response = self
            .request(Method::POST, &url)
            .json(&BatchDeleteRequest { ids })
            .send()
            .await
            .map_err(map_request_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await.into());
        }

        Ok(())
    }
}

fn map_request_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        ApiError::Timeout(Duration::from_secs(30)).into()
    } else {
        ApiError::Network(err).into()
    }
}

/// Wire format of a query response.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    documents: Vec<DatasetRecord>,
    #[serde(rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchDeleteRequest<'a> {
    ids: &'a [String],
}

/// Wire format of an error response.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

// =============================================================================
// Typestate Builder
// =============================================================================

/// Marker type for missing required builder fields.
pub struct Missing;

/// Marker type for set builder fields.
pub struct Set<T>(T);

/// Builder for constructing an [`HttpStore`].
///
/// Uses the typestate pattern to ensure the base URL is set at compile time.
///
/// # Example
///
/// ```ignore
/// let store = HttpStore::builder()
///     .url("https://docs.example.com")
///     .timeout(Duration::from_secs(30))
///     .build();
/// ```
pub struct HttpStoreBuilder<Url> {
    url: Url,
    bearer_token: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    http_client: Option<Client>,
}

impl HttpStoreBuilder<Missing> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            url: Missing,
            bearer_token: None,
            timeout: None,
            connect_timeout: None,
            http_client: None,
        }
    }

    /// Sets the document store base URL.
    pub fn url(self, url: impl Into<String>) -> HttpStoreBuilder<Set<String>> {
        HttpStoreBuilder {
            url: Set(url.into()),
            bearer_token: self.bearer_token,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            http_client: self.http_client,
        }
    }
}

impl Default for HttpStoreBuilder<Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> HttpStoreBuilder<U> {
    /// Sets a bearer token attached to every request.
    ///
    /// Token acquisition and refresh are the caller's concern; this client
    /// only carries what it is given.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connection timeout.
    ///
    /// This is applied when building the HTTP client.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets a custom HTTP client.
    ///
    /// If not set, a default client will be created.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }
}

impl HttpStoreBuilder<Set<String>> {
    /// Builds the [`HttpStore`].
    ///
    /// This method is only available once `url` has been set.
    pub fn build(self) -> HttpStore {
        let http_client = self.http_client.unwrap_or_else(|| {
            let mut builder = Client::builder();
            if let Some(timeout) = self.connect_timeout {
                builder = builder.connect_timeout(timeout);
            }
            builder.build().expect("Failed to build HTTP client")
        });

        HttpStore {
            inner: Arc::new(HttpStoreInner {
                base_url: self.url.0,
                bearer_token: self.bearer_token,
                http_client,
                timeout: self.timeout,
            }),
        }
    }
}
