//! Configured HTTP client whose completions feed back into a controller.

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;

use super::outcome::RequestOutcome;
use crate::controller::Dispatcher;
use crate::types::{HttpConfig, Result};

/// HTTP service wrapper.
///
/// Base URL and timeouts come from [`HttpConfig`]; nothing is read from
/// process-wide state. Cheap to clone: clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    base_url: String,
    log_requests: bool,
}

impl ServiceClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            log_requests: config.log_requests,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request against `path` relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> RequestOutcome<T> {
        self.execute(self.request(Method::GET, path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> RequestOutcome<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(Method::POST, path).json(body)).await
    }

    /// Send a request and decode a JSON body.
    ///
    /// Anything other than a 2xx response with a decodable, non-empty body is a
    /// failure; transport errors carry no status code.
    pub async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> RequestOutcome<T> {
        let request = match request.build() {
            Ok(request) => request,
            Err(e) => return RequestOutcome::failure(None, e.to_string()),
        };
        let url = request.url().to_string();

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => return self.failed(&url, None, e.to_string()),
        };

        let status = response.status();
        let code = status.as_u16();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown error");
            return self.failed(&url, Some(code), reason.to_string());
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return self.failed(&url, Some(code), e.to_string()),
        };
        if body.is_empty() {
            return self.failed(&url, Some(code), "empty response body".to_string());
        }

        match serde_json::from_slice::<T>(&body) {
            Ok(data) => {
                if self.log_requests {
                    tracing::debug!(url = %url, status = code, "request succeeded");
                }
                RequestOutcome::Success(data)
            }
            Err(e) => self.failed(&url, Some(code), format!("invalid response body: {}", e)),
        }
    }

    /// True when `GET {url}/` answers with a 2xx status.
    pub async fn ping(&self, url: &str) -> bool {
        let target = format!("{}/", url.trim_end_matches('/'));
        match self.client.get(&target).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                if self.log_requests {
                    tracing::debug!(url = %target, "ping failed: {}", e);
                }
                false
            }
        }
    }

    /// Run `request` on a background task and dispatch `into_intent(outcome)`
    /// to the controller behind `dispatcher`.
    ///
    /// A controller torn down before the response arrives is not an error; the
    /// synthetic intent is dropped. Must be called from within a tokio runtime.
    pub fn enqueue<T, I, F>(
        &self,
        request: RequestBuilder,
        dispatcher: Dispatcher<I>,
        into_intent: F,
    ) -> JoinHandle<()>
    where
        T: DeserializeOwned + Send + 'static,
        I: Send + 'static,
        F: FnOnce(RequestOutcome<T>) -> I + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let outcome = client.execute::<T>(request).await;
            if let Err(e) = dispatcher.dispatch(into_intent(outcome)) {
                tracing::debug!("request completed after teardown, result dropped: {}", e);
            }
        })
    }

    fn failed<T>(&self, url: &str, code: Option<u16>, message: String) -> RequestOutcome<T> {
        if self.log_requests {
            tracing::warn!(url = %url, status = ?code, "request failed: {}", message);
        }
        RequestOutcome::failure(code, message)
    }
}
