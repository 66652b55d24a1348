use std::time::Duration;

use chatline_sync::error::{
    BuildClientSnafu, DecodeSnafu, EmptyBodySnafu, NotFoundSnafu, StatusSnafu, TimeoutSnafu,
};
use chatline_sync::{ServiceError, ServiceResult};
use reqwest::{Method, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::settings::ClientSettings;

/// JSON-over-HTTP request primitive shared by every service call.
///
/// Each call is bounded by the configured timeout, and failures are sorted
/// into the categories the engine reacts to differently: timeout, network,
/// not found and other statuses.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_root: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(settings: &ClientSettings) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.request_timeout())
            .build()
            .map_err(|error| {
                BuildClientSnafu {
                    stage: "build-http-client",
                    details: error.to_string(),
                }
                .build()
            })?;

        Ok(Self {
            client,
            api_root: settings.api_root(),
            timeout: settings.request_timeout(),
        })
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path.trim_start_matches('/'))
    }

    /// Issues one request. Resolves to `None` for 204 and zero-length bodies.
    pub async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ServiceResult<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        match tokio::time::timeout(self.timeout, self.execute(method.clone(), path, body)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%method, path, timeout = ?self.timeout, "request timed out");
                TimeoutSnafu {
                    stage: "await-response",
                    path,
                    timeout: self.timeout,
                }
                .fail()
            }
        }
    }

    /// Like [`HttpTransport::request`], but an empty body is an error.
    pub async fn request_required<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ServiceResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        match self.request(method, path, body).await? {
            Some(value) => Ok(value),
            None => EmptyBodySnafu {
                stage: "read-required-body",
                path,
            }
            .fail(),
        }
    }

    pub async fn get<T>(&self, path: &str) -> ServiceResult<T>
    where
        T: DeserializeOwned,
    {
        self.request_required::<(), T>(Method::GET, path, None).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> ServiceResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_required(Method::POST, path, Some(body)).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> ServiceResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_required(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> ServiceResult<()> {
        self.request::<(), serde_json::Value>(Method::DELETE, path, None)
            .await
            .map(|_| ())
    }

    async fn execute<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ServiceResult<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut builder = self
            .client
            .request(method.clone(), self.url(path))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }

        tracing::debug!(%method, path, "sending request");
        let response = builder
            .send()
            .await
            .map_err(|error| classify(error, path, self.timeout))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| classify(error, path, self.timeout))?;

        if status == StatusCode::NOT_FOUND {
            return NotFoundSnafu {
                stage: "check-response-status",
                path,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }
            .fail();
        }
        if !status.is_success() {
            return StatusSnafu {
                stage: "check-response-status",
                path,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }
            .fail();
        }
        if status == StatusCode::NO_CONTENT || bytes.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&bytes).map(Some).map_err(|error| {
            DecodeSnafu {
                stage: "decode-response-json",
                path,
                details: error.to_string(),
            }
            .build()
        })
    }
}

fn classify(error: reqwest::Error, path: &str, timeout: Duration) -> ServiceError {
    if error.is_timeout() {
        return ServiceError::Timeout {
            stage: "send-request",
            path: path.to_string(),
            timeout,
        };
    }
    if error.is_decode() {
        return ServiceError::Decode {
            stage: "read-response-body",
            path: path.to_string(),
            details: error.to_string(),
        };
    }
    if let Some(status) = error.status() {
        return ServiceError::Status {
            stage: "send-request",
            path: path.to_string(),
            status: status.as_u16(),
            body: error.to_string(),
        };
    }

    // Connect, request and body failures are all transient connectivity issues.
    ServiceError::Network {
        stage: "send-request",
        path: path.to_string(),
        details: error.to_string(),
    }
}
