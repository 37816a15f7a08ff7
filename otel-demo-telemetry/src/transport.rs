//! HTTP transport used by the OTLP exporters.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use opentelemetry_http::{Bytes, HttpClient, HttpError, Request, Response};
use tracing::warn;

use crate::error::{Result, TelemetryError};

/// Parse an `Authorization` value for use on export requests.
///
/// Values that are not valid header text are dropped with a warning and the
/// exporter runs unauthenticated.
pub fn authorization_value(value: &str) -> Option<HeaderValue> {
    match HeaderValue::from_str(value) {
        Ok(mut header) => {
            header.set_sensitive(true);
            Some(header)
        }
        Err(e) => {
            warn!(error = %e, "Ignoring exporter credential that is not a valid header value");
            None
        }
    }
}

/// Build the blocking client shared by the three exporters.
///
/// The blocking client owns an internal runtime, so it is constructed on a
/// plain thread rather than inside the caller's async context.
pub fn blocking_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    std::thread::spawn(move || {
        reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
    })
    .join()
    .map_err(|_| TelemetryError::HttpClient("client builder thread panicked".to_string()))?
    .map_err(|e| TelemetryError::HttpClient(e.to_string()))
}

/// Stamps the configured `Authorization` value on every export request.
///
/// The exporter merges `OTEL_EXPORTER_OTLP_HEADERS` into its own headers
/// before the request reaches the client. Setting the header here replaces
/// whatever that merge produced, so the credential sent is always the one
/// computed by [`TelemetryConfig::authorization_header`].
///
/// [`TelemetryConfig::authorization_header`]: crate::TelemetryConfig::authorization_header
#[derive(Clone)]
pub struct AuthorizingHttpClient<C> {
    inner: C,
    authorization: Option<HeaderValue>,
}

impl<C> AuthorizingHttpClient<C> {
    pub fn new(inner: C, authorization: Option<HeaderValue>) -> Self {
        Self {
            inner,
            authorization,
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for AuthorizingHttpClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizingHttpClient")
            .field("inner", &self.inner)
            .field("authorized", &self.authorization.is_some())
            .finish()
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for AuthorizingHttpClient<C> {
    async fn send_bytes(&self, mut request: Request<Bytes>) -> std::result::Result<Response<Bytes>, HttpError> {
        match &self.authorization {
            Some(value) => {
                request.headers_mut().insert(AUTHORIZATION, value.clone());
            }
            None => {
                request.headers_mut().remove(AUTHORIZATION);
            }
        }
        self.inner.send_bytes(request).await
    }
}
