//! Low-level HTTP transport for the platform API.
//!
//! The transport maps wire-level failures (timeouts, connection errors) to
//! [`ClientError`] but passes HTTP statuses through untouched; retry and
//! 401 handling live in [`crate::PlatformClient`].

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::ClientError;

/// A request against the platform API, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct PlatformRequest {
	pub method: Method,
	pub path: String,
	pub bearer: Option<String>,
	pub json: Option<serde_json::Value>,
	pub form: Option<Vec<(String, String)>>,
}

impl PlatformRequest {
	pub fn post(path: impl Into<String>) -> Self {
		Self {
			method: Method::POST,
			path: path.into(),
			bearer: None,
			json: None,
			form: None,
		}
	}

	pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
		self.form = Some(form);
		self
	}
}

/// Raw platform response: HTTP status plus body bytes.
#[derive(Debug, Clone)]
pub struct PlatformResponse {
	pub status: u16,
	pub body: Vec<u8>,
}

impl PlatformResponse {
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self {
			status,
			body: body.into(),
		}
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
		serde_json::from_slice(&self.body).map_err(|e| ClientError::Deserialize(e.to_string()))
	}

	/// Extracts the upstream error message for propagation.
	///
	/// Looks for `error.message` or `message` in a JSON body, falling back
	/// to the raw body text.
	pub fn error_message(&self) -> String {
		if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.body) {
			if let Some(message) = value
				.get("error")
				.and_then(|e| e.get("message"))
				.and_then(|m| m.as_str())
			{
				return message.to_string();
			}
			if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
				return message.to_string();
			}
		}
		let text = String::from_utf8_lossy(&self.body);
		if text.is_empty() {
			format!("HTTP {}", self.status)
		} else {
			text.chars().take(200).collect()
		}
	}
}

/// Wire-level request execution, mockable in tests.
#[async_trait]
pub trait PlatformTransport: Send + Sync {
	async fn execute(&self, request: &PlatformRequest) -> Result<PlatformResponse, ClientError>;
}

/// Reqwest-based transport with a per-request timeout.
pub struct ReqwestTransport {
	http: reqwest::Client,
	base_url: String,
}

impl ReqwestTransport {
	pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
		let http = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ClientError::Network(e.to_string()))?;
		Ok(Self {
			http,
			base_url: base_url.into(),
		})
	}
}

#[async_trait]
impl PlatformTransport for ReqwestTransport {
	async fn execute(&self, request: &PlatformRequest) -> Result<PlatformResponse, ClientError> {
		let url = format!(
			"{}/{}",
			self.base_url.trim_end_matches('/'),
			request.path.trim_start_matches('/')
		);

		let mut builder = self.http.request(request.method.clone(), &url);
		if let Some(bearer) = &request.bearer {
			builder = builder.bearer_auth(bearer);
		}
		if let Some(json) = &request.json {
			builder = builder.json(json);
		}
		if let Some(form) = &request.form {
			builder = builder.form(form);
		}

		let response = builder.send().await.map_err(|e| {
			if e.is_timeout() {
				ClientError::Timeout
			} else {
				ClientError::Network(e.to_string())
			}
		})?;

		let status = response.status().as_u16();
		let body = response
			.bytes()
			.await
			.map_err(|e| ClientError::Network(e.to_string()))?
			.to_vec();

		Ok(PlatformResponse { status, body })
	}
}
