use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use log::warn;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, RequestBuilder, StatusCode};

use crate::common::Status;



pub const MAX_ATTEMPTS: u32 = 3;
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const BASE_BACKOFF_MS: u64 = 500;

/// HTTP client for one upstream source. Retries transient failures and turns
/// everything else into an error with the source name attached.
#[derive(Clone)]
pub struct FetchClient {
	http: Client,
	source_name: String,
	retry_backoff: Duration,
}

impl FetchClient {
	pub fn new(source_name: &str, timeout: Duration) -> anyhow::Result<Self> {
		Self::builder(source_name, timeout).build()
	}

	pub fn builder(source_name: &str, timeout: Duration) -> FetchClientBuilder {
		FetchClientBuilder {
			source_name: source_name.to_string(),
			timeout,
			referer: None,
			accept_invalid_certs: false,
			retry_backoff: Duration::from_millis(BASE_BACKOFF_MS),
		}
	}

	/// GET with retries, parsing the body as JSON.
	///
	/// `build_request` is called once per attempt and must return a fully
	/// configured request (URL, query, headers).
	pub async fn get_json(&self, build_request: impl Fn(&Client) -> RequestBuilder) -> anyhow::Result<serde_json::Value> {
		let text = self.get_text(build_request).await?;
		// Some upstreams prefix their JSON with a BOM.
		let trimmed = text.trim_start_matches('\u{feff}');
		serde_json::from_str(trimmed).with_context(|| {
			format!(
				"failed to parse {} JSON response (body: {})",
				self.source_name,
				trimmed.chars().take(200).collect::<String>(),
			)
		})
	}

	/// GET with retries, returning the raw body.
	pub async fn get_text(&self, build_request: impl Fn(&Client) -> RequestBuilder) -> anyhow::Result<String> {
		let mut last_error = None;

		for attempt in 1..=MAX_ATTEMPTS {
			match build_request(&self.http).send().await {
				Ok(resp) => {
					let status = resp.status();
					if status.is_success() {
						return resp.text().await
							.with_context(|| format!("failed to read {} response body", self.source_name));
					}
					if !is_retryable(status) {
						bail!("{} error ({})", self.source_name, status);
					}
					last_error = Some(anyhow!("{} upstream error ({})", self.source_name, status));
				},
				Err(err) => {
					last_error = Some(anyhow!(err).context(format!("{} request failed", self.source_name)));
				}
			}

			if attempt < MAX_ATTEMPTS {
				let wait = self.backoff(attempt);
				warn!("{}: retry {}/{} in {}ms", self.source_name, attempt, MAX_ATTEMPTS - 1, wait.as_millis());
				tokio::time::sleep(wait).await;
			}
		}

		Err(last_error
			.unwrap_or_else(|| anyhow!("{} request failed", self.source_name))
			.context(format!("giving up after {} attempts", MAX_ATTEMPTS)))
	}

	/// Checks whether a viewer URL answers. Tries HEAD first since some servers
	/// reject it, then a GET whose body is never read.
	pub async fn probe(&self, url: &str, timeout: Duration) -> Status {
		if url.is_empty() {
			return Status::Unknown;
		}

		match self.http.head(url).timeout(timeout).send().await {
			Ok(resp) => status_for(resp.status()),
			Err(_) => match self.http.get(url).timeout(timeout).send().await {
				Ok(resp) => status_for(resp.status()),
				Err(_) => Status::Error,
			},
		}
	}

	fn backoff(&self, attempt: u32) -> Duration {
		if self.retry_backoff.is_zero() {
			return Duration::ZERO;
		}
		let base = self.retry_backoff * attempt;
		let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
		base + Duration::from_millis(jitter)
	}
}

pub struct FetchClientBuilder {
	source_name: String,
	timeout: Duration,
	referer: Option<String>,
	accept_invalid_certs: bool,
	retry_backoff: Duration,
}

impl FetchClientBuilder {
	pub fn referer(mut self, referer: String) -> Self {
		self.referer = Some(referer);
		self
	}

	/// The municipal endpoint has served broken certificate chains.
	pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
		self.accept_invalid_certs = accept;
		self
	}

	pub fn retry_backoff(mut self, backoff: Duration) -> Self {
		self.retry_backoff = backoff;
		self
	}

	pub fn build(self) -> anyhow::Result<FetchClient> {
		let mut headers = HeaderMap::new();
		if let Some(referer) = &self.referer {
			headers.insert(REFERER, HeaderValue::from_str(referer).context("invalid referer header")?);
		}

		let http = Client::builder()
			.timeout(self.timeout)
			.user_agent(BROWSER_USER_AGENT)
			.default_headers(headers)
			.danger_accept_invalid_certs(self.accept_invalid_certs)
			.build()
			.with_context(|| format!("failed to build HTTP client for {}", self.source_name))?;

		Ok(FetchClient {
			http,
			source_name: self.source_name,
			retry_backoff: self.retry_backoff,
		})
	}
}

fn is_retryable(status: StatusCode) -> bool {
	status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn status_for(code: StatusCode) -> Status {
	if code.as_u16() < 400 {
		Status::Active
	} else {
		Status::Error
	}
}
