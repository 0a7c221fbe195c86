use std::time::{Duration, Instant};

use hyper::ext::ReasonPhrase;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio::task::JoinHandle;

use crate::error::GatewayError;
use crate::gateway::guidance::strip_html;
use crate::gateway::{ApiOutcome, Endpoint, Extraction, RequestOptions, Success};
use crate::settings::Settings;

const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Client side of the YOURLS HTTP API.
///
/// Holds no per-call state: concurrent calls only share the connection pool.
#[derive(Clone)]
pub struct ApiGateway {
    client: Client,
}

/// Body and status of a settled exchange.
struct Exchange {
    status: StatusCode,
    /// Reason phrase from the status line, when it differs from the
    /// canonical one for `status`.
    reason: Option<String>,
    body: String,
}

/// One in-flight exchange running on its own task.
///
/// Whichever of completion or deadline happens first decides the result;
/// the task is aborted on the timeout path and whenever the handle is
/// dropped, so no request outlives its call.
struct PendingRequest {
    handle: JoinHandle<Result<Exchange, reqwest::Error>>,
}

impl PendingRequest {
    fn start(request: RequestBuilder) -> Self {
        let handle = tokio::spawn(async move {
            let response = request.send().await?;
            let status = response.status();
            let reason = response
                .extensions()
                .get::<ReasonPhrase>()
                .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned());
            let bytes = response.bytes().await?;
            let truncated = &bytes[..bytes.len().min(MAX_RESPONSE_BYTES)];
            Ok(Exchange {
                status,
                reason,
                body: String::from_utf8_lossy(truncated).into_owned(),
            })
        });
        Self { handle }
    }

    async fn settle(mut self, deadline: Duration) -> Result<Exchange, GatewayError> {
        tokio::select! {
            joined = &mut self.handle => match joined {
                Ok(Ok(exchange)) => Ok(exchange),
                Ok(Err(e)) => Err(GatewayError::Transport {
                    detail: e.to_string(),
                }),
                Err(e) => Err(GatewayError::Transport {
                    detail: format!("request task failed: {e}"),
                }),
            },
            () = tokio::time::sleep(deadline) => {
                self.handle.abort();
                Err(GatewayError::Timeout(deadline))
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        // No-op once the task has finished.
        self.handle.abort();
    }
}

impl ApiGateway {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Shorten `url`, optionally asking for a custom `keyword`.
    pub async fn shorten(&self, settings: &Settings, url: &str, keyword: Option<&str>) -> ApiOutcome {
        let options = RequestOptions::shorten(&settings.signature_token, url, keyword);
        self.call(settings, options, Extraction::short_url()).await
    }

    /// Ask the server for its YOURLS version; succeeds only when the
    /// server is reachable and accepts the signature.
    pub async fn check_version(&self, settings: &Settings) -> ApiOutcome {
        let options = RequestOptions::version(&settings.signature_token);
        self.call(settings, options, Extraction::version()).await
    }

    /// Perform one API call and classify its outcome.
    pub async fn call(
        &self,
        settings: &Settings,
        options: RequestOptions,
        rule: &Extraction,
    ) -> ApiOutcome {
        let endpoint = Endpoint::new(&settings.api_base_url);
        let action = options.get("action").unwrap_or("?");
        let start = Instant::now();

        let result = self.exchange(&endpoint, &options, settings.timeout(), rule).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(success) => {
                tracing::debug!(action, elapsed_ms, "yourls call succeeded");
                ApiOutcome::Success(success)
            }
            Err(e) => {
                let kind = e.kind();
                let status = e.status();
                match &e {
                    GatewayError::Transport { detail } => tracing::warn!(
                        action,
                        ?kind,
                        status,
                        elapsed_ms,
                        "yourls transport failure: {detail}"
                    ),
                    other => tracing::warn!(
                        action,
                        ?kind,
                        status,
                        elapsed_ms,
                        "yourls call failed: {other}"
                    ),
                }
                ApiOutcome::Failure(e.into_failure(&endpoint))
            }
        }
    }

    async fn exchange(
        &self,
        endpoint: &Endpoint,
        options: &RequestOptions,
        deadline: Duration,
        rule: &Extraction,
    ) -> Result<Success, GatewayError> {
        let body = options.encode().map_err(|e| GatewayError::Transport {
            detail: format!("failed to encode form body: {e}"),
        })?;

        let request = self
            .client
            .post(endpoint.api_url())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body);

        let exchange = PendingRequest::start(request).settle(deadline).await?;
        classify(exchange, rule)
    }
}

fn classify(exchange: Exchange, rule: &Extraction) -> Result<Success, GatewayError> {
    let Exchange {
        status,
        reason,
        body,
    } = exchange;

    if status != StatusCode::OK && status != StatusCode::CREATED {
        let reason = reason
            .as_deref()
            .or(status.canonical_reason())
            .unwrap_or("");
        return Err(GatewayError::HttpStatus {
            status: status.as_u16(),
            reason: strip_html(reason),
        });
    }

    match rule.extract(&body) {
        Some(extracted_value) => Ok(Success {
            extracted_value,
            raw_body: body,
        }),
        None => Err(GatewayError::MalformedResponse {
            text: strip_html(&body),
        }),
    }
}
