use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ApiKey;
use crate::constants;
use crate::oracle::{Oracle, OracleError, OracleSession};

/// Gemini backend configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: ApiKey,
    pub model: String,
    /// Base URL up to and including the API version, e.g. `.../v1beta`.
    pub api_base: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            model: constants::GEMINI_MODEL.clone(),
            api_base: constants::GEMINI_API_BASE.clone(),
            connect_timeout: Duration::from_secs(constants::CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(constants::REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Accepts both `gemini-2.5-flash` and `models/gemini-2.5-flash`.
    fn model_path(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!("{}/models/{}", self.api_base, model)
    }
}

// Wire structures for the generateContent endpoint

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Part {
    #[serde(default)]
    text: String,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: &'a Content,
    contents: &'a [Content],
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

impl ErrorBody {
    fn has_reason(&self, reason: &str) -> bool {
        self.details
            .iter()
            .any(|d| d.get("reason").and_then(|r| r.as_str()) == Some(reason))
    }
}

fn parse_error_body(body: &str) -> Option<ErrorBody> {
    serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error)
}

fn describe(status: StatusCode, body: &str) -> String {
    match parse_error_body(body) {
        Some(err) if !err.message.is_empty() => format!("HTTP {status}: {}", err.message),
        _ => format!("HTTP {status}: {body}"),
    }
}

fn transport_error(e: reqwest::Error) -> OracleError {
    if e.is_timeout() {
        OracleError::ServiceUnavailable(format!("request timed out: {e}"))
    } else {
        OracleError::ServiceUnavailable(e.to_string())
    }
}

/// Maps a failed response of the model lookup made when opening a session.
fn open_error(status: StatusCode, body: &str) -> OracleError {
    let detail = describe(status, body);
    let key_invalid = parse_error_body(body).is_some_and(|e| e.has_reason("API_KEY_INVALID"));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => OracleError::Authentication(detail),
        StatusCode::BAD_REQUEST if key_invalid => OracleError::Authentication(detail),
        StatusCode::NOT_FOUND => OracleError::ModelUnavailable(detail),
        _ => OracleError::ServiceUnavailable(detail),
    }
}

/// Maps a failed response of a generateContent call.
fn turn_error(status: StatusCode, body: &str) -> OracleError {
    let detail = describe(status, body);
    let key_invalid = parse_error_body(body).is_some_and(|e| e.has_reason("API_KEY_INVALID"));
    match status {
        StatusCode::TOO_MANY_REQUESTS => OracleError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => OracleError::Authentication(detail),
        StatusCode::BAD_REQUEST if key_invalid => OracleError::Authentication(detail),
        StatusCode::NOT_FOUND => OracleError::ModelUnavailable(detail),
        s if s.is_client_error() => OracleError::Request(detail),
        _ => OracleError::ServiceUnavailable(detail),
    }
}

fn reply_text(response: GenerateResponse) -> Result<String, OracleError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(OracleError::Request(format!("prompt blocked: {reason}")));
    }
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| OracleError::Request("no candidates in response".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".to_string());
        return Err(OracleError::Request(format!("empty reply (finish reason: {reason})")));
    }
    Ok(text)
}

/// Opens chat sessions against the Gemini REST API.
pub struct GeminiOracle {
    config: Arc<GeminiConfig>,
    http: Client,
}

impl GeminiOracle {
    pub fn new(config: GeminiConfig) -> Result<Self, OracleError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OracleError::ServiceUnavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

#[async_trait]
impl Oracle for GeminiOracle {
    #[instrument(skip(self, preamble), fields(model = %self.config.model))]
    async fn open_session(&self, preamble: &str) -> Result<Box<dyn OracleSession>, OracleError> {
        if self.config.api_key.is_empty() {
            return Err(OracleError::Authentication("no API key configured".to_string()));
        }

        // Probe the model so bad credentials or model ids fail here, not on the first turn.
        let url = self.config.model_path();
        let response = self
            .http
            .get(&url)
            .header("x-goog-api-key", self.config.api_key.expose())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Gemini model lookup failed");
            return Err(open_error(status, &body));
        }

        info!("Opened Gemini chat session");
        Ok(Box::new(GeminiChat {
            config: Arc::clone(&self.config),
            http: self.http.clone(),
            system_instruction: Content::text(None, preamble),
            history: Vec::new(),
        }))
    }
}

/// One conversation; keeps the committed history sent with every turn.
pub struct GeminiChat {
    config: Arc<GeminiConfig>,
    http: Client,
    system_instruction: Content,
    history: Vec<Content>,
}

impl GeminiChat {
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[async_trait]
impl OracleSession for GeminiChat {
    #[instrument(skip(self, text), fields(model = %self.config.model, history = self.history.len()))]
    async fn turn(&mut self, text: &str) -> Result<String, OracleError> {
        let mut contents = self.history.clone();
        contents.push(Content::text(Some("user"), text));

        let request = GenerateRequest {
            system_instruction: &self.system_instruction,
            contents: &contents,
        };
        let url = format!("{}:generateContent", self.config.model_path());
        debug!("Sending Gemini generateContent request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.config.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "Gemini generateContent failed");
            return Err(turn_error(status, &body));
        }

        let parsed = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| OracleError::Request(format!("failed to parse Gemini response: {e}")))?;
        let reply = reply_text(parsed)?;

        // Only completed exchanges become part of the conversation.
        contents.push(Content::text(Some("model"), &reply));
        self.history = contents;
        debug!(reply_len = reply.len(), "Received Gemini reply");
        Ok(reply)
    }
}
