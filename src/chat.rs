use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult, ChatError};
use crate::pricing::{PriceTable, TokenUsage};
use crate::shape::TargetShape;

const JSON_ONLY_INSTRUCTION: &str =
    "Respond with a single JSON object only. Do not include prose or markdown.";
const MAX_ERROR_SNIPPET: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    /// Falls back to the client's configured model when unset.
    pub model: Option<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
            model: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructuredResponse {
    pub value: Value,
    pub cost_usd: f64,
    pub usage: Option<TokenUsage>,
    pub model: String,
}

#[async_trait]
pub trait StructuredChat: Send + Sync {
    async fn request_structured(
        &self,
        messages: &[ChatMessage],
        shape: &TargetShape,
        options: &ChatOptions,
    ) -> Result<StructuredResponse, ChatError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_jitter,
        }
    }

    pub const fn standard() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_millis(100))
    }

    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(10);
        self.base_delay * (1_u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

enum Attempt {
    Completed(String),
    Transient(String),
    Rejected(ChatError),
}

pub struct StructuredChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    default_model: String,
    prices: PriceTable,
    retry: RetryPolicy,
    jitter_rng: Arc<Mutex<StdRng>>,
}

impl StructuredChatClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let api_key = config
            .chat_api_key
            .clone()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("CHAT_API_KEY is not configured; cannot reach chat backend".into())
            })?;
        let prices = PriceTable::with_overrides(config.chat_price_table.as_deref())?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.chat_timeout_secs))
            .user_agent(concat!("trail-importer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/chat/completions",
                config.chat_api_base.trim_end_matches('/')
            ),
            api_key,
            default_model: config.chat_model.clone(),
            prices,
            retry: RetryPolicy::standard(),
            jitter_rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    fn backoff_delay(&self, retry: u32) -> Duration {
        let base = self.retry.base_delay_for(retry);
        let jitter_cap = self.retry.max_jitter.as_millis() as u64;
        let jitter_ms = if jitter_cap == 0 {
            0
        } else {
            self.jitter_rng.lock().gen_range(0..=jitter_cap)
        };
        base + Duration::from_millis(jitter_ms)
    }

    async fn send_once(&self, body: &Value) -> Attempt {
        let response = match self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return Attempt::Transient(format!("transport error: {err}")),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => return Attempt::Transient(format!("failed reading body: {err}")),
        };

        if status.is_success() {
            Attempt::Completed(text)
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Attempt::Transient(format!("{status}: {}", snippet(&text)))
        } else {
            Attempt::Rejected(ChatError::ClientRequest {
                status: status.as_u16(),
                message: snippet(&text),
            })
        }
    }

    fn price(&self, model: &str, usage: Option<TokenUsage>) -> f64 {
        let Some(usage) = usage else {
            warn!(
                target: "chat_client",
                model,
                "completion carried no usage metadata; reporting zero cost"
            );
            return 0.0;
        };
        match self.prices.cost(model, usage) {
            Some(cost) => cost,
            None => {
                warn!(
                    target: "chat_client",
                    model,
                    "no price configured for model; reporting zero cost"
                );
                0.0
            }
        }
    }
}

#[async_trait]
impl StructuredChat for StructuredChatClient {
    async fn request_structured(
        &self,
        messages: &[ChatMessage],
        shape: &TargetShape,
        options: &ChatOptions,
    ) -> Result<StructuredResponse, ChatError> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let body = build_request_body(&model, messages, shape, options);

        let mut attempt = 0;
        let text = loop {
            attempt += 1;
            match self.send_once(&body).await {
                Attempt::Completed(text) => break text,
                Attempt::Rejected(err) => return Err(err),
                Attempt::Transient(fault) if attempt <= self.retry.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        target: "chat_client",
                        attempt,
                        fault = %fault,
                        "chat request failed; retrying after {:?}",
                        delay
                    );
                    sleep(delay).await;
                }
                Attempt::Transient(fault) => {
                    return Err(ChatError::UpstreamUnavailable {
                        attempts: attempt,
                        last_fault: fault,
                    })
                }
            }
        };

        let completion = parse_completion(&text)?;
        let cost_usd = self.price(&model, completion.usage);
        let value = decode_content(completion.content)
            .and_then(|content| {
                shape
                    .validate(content)
                    .map_err(|violation| violation.to_string())
            })
            .map_err(|reason| ChatError::schema(reason, cost_usd))?;

        debug!(
            target: "chat_client",
            model = %model,
            attempts = attempt,
            cost_usd,
            "structured completion accepted"
        );
        Ok(StructuredResponse {
            value,
            cost_usd,
            usage: completion.usage,
            model,
        })
    }
}

fn build_request_body(
    model: &str,
    messages: &[ChatMessage],
    shape: &TargetShape,
    options: &ChatOptions,
) -> Value {
    let mut wire_messages = Vec::with_capacity(messages.len() + 1);
    wire_messages.push(json!({
        "role": ChatRole::System,
        "content": format!(
            "{JSON_ONLY_INSTRUCTION} The object must match this shape (fields ending in ? are optional): {}",
            shape.describe()
        ),
    }));
    wire_messages.extend(messages.iter().map(|message| json!(message)));

    json!({
        "model": model,
        "messages": wire_messages,
        "temperature": options.temperature,
        "max_tokens": options.max_tokens,
        "response_format": { "type": "json_object" },
    })
}

#[derive(Debug)]
pub(crate) struct ParsedCompletion {
    pub content: Option<String>,
    pub usage: Option<TokenUsage>,
}

pub(crate) fn parse_completion(body: &str) -> Result<ParsedCompletion, ChatError> {
    #[derive(Deserialize)]
    struct Envelope {
        #[serde(default)]
        choices: Vec<Choice>,
        usage: Option<Usage>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: Option<ChoiceMessage>,
    }

    #[derive(Deserialize)]
    struct ChoiceMessage {
        content: Option<String>,
    }

    #[derive(Deserialize)]
    struct Usage {
        prompt_tokens: Option<u64>,
        completion_tokens: Option<u64>,
    }

    let envelope: Envelope = serde_json::from_str(body).map_err(|err| {
        ChatError::schema(format!("backend response is not a completion: {err}"), 0.0)
    })?;

    let usage = envelope.usage.and_then(|usage| {
        match (usage.prompt_tokens, usage.completion_tokens) {
            (Some(prompt_tokens), Some(completion_tokens)) => Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
            }),
            _ => None,
        }
    });

    let content = envelope
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content);

    Ok(ParsedCompletion { content, usage })
}

pub(crate) fn decode_content(content: Option<String>) -> Result<Value, String> {
    let content = content.ok_or_else(|| "completion has no message content".to_string())?;
    serde_json::from_str(strip_code_fence(&content))
        .map_err(|err| format!("message content is not valid JSON: {err}"))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_ERROR_SNIPPET {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_ERROR_SNIPPET).collect();
        format!("{cut}…")
    }
}
