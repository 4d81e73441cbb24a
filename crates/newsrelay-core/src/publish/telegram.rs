use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::Publisher;
use crate::config::{ChatId, TelegramConfig};
use crate::retry::RetryPolicy;
use crate::throttle::Throttle;
use crate::{Error, Result};

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a ChatId,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Identity of the bot behind the configured token (`getMe`)
#[derive(Debug, Clone, Deserialize)]
pub struct BotInfo {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

/// Publishes messages to one chat through the Telegram Bot API
pub struct TelegramPublisher {
    client: Client,
    api_base: String,
    token: String,
    chat_id: ChatId,
    throttle: Throttle,
    retry: RetryPolicy,
}

impl TelegramPublisher {
    pub fn new(config: &TelegramConfig, retry: RetryPolicy) -> Result<Self> {
        let token = config
            .bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config("telegram.bot_token is not set".into()))?;
        let chat_id = config
            .chat_id
            .clone()
            .ok_or_else(|| Error::Config("telegram.chat_id is not set".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
            throttle: Throttle::new(Duration::from_millis(config.min_send_interval_ms)),
            retry,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn send_once(&self, text: &str, attempt: u32) -> Result<()> {
        self.throttle.wait().await;
        tracing::debug!(chat = %self.chat_id, attempt, chars = text.chars().count(), "Sending message");

        let request = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        // Errors are stripped of their URL: it contains the bot token
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::publish(format!("request failed: {}", e.without_url()), true))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::publish(format!("failed to read response: {}", e.without_url()), true)
        })?;
        let parsed = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body).ok();

        classify_response(status, parsed)
    }

    /// Verify the token by asking the API who the bot is
    pub async fn get_me(&self) -> Result<BotInfo> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;

        let status = response.status();
        let parsed: ApiResponse<BotInfo> = response
            .json()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;

        match parsed.result {
            Some(info) if parsed.ok => Ok(info),
            _ => Err(Error::publish(
                parsed
                    .description
                    .unwrap_or_else(|| format!("getMe failed with HTTP {}", status)),
                false,
            )),
        }
    }
}

/// Map a Bot API reply onto the publish error taxonomy:
/// 429 and 5xx are transient (429 carries `retry_after`), any other
/// rejection is permanent.
fn classify_response(status: StatusCode, parsed: Option<ApiResponse<serde_json::Value>>) -> Result<()> {
    let (ok, description, retry_after) = match parsed {
        Some(reply) => (
            reply.ok,
            reply.description,
            reply.parameters.and_then(|p| p.retry_after),
        ),
        None => (false, None, None),
    };

    if status.is_success() && ok {
        return Ok(());
    }

    let message = description.unwrap_or_else(|| {
        if status.is_success() {
            "unreadable sendMessage response".to_string()
        } else {
            format!("HTTP {}", status)
        }
    });

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::Publish {
            message,
            transient: true,
            retry_after: retry_after.map(Duration::from_secs),
        });
    }

    Err(Error::publish(message, status.is_server_error()))
}

#[async_trait]
impl Publisher for TelegramPublisher {
    async fn publish(&self, text: &str) -> Result<()> {
        self.retry
            .run("telegram.sendMessage", move |attempt| async move {
                self.send_once(text, attempt).await
            })
            .await
    }
}
