//! Groq client over the OpenAI-compatible chat-completions API.
//!
//! One client backs both collaborators: scene description (vision model, inline JPEG)
//! and conversation (chat model). API key: `NAVIA__SERVICES__GROQ_API_KEY` or `GROQ_API_KEY`.

use super::{check_status, http_client, trim_base};
use crate::collaborators::{ChatInferenceClient, ChatMessage, ChatRole, VisionInferenceClient};
use crate::config::ServicesConfig;
use crate::error::{NaviaError, NaviaResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const VISION_PROMPT: &str = "You are Navia, the safety layer of a walking aid for a blind or \
visually impaired pedestrian. Look at the camera frame and name the single most urgent obstacle \
in the walking path as a short, natural voice alert such as \"Car on your right\" or \"Stairs ahead\". \
Rules: at most six words; vehicles before stairs before people before static objects; only mention \
obstacles within about four meters; reply with plain text only, no JSON, no quotes. \
If the path is clear, reply with nothing.";

const MAX_ALERT_WORDS: usize = 6;

// OpenAI-compatible request/response
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct RequestMessage {
    role: ChatRole,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl From<&ChatMessage> for RequestMessage {
    fn from(m: &ChatMessage) -> Self {
        Self {
            role: m.role,
            content: MessageContent::Text(m.content.clone()),
        }
    }
}

pub struct GroqClient {
    api_key: String,
    base_url: String,
    vision_model: String,
    chat_model: String,
    client: reqwest::Client,
}

impl GroqClient {
    /// Build from config. `NotConfigured` when no API key is available.
    pub fn from_config(config: &ServicesConfig) -> NaviaResult<Self> {
        let api_key = config
            .api_key()
            .ok_or_else(|| NaviaError::NotConfigured("Groq API key".into()))?;
        Ok(Self {
            api_key,
            base_url: trim_base(&config.groq_base_url).to_string(),
            vision_model: config.vision_model.clone(),
            chat_model: config.chat_model.clone(),
            client: http_client(config),
        })
    }

    async fn complete_raw(&self, request: &CompletionRequest<'_>) -> NaviaResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let res = check_status(res).await.inspect_err(|e| {
            warn!(target: "navia::services", model = request.model, error = %e, "completion rejected");
        })?;
        let parsed: CompletionResponse = res.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

/// Trim whitespace, wrapping quotes and a trailing period; cap the word count.
fn tidy_alert(raw: &str) -> String {
    let text = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim()
        .trim_end_matches('.');
    text.split_whitespace()
        .take(MAX_ALERT_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

fn image_data_url(image: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(image))
}

#[async_trait]
impl VisionInferenceClient for GroqClient {
    async fn describe_scene(&self, image: &[u8]) -> NaviaResult<String> {
        let request = CompletionRequest {
            model: &self.vision_model,
            messages: vec![RequestMessage {
                role: ChatRole::User,
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: VISION_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_url(image),
                        },
                    },
                ]),
            }],
            temperature: Some(0.2),
            max_tokens: Some(24),
        };
        let raw = self.complete_raw(&request).await?;
        let alert = tidy_alert(&raw);
        debug!(target: "navia::services", bytes = image.len(), alert = %alert, "scene described");
        Ok(alert)
    }
}

#[async_trait]
impl ChatInferenceClient for GroqClient {
    async fn complete(&self, messages: &[ChatMessage]) -> NaviaResult<String> {
        let request = CompletionRequest {
            model: &self.chat_model,
            messages: messages.iter().map(RequestMessage::from).collect(),
            temperature: Some(0.7),
            max_tokens: Some(150),
        };
        self.complete_raw(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_key_builds_client() {
        let config = ServicesConfig {
            groq_api_key: Some(" gsk-test ".into()),
            groq_base_url: "https://api.groq.com/openai/v1/".into(),
            ..ServicesConfig::default()
        };
        let client = GroqClient::from_config(&config).unwrap();
        assert_eq!(client.api_key, "gsk-test");
        assert_eq!(client.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(client.chat_model, "llama-3.1-8b-instant");
    }

    #[test]
    fn vision_request_inlines_jpeg() {
        let request = CompletionRequest {
            model: "m",
            messages: vec![RequestMessage {
                role: ChatRole::User,
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: "describe".into() },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_data_url(&[0xff, 0xd8, 0xff]) },
                    },
                ]),
            }],
            temperature: None,
            max_tokens: Some(24),
        };
        let json = serde_json::to_value(&request).unwrap();
        let parts = &json["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,/9j/");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn chat_messages_serialize_as_plain_strings() {
        let msg = RequestMessage::from(&ChatMessage::assistant("hi"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn alerts_are_tidied() {
        assert_eq!(tidy_alert("  \"Car on your right.\"  "), "Car on your right");
        assert_eq!(
            tidy_alert("Person standing directly ahead of you near the door"),
            "Person standing directly ahead of you"
        );
        assert_eq!(tidy_alert("   "), "");
    }

    #[test]
    fn response_without_content_is_empty() {
        let parsed: CompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
