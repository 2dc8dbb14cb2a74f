//! # Selector Discovery via OpenAI
//!
//! This module asks a chat-completion model which CSS selectors describe the
//! reviews on a page. The model sees the raw page markup and answers with a
//! JSON object naming one selector per review field plus the pagination and
//! "read more" controls.
//!
//! ## Reply Handling
//!
//! Models wrap JSON in prose or code fences, so the reply is cut down to the
//! outermost `{ ... }` span before parsing. The object is then coerced into a
//! [`SelectorMap`]: unknown keys are ignored and non-string values become
//! `None`.
//!
//! ## Failure Policy
//!
//! Discovery never errors. A missing API key, a network or HTTP failure, or
//! an unparseable reply are logged and reported as `None`, which the crawler
//! treats as the end of pagination.
//!
//! ## Environment Configuration
//!
//! `OPENAI_API_KEY`, `OPENAI_MODEL` and `OPENAI_BASE_URL`, see [`crate::config`].

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::OpenAiConfig;
use crate::models::SelectorMap;
use crate::traits::SelectorOracle;

const SYSTEM_PROMPT: &str = "You are a web scraping assistant.";

const INSTRUCTIONS: &str = r#"You are a web-scraping assistant analyzing a product reviews page's HTML.

Task:
1. Identify the CSS selectors (class, id, or tag) for:
   - "review_container": The outer container for one review.
   - "title": The review title (if available).
   - "body": The main text of the review.
   - "rating": The star or numeric rating element.
   - "reviewer_name": The name/username of the reviewer.
   - "next_button": The clickable element that leads to the next page of reviews.
   - "read_more_button": The control inside a review that expands truncated text.

2. Important:
   - The same class or ID may be used for both "previous" and "next" buttons.
   - Only return the selector for the next button. If you cannot tell next from previous, set "next_button" to null.

3. Output requirements:
   - Return only valid JSON, no extra text or explanation.
   - The JSON must have exactly these keys: "review_container", "title", "body", "rating", "reviewer_name", "next_button", "read_more_button".
   - If you cannot find a valid selector for any of these, set it to null.
   - Do NOT use the sibling combinator '+' or '++'.

HTML content:
"#;

/// Chat-completions request body.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Selector oracle backed by the OpenAI chat-completions API.
///
/// Cheap to clone; the underlying `reqwest::Client` shares its connection pool.
#[derive(Debug, Clone)]
pub struct OpenAiOracle {
    client: Client,
    /// `None` disables discovery: every call logs a warning and returns `None`.
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl OpenAiOracle {
    /// Creates an oracle from configuration.
    ///
    /// The HTTP client carries a 60 second timeout, the only bound on how
    /// long a crawl can wait for discovery.
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        if config.api_key.is_none() {
            warn!("OPENAI_API_KEY not set - selector discovery will be disabled");
        }

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: format!(
                "{}/v1/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
        })
    }

    async fn request_selectors(&self, markup: &str) -> Result<SelectorMap> {
        let api_key = self
            .api_key
            .as_deref()
            .context("OPENAI_API_KEY is not set")?;

        let prompt = format!("{INSTRUCTIONS}{markup}");
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("OpenAI request failed: {}", response.status());
        }

        let body: ChatResponse = response.json().await?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("OpenAI response contained no message")?;

        debug!("Selector reply: {}", reply);
        parse_selector_reply(&reply)
    }
}

/// Pull the selector map out of a model reply.
pub fn parse_selector_reply(reply: &str) -> Result<SelectorMap> {
    let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) else {
        bail!("No JSON object found in reply");
    };
    if end < start {
        bail!("No JSON object found in reply");
    }

    let value: Value =
        serde_json::from_str(&reply[start..=end]).context("Reply JSON did not parse")?;
    SelectorMap::from_json(&value).context("Reply contained no usable selectors")
}

#[async_trait]
impl SelectorOracle for OpenAiOracle {
    async fn discover(&self, markup: &str) -> Option<SelectorMap> {
        match self.request_selectors(markup).await {
            Ok(selectors) => Some(selectors),
            Err(e) => {
                error!("Selector discovery failed: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn oracle(server: &MockServer, api_key: Option<&str>) -> OpenAiOracle {
        OpenAiOracle::new(&OpenAiConfig {
            api_key: api_key.map(str::to_string),
            model: "gpt-test".to_string(),
            base_url: server.uri(),
        })
        .unwrap()
    }

    fn completion(content: &str) -> Value {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let reply = "Sure! Here you go:\n```json\n{\"review_container\": \"div.review\", \"title\": null, \"next_button\": \"a.next\"}\n```";

        let map = parse_selector_reply(reply).unwrap();
        assert_eq!(map.review_container.as_deref(), Some("div.review"));
        assert_eq!(map.title, None);
        assert_eq!(map.next_button.as_deref(), Some("a.next"));
    }

    #[test]
    fn rejects_replies_without_usable_json() {
        assert!(parse_selector_reply("I could not find any reviews.").is_err());
        assert!(parse_selector_reply("} nothing {").is_err());
        assert!(parse_selector_reply("{not json}").is_err());
        assert!(parse_selector_reply(r#"{"title": null, "body": 3}"#).is_err());
    }

    #[tokio::test]
    async fn discovers_selectors_from_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"review_container": "li.review", "body": "p", "rating": 5}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let map = oracle(&server, Some("sk-test"))
            .discover("<ul><li class='review'><p>ok</p></li></ul>")
            .await
            .unwrap();

        assert_eq!(map.review_container.as_deref(), Some("li.review"));
        assert_eq!(map.body.as_deref(), Some("p"));
        assert_eq!(map.rating, None);
    }

    #[tokio::test]
    async fn http_failure_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        assert_eq!(oracle(&server, Some("sk-test")).discover("<html/>").await, None);
    }

    #[tokio::test]
    async fn missing_api_key_yields_none_without_calling_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{}")))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(oracle(&server, None).discover("<html/>").await, None);
    }
}
