// src/assistant.rs

use crate::config::{LlmBackend, LlmSection};
use crate::estimate::LineItem;
use crate::price_list::{PriceItem, filter_items};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Most price entries sent to the model in one filtering request.
const MAX_CANDIDATES: usize = 400;

/// Description text is clipped to this many characters inside prompts.
const MAX_DESCRIPTION_CHARS: usize = 160;

const FILTER_PROMPT: &str = r#"You help a quantity surveyor search a construction price list.
You receive a request in natural language (often Italian) and a list of
price entries, one per line, formatted as: CODE | DESCRIPTION | UNIT.

Return ONLY a JSON array with the codes of the entries that match the
request, best match first, e.g. ["A.01.001", "A.01.004"].
Return [] if nothing matches. No markdown fences, no commentary."#;

const DESCRIBE_PROMPT: &str = r#"You write line-item descriptions for Italian construction bills of
quantities (computo metrico estimativo). Given a short work item, write a
complete technical description: materials, execution, what is included,
unit of measure. Plain text, one paragraph, same language as the input,
no markdown, no prices."#;

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("AI assistant is disabled — set llm.backend to \"ollama\" or \"remote\"")]
    Disabled,

    #[error("LLM_API_KEY env var required for remote backend")]
    MissingApiKey,

    #[error("Ollama is not running at {0}. Start it with: ollama serve")]
    Unreachable(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Empty response from LLM")]
    EmptyResponse,

    #[error("Could not parse LLM response: {0}")]
    Parse(String),
}

/// Anything that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, AssistantError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Resolved endpoint configuration ready to make API calls.
#[derive(Debug, Clone)]
struct ResolvedEndpoint {
    base_url: String,
    model: String,
    api_key: String,
}

fn resolve_endpoint(llm: &LlmSection) -> Result<ResolvedEndpoint, AssistantError> {
    match llm.backend {
        LlmBackend::Ollama => {
            info!(
                url = %llm.ollama.base_url,
                model = %llm.ollama.model,
                "Using Ollama (local) backend"
            );
            Ok(ResolvedEndpoint {
                base_url: llm.ollama.base_url.trim_end_matches('/').to_string(),
                model: llm.ollama.model.clone(),
                api_key: "ollama".to_string(), // required by the API shape, ignored by Ollama
            })
        }
        LlmBackend::Remote => {
            let api_key = std::env::var("LLM_API_KEY").map_err(|_| AssistantError::MissingApiKey)?;
            info!(
                url = %llm.remote.base_url,
                model = %llm.remote.model,
                "Using remote API backend"
            );
            Ok(ResolvedEndpoint {
                base_url: llm.remote.base_url.trim_end_matches('/').to_string(),
                model: llm.remote.model.clone(),
                api_key,
            })
        }
        LlmBackend::Disabled => Err(AssistantError::Disabled),
    }
}

/// OpenAI-compatible `/chat/completions` client.
pub struct ChatClient {
    client: Client,
    endpoint: ResolvedEndpoint,
    backend: LlmBackend,
}

impl ChatClient {
    pub fn from_config(llm: &LlmSection) -> Result<Self, AssistantError> {
        let endpoint = resolve_endpoint(llm)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            backend: llm.backend,
        })
    }

    /// Build the client and, for a local backend, make sure the server answers.
    pub async fn connect(llm: &LlmSection) -> Result<Self, AssistantError> {
        let chat = Self::from_config(llm)?;
        if chat.backend == LlmBackend::Ollama && !chat.check_ollama_health().await {
            return Err(AssistantError::Unreachable(chat.endpoint.base_url.clone()));
        }
        Ok(chat)
    }

    async fn check_ollama_health(&self) -> bool {
        // Ollama's health endpoint is at the root (not under /v1)
        let health_url = self.endpoint.base_url.trim_end_matches("/v1");

        match self
            .client
            .get(health_url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!("Ollama server is reachable");
                true
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "Ollama server returned non-OK status");
                false
            }
            Err(e) => {
                warn!(error = %e, "Ollama server not reachable");
                false
            }
        }
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, AssistantError> {
        let request = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.endpoint.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Api { status, body });
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AssistantError::EmptyResponse)?;

        info!(model = %self.endpoint.model, chars = content.len(), "LLM response received");
        Ok(content)
    }
}

/// Drop reasoning blocks and markdown fences some models add despite instructions.
fn clean_response(raw: &str) -> &str {
    let s = match raw.rfind("</think>") {
        Some(pos) => &raw[pos + "</think>".len()..],
        None => raw,
    };
    let s = s.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}

/// Extract the outermost JSON array from a response that may carry
/// surrounding text.
fn extract_json_array(s: &str) -> Result<&str, AssistantError> {
    let s = clean_response(s);
    let start = s
        .find('[')
        .ok_or_else(|| AssistantError::Parse("No '[' found in LLM response".into()))?;
    let end = s
        .rfind(']')
        .ok_or_else(|| AssistantError::Parse("No ']' found in LLM response".into()))?;
    if end <= start {
        return Err(AssistantError::Parse("Malformed JSON in LLM response".into()));
    }
    Ok(&s[start..=end])
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Narrow very large lists before they go into a prompt: entries sharing
/// at least one word with the request come first.
fn candidates<'a>(query: &str, items: &'a [PriceItem]) -> Vec<&'a PriceItem> {
    if items.len() <= MAX_CANDIDATES {
        return items.iter().collect();
    }
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .collect();
    let (mut hits, rest): (Vec<&PriceItem>, Vec<&PriceItem>) = items.iter().partition(|item| {
        let text = item.description.to_lowercase();
        terms.iter().any(|t| text.contains(t.as_str()))
    });
    hits.extend(rest);
    hits.truncate(MAX_CANDIDATES);
    hits
}

fn filter_prompt(query: &str, items: &[&PriceItem]) -> String {
    let mut prompt = format!("Request: {query}\n\nPrice entries:\n");
    for item in items {
        prompt.push_str(&format!(
            "{} | {} | {}\n",
            item.code,
            clip(&item.description.replace('\n', " "), MAX_DESCRIPTION_CHARS),
            item.unit
        ));
    }
    prompt
}

/// Ask the model which entries match a natural-language request.
async fn filter_with_model<'a, G>(
    generator: &G,
    query: &str,
    items: &'a [PriceItem],
) -> Result<Vec<&'a PriceItem>, AssistantError>
where
    G: TextGenerator + ?Sized,
{
    let pool = candidates(query, items);
    let response = generator
        .generate(FILTER_PROMPT, &filter_prompt(query, &pool))
        .await?;
    let json = extract_json_array(&response)?;
    let codes: Vec<String> = serde_json::from_str(json)
        .map_err(|e| AssistantError::Parse(format!("{e}\nRaw: {json}")))?;

    // Only codes we actually sent, in the model's order, without repeats.
    let mut picked: Vec<&PriceItem> = Vec::new();
    for code in &codes {
        if let Some(item) = pool.iter().copied().find(|i| &i.code == code) {
            if !picked.iter().any(|p| p.code == item.code) {
                picked.push(item);
            }
        }
    }
    Ok(picked)
}

/// Natural-language filter over price entries. Any model failure falls
/// back to plain keyword matching.
pub async fn filter_price_items<'a, G>(
    generator: &G,
    query: &str,
    items: &'a [PriceItem],
) -> Vec<&'a PriceItem>
where
    G: TextGenerator + ?Sized,
{
    match filter_with_model(generator, query, items).await {
        Ok(picked) => {
            info!(query, matches = picked.len(), "AI filter result");
            picked
        }
        Err(e) => {
            warn!(error = %e, "AI filter failed — falling back to keyword search");
            filter_items(items, query)
        }
    }
}

/// Generate a full technical description for a line item.
pub async fn describe_item<G>(generator: &G, item: &LineItem) -> Result<String, AssistantError>
where
    G: TextGenerator + ?Sized,
{
    let prompt = format!(
        "Code: {}\nUnit: {}\nShort description: {}",
        item.code, item.unit, item.description
    );
    let response = generator.generate(DESCRIBE_PROMPT, &prompt).await?;
    let text = clean_response(&response);
    if text.is_empty() {
        return Err(AssistantError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays a canned answer and remembers the prompt it was given.
    struct Canned {
        answer: Result<String, ()>,
        seen: Mutex<Vec<String>>,
    }

    impl Canned {
        fn ok(answer: &str) -> Self {
            Self {
                answer: Ok(answer.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                answer: Err(()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String, AssistantError> {
            self.seen.lock().unwrap().push(prompt.to_string());
            self.answer.clone().map_err(|_| AssistantError::EmptyResponse)
        }
    }

    fn items() -> Vec<PriceItem> {
        ["Intonaco civile per interni", "Intonaco per esterni", "Massetto"]
            .iter()
            .enumerate()
            .map(|(i, d)| PriceItem {
                code: format!("A.0{}", i + 1),
                description: d.to_string(),
                unit: "mq".into(),
                unit_price: Some(10.0),
                chapter: None,
            })
            .collect()
    }

    #[test]
    fn test_extract_json_array_variants() {
        assert_eq!(extract_json_array(r#"["A"]"#).unwrap(), r#"["A"]"#);
        assert_eq!(
            extract_json_array("```json\n[\"A\", \"B\"]\n```").unwrap(),
            r#"["A", "B"]"#
        );
        assert_eq!(
            extract_json_array("<think>maybe [x]?</think>\nHere: [\"C\"]").unwrap(),
            r#"["C"]"#
        );
        assert!(extract_json_array("nothing here").is_err());
        assert!(extract_json_array("] backwards [").is_err());
    }

    #[test]
    fn test_clip_counts_chars() {
        assert_eq!(clip("àèìòù", 3), "àèì…");
        assert_eq!(clip("short", 10), "short");
    }

    #[test]
    fn test_disabled_backend() {
        let llm = LlmSection::default();
        assert!(matches!(
            ChatClient::from_config(&llm),
            Err(AssistantError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_filter_keeps_model_order_and_drops_unknown() {
        let list = items();
        let generator = Canned::ok(r#"["A.02", "ZZZ", "A.01", "A.02"]"#);
        let picked = filter_price_items(&generator, "intonaci", &list).await;
        let codes: Vec<&str> = picked.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["A.02", "A.01"]);

        let prompt = &generator.seen.lock().unwrap()[0];
        assert!(prompt.starts_with("Request: intonaci"));
        assert!(prompt.contains("A.03 | Massetto | mq"));
    }

    #[tokio::test]
    async fn test_filter_falls_back_to_keywords() {
        let list = items();
        let picked = filter_price_items(&Canned::failing(), "interni", &list).await;
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].code, "A.01");

        let picked = filter_price_items(&Canned::ok("I think none."), "massetto", &list).await;
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].code, "A.03");
    }

    #[tokio::test]
    async fn test_describe_item_cleans_output() {
        let item = LineItem {
            code: "B.01".into(),
            description: "Tramezzo in laterizio".into(),
            unit: "mq".into(),
            ..LineItem::default()
        };
        let generator = Canned::ok("<think>ok</think>\n```\nTramezzo in laterizio forato da 8 cm.\n```");
        let text = describe_item(&generator, &item).await.unwrap();
        assert_eq!(text, "Tramezzo in laterizio forato da 8 cm.");
        assert!(generator.seen.lock().unwrap()[0].contains("Code: B.01"));

        assert!(describe_item(&Canned::ok("   "), &item).await.is_err());
    }

    #[test]
    fn test_candidates_prefer_matching_entries() {
        let mut list: Vec<PriceItem> = (0..MAX_CANDIDATES + 10)
            .map(|i| PriceItem {
                code: format!("X{i}"),
                description: "filler".into(),
                unit: String::new(),
                unit_price: None,
                chapter: None,
            })
            .collect();
        list.push(PriceItem {
            code: "LAST".into(),
            description: "Pavimento in gres".into(),
            unit: "mq".into(),
            unit_price: Some(30.0),
            chapter: None,
        });
        let pool = candidates("pavimento gres", &list);
        assert_eq!(pool.len(), MAX_CANDIDATES);
        assert_eq!(pool[0].code, "LAST");
    }
}
