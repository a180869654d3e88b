//! Upstream LLM provider (spec §4.5 "upstream stream", §6 upstream contract).
//!
//! Consumed purely as an HTTP dependency: Gemini's `generateContent` /
//! `streamGenerateContent`, or an OpenAI-compatible chat-completions
//! endpoint. A streaming call yields a lazy sequence of [`UpstreamEvent`]s
//! over an `mpsc` channel rather than a promise/callback triple, per the
//! redesign note in spec §9.

use tokio::sync::mpsc;

use crate::error::{AthenaeumError, Result};

/// One item of an upstream streaming response.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    /// Final-content token, forwarded and accumulated.
    Token(String),
    /// Internal-reasoning token, discarded by the broker (spec §4.5 thought filtering).
    Thought(String),
    /// Upstream completed normally.
    Done,
    /// Upstream failed; forwarded to the client as `event: error`.
    Error(String),
}

/// An upstream LLM/embedding provider.
#[async_trait::async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Single-shot completion; returns the full answer text.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Streaming completion; events arrive on the returned receiver in
    /// upstream order, terminated by exactly one `Done` or `Error`.
    async fn generate_stream(&self, prompt: &str) -> Result<mpsc::Receiver<UpstreamEvent>>;
}

fn parts_from_gemini_response(value: &serde_json::Value) -> Vec<(String, bool)> {
    value["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| {
                    let text = p["text"].as_str()?.to_string();
                    let is_thought = p["thought"].as_bool().unwrap_or(false);
                    Some((text, is_thought))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Gemini `generateContent` / `streamGenerateContent`.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        })
    }
}

#[async_trait::async_trait]
impl UpstreamProvider for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            return Err(AthenaeumError::RateLimited(1));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AthenaeumError::Upstream(format!("Gemini error {status}: {body}")));
        }

        let data: serde_json::Value = response.json().await?;
        let text = parts_from_gemini_response(&data)
            .into_iter()
            .filter(|(_, thought)| !thought)
            .map(|(text, _)| text)
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<mpsc::Receiver<UpstreamEvent>> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.model, self.api_key
        );
        let body = self.request_body(prompt);
        let client = self.client.clone();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let response = match client
                .post(&url)
                .json(&body)
                .timeout(std::time::Duration::from_secs(60))
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(UpstreamEvent::Error(e.to_string())).await;
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let _ = tx
                    .send(UpstreamEvent::Error(format!("Gemini stream error {status}: {body}")))
                    .await;
                return;
            }

            use futures::StreamExt;
            let mut byte_stream = response.bytes_stream();
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(UpstreamEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find("\n\n") {
                    let line = buf[..pos].to_string();
                    buf.drain(..pos + 2);
                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
                        continue;
                    };
                    for (text, is_thought) in parts_from_gemini_response(&value) {
                        let event = if is_thought {
                            UpstreamEvent::Thought(text)
                        } else {
                            UpstreamEvent::Token(text)
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
            let _ = tx.send(UpstreamEvent::Done).await;
        });

        Ok(rx)
    }
}

/// OpenAI-compatible chat-completions endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl UpstreamProvider for OpenAiProvider {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            return Err(AthenaeumError::RateLimited(1));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AthenaeumError::Upstream(format!("OpenAI error {status}: {body}")));
        }

        let data: serde_json::Value = response.json().await?;
        Ok(data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn generate_stream(&self, prompt: &str) -> Result<mpsc::Receiver<UpstreamEvent>> {
        let url = format!("{}/chat/completions", self.base_url);
        let api_key = self.api_key.clone();
        let model = self.model.clone();
        let prompt = prompt.to_string();
        let client = self.client.clone();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let response = match client
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&serde_json::json!({
                    "model": model,
                    "stream": true,
                    "messages": [{ "role": "user", "content": prompt }],
                }))
                .timeout(std::time::Duration::from_secs(60))
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(UpstreamEvent::Error(e.to_string())).await;
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let _ = tx
                    .send(UpstreamEvent::Error(format!("OpenAI stream error {status}: {body}")))
                    .await;
                return;
            }

            use futures::StreamExt;
            let mut byte_stream = response.bytes_stream();
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(UpstreamEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].to_string();
                    buf.drain(..pos + 1);
                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if payload.trim() == "[DONE]" {
                        let _ = tx.send(UpstreamEvent::Done).await;
                        return;
                    }
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
                        continue;
                    };
                    if let Some(text) = value["choices"][0]["delta"]["content"].as_str() {
                        if tx.send(UpstreamEvent::Token(text.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
            }
            let _ = tx.send(UpstreamEvent::Done).await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_from_gemini_response_splits_thought_and_final() {
        let value = serde_json::json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "thinking...", "thought": true },
                    { "text": "final answer" }
                ]}
            }]
        });
        let parts = parts_from_gemini_response(&value);
        assert_eq!(parts, vec![
            ("thinking...".to_string(), true),
            ("final answer".to_string(), false),
        ]);
    }
}
