//! Gemini generateContent adapter.
//!
//! Gemini calls are made non-streaming and surfaced as a one-item
//! [`TokenStream`], so callers drain every family the same way.

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ChatRequest, ProviderError, TokenStream};
use crate::message::Message;
use crate::model::ProviderFamily;

const FAMILY: ProviderFamily = ProviderFamily::Gemini;

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

fn wire_role(role: &str) -> &'static str {
    if role == Message::ASSISTANT { "model" } else { "user" }
}

pub(crate) async fn stream_chat(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    request: ChatRequest,
) -> Result<TokenStream, ProviderError> {
    let last_user = request
        .messages
        .iter()
        .rposition(|m| m.has_role(Message::USER));
    let contents: Vec<Value> = request
        .messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let mut parts = vec![json!({"text": message.content})];
            if last_user == Some(i) {
                if let Some(image) = &request.image {
                    parts.push(json!({"inline_data": {
                        "mime_type": image.media_type,
                        "data": image.base64_data,
                    }}));
                }
            }
            json!({"role": wire_role(&message.role), "parts": parts})
        })
        .collect();

    let mut payload = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
        },
    });
    if let Some(system) = request.system.as_deref() {
        payload["systemInstruction"] = json!({"parts": [{"text": system}]});
    }

    let url = format!(
        "{base_url}/models/{}:generateContent?key={api_key}",
        request.model.name()
    );
    let response = http
        .post(url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| ProviderError::Http {
            family: FAMILY,
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            family: FAMILY,
            status: status.as_u16(),
            message: super::api_error_message(&body),
        });
    }

    let parsed: GenerateResponse = response.json().await.map_err(|e| ProviderError::Decode {
        message: format!("gemini response: {e}"),
    })?;
    let text: String = parsed
        .candidates
        .into_iter()
        .flatten()
        .filter_map(|c| c.content)
        .filter_map(|c| c.parts)
        .flatten()
        .filter_map(|p| p.text)
        .collect();
    Ok(futures_util::stream::once(async move { Ok(text) }).boxed())
}
