//! Anthropic messages adapter (streaming, with inline image support).

use futures_util::{StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ChatRequest, ProviderError, TokenStream, sse};
use crate::message::Message;
use crate::model::ProviderFamily;

const FAMILY: ProviderFamily = ProviderFamily::Anthropic;
const API_VERSION: &str = "2023-06-01";

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<EventDelta>,
    error: Option<EventError>,
}

#[derive(Deserialize)]
struct EventDelta {
    text: Option<String>,
}

#[derive(Deserialize)]
struct EventError {
    message: String,
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
    let messages: Vec<Value> = request
        .messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            // The image, when present, rides on the final user turn.
            match (&request.image, last_user == Some(i)) {
                (Some(image), true) => json!({
                    "role": message.role,
                    "content": [
                        {"type": "text", "text": message.content},
                        {"type": "image", "source": {
                            "type": "base64",
                            "media_type": image.media_type,
                            "data": image.base64_data,
                        }},
                    ],
                }),
                _ => json!({"role": message.role, "content": message.content}),
            }
        })
        .collect();

    let mut payload = json!({
        "model": request.model.name(),
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "stream": true,
    });
    if let Some(system) = request.system.as_deref() {
        payload["system"] = Value::String(system.to_string());
    }

    let response = http
        .post(format!("{base_url}/messages"))
        .header("x-api-key", api_key)
        .header("anthropic-version", API_VERSION)
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

    let stream = sse::data_lines(response.bytes_stream())
        .try_filter_map(|payload| async move {
            let event: StreamEvent =
                serde_json::from_str(&payload).map_err(|e| ProviderError::Decode {
                    message: format!("anthropic stream event: {e}"),
                })?;
            match event.kind.as_str() {
                "content_block_delta" => Ok(event.delta.and_then(|d| d.text)),
                "error" => Err(ProviderError::Stream {
                    message: event
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "unspecified stream error".to_string()),
                }),
                _ => Ok(None),
            }
        })
        .boxed();
    Ok(stream)
}
