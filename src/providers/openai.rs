//! OpenAI chat-completions adapter (streaming).

use futures_util::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::{ChatRequest, ProviderError, TokenStream, sse};
use crate::model::ProviderFamily;

const FAMILY: ProviderFamily = ProviderFamily::OpenAi;

#[derive(Serialize)]
struct Payload<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

pub(crate) async fn stream_chat(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    request: ChatRequest,
) -> Result<TokenStream, ProviderError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.system.as_deref() {
        messages.push(WireMessage {
            role: "system",
            content: system,
        });
    }
    for message in &request.messages {
        messages.push(WireMessage {
            role: &message.role,
            content: &message.content,
        });
    }
    let payload = Payload {
        model: request.model.name(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: true,
    };

    let response = http
        .post(format!("{base_url}/chat/completions"))
        .bearer_auth(api_key)
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
        .try_take_while(|payload| futures_util::future::ready(Ok(payload != "[DONE]")))
        .try_filter_map(|payload| async move {
            let chunk: StreamChunk =
                serde_json::from_str(&payload).map_err(|e| ProviderError::Decode {
                    message: format!("openai stream chunk: {e}"),
                })?;
            Ok(chunk.choices.into_iter().next().and_then(|c| c.delta.content))
        })
        .boxed();
    Ok(stream)
}
