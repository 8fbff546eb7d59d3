//! Uniform streaming completion capability over the provider families.
//!
//! Every model call in the pipeline (generation, fixing, improving,
//! cleanup, and vision critique) goes through [`ModelClient::stream`].
//! The concrete [`ProviderClient`] dispatches on the [`ProviderFamily`]
//! already resolved inside the request's [`ModelId`]; no string sniffing
//! happens here. The returned [`TokenStream`] is finite and is always
//! drained to a complete string before the pipeline acts on it.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub(crate) mod sse;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use miette::Diagnostic;
use thiserror::Error;

use crate::message::Message;
use crate::model::{ModelId, ProviderFamily};

/// Lazy sequence of text chunks produced by a model call.
pub type TokenStream = BoxStream<'static, Result<String, ProviderError>>;

/// Errors arising from provider calls.
///
/// These propagate to the caller; only the critique stage retries them.
#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    #[error("missing credential for {family}: {var} is not set")]
    #[diagnostic(
        code(diaforge::provider::missing_credential),
        help("Export the variable or add it to a .env file before running.")
    )]
    MissingCredential {
        family: ProviderFamily,
        var: &'static str,
    },

    #[error("{model} cannot accept image input")]
    #[diagnostic(code(diaforge::provider::vision_unsupported))]
    VisionUnsupported { model: String },

    #[error("http error calling {family}: {message}")]
    #[diagnostic(code(diaforge::provider::http))]
    Http {
        family: ProviderFamily,
        message: String,
    },

    #[error("{family} returned {status}: {message}")]
    #[diagnostic(code(diaforge::provider::api))]
    Api {
        family: ProviderFamily,
        status: u16,
        message: String,
    },

    #[error("could not decode provider payload: {message}")]
    #[diagnostic(code(diaforge::provider::decode))]
    Decode { message: String },

    #[error("stream interrupted: {message}")]
    #[diagnostic(code(diaforge::provider::stream))]
    Stream { message: String },
}

/// Inline image carried on the final user turn of a vision request.
#[derive(Clone, Debug)]
pub struct ImageAttachment {
    pub media_type: &'static str,
    pub base64_data: String,
}

impl ImageAttachment {
    #[must_use]
    pub fn png(base64_data: String) -> Self {
        Self {
            media_type: "image/png",
            base64_data,
        }
    }
}

/// A single chat completion request.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub model: ModelId,
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub image: Option<ImageAttachment>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    #[must_use]
    pub fn new(model: ModelId, messages: Vec<Message>) -> Self {
        let max_tokens = model.default_max_tokens();
        Self {
            model,
            messages,
            system: None,
            image: None,
            temperature: 0.0,
            max_tokens,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Streaming completion capability shared by every stage.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Open a token stream for the given request.
    ///
    /// Setup problems (missing credential, unsupported image input) fail
    /// before any bytes are sent; wire and API failures surface either
    /// here or as stream items.
    async fn stream(&self, request: ChatRequest) -> Result<TokenStream, ProviderError>;
}

/// Base endpoints per provider family, overridable for tests.
#[derive(Clone, Debug)]
pub struct ProviderEndpoints {
    pub openai: String,
    pub anthropic: String,
    pub gemini: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com/v1".to_string(),
            anthropic: "https://api.anthropic.com/v1".to_string(),
            gemini: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

/// Concrete [`ModelClient`] dispatching to the three provider families.
pub struct ProviderClient {
    http: reqwest::Client,
    endpoints: ProviderEndpoints,
    openai_key: Option<String>,
    anthropic_key: Option<String>,
    gemini_key: Option<String>,
}

impl ProviderClient {
    /// Build a client with credentials read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints: ProviderEndpoints::default(),
            openai_key: std::env::var(ProviderFamily::OpenAi.credential_var()).ok(),
            anthropic_key: std::env::var(ProviderFamily::Anthropic.credential_var()).ok(),
            gemini_key: std::env::var(ProviderFamily::Gemini.credential_var()).ok(),
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Override one family's credential, bypassing the environment.
    #[must_use]
    pub fn with_key(mut self, family: ProviderFamily, key: impl Into<String>) -> Self {
        let key = Some(key.into());
        match family {
            ProviderFamily::OpenAi => self.openai_key = key,
            ProviderFamily::Anthropic => self.anthropic_key = key,
            ProviderFamily::Gemini => self.gemini_key = key,
        }
        self
    }

    fn key_for(&self, family: ProviderFamily) -> Result<&str, ProviderError> {
        let key = match family {
            ProviderFamily::OpenAi => self.openai_key.as_deref(),
            ProviderFamily::Anthropic => self.anthropic_key.as_deref(),
            ProviderFamily::Gemini => self.gemini_key.as_deref(),
        };
        key.ok_or(ProviderError::MissingCredential {
            family,
            var: family.credential_var(),
        })
    }
}

#[async_trait]
impl ModelClient for ProviderClient {
    async fn stream(&self, request: ChatRequest) -> Result<TokenStream, ProviderError> {
        let family = request.model.family();
        if request.image.is_some() && !family.supports_vision() {
            return Err(ProviderError::VisionUnsupported {
                model: request.model.name().to_string(),
            });
        }
        let key = self.key_for(family)?;
        match family {
            ProviderFamily::OpenAi => {
                openai::stream_chat(&self.http, &self.endpoints.openai, key, request).await
            }
            ProviderFamily::Anthropic => {
                anthropic::stream_chat(&self.http, &self.endpoints.anthropic, key, request).await
            }
            ProviderFamily::Gemini => {
                gemini::stream_chat(&self.http, &self.endpoints.gemini, key, request).await
            }
        }
    }
}

/// Pull a human-readable message out of an error body, which may or may
/// not be JSON depending on how far the request got.
pub(crate) fn api_error_message(body: &str) -> String {
    fn lookup<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
        let mut cursor = value;
        for key in path {
            cursor = cursor.get(key)?;
        }
        cursor.as_str()
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for path in [&["error", "message"][..], &["message"][..]] {
            if let Some(message) = lookup(&value, path) {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        trimmed.chars().take(500).collect()
    }
}

/// Fully drain a token stream into a single string, invoking `on_chunk`
/// for each piece as it arrives (progress display only).
pub async fn drain(
    mut stream: TokenStream,
    mut on_chunk: impl FnMut(&str) + Send,
) -> Result<String, ProviderError> {
    let mut full = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        on_chunk(&chunk);
        full.push_str(&chunk);
    }
    Ok(full)
}

/// Writes per-call prompt/response transcripts into a prompts directory.
///
/// Transcripts are advisory debugging artifacts: write failures are logged
/// and swallowed, never propagated.
#[derive(Clone, Debug)]
pub struct TranscriptWriter {
    dir: Option<PathBuf>,
}

impl TranscriptWriter {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Record the exact turns about to be sent, before streaming starts.
    pub fn record_prompt(&self, call_id: &str, request: &ChatRequest) {
        let Some(dir) = &self.dir else { return };
        let mut text = String::new();
        text.push_str(&format!(
            "MODEL: {}\nSYSTEM PROMPT:\n{}\n",
            request.model,
            request.system.as_deref().unwrap_or("(none)")
        ));
        for message in &request.messages {
            text.push_str(&format!(
                "\n===================================================\n{}:\n{}",
                message.role, message.content
            ));
        }
        if request.image.is_some() {
            text.push_str("\n[inline image attached to final user turn]");
        }
        Self::write(dir, &format!("prompt_{call_id}.txt"), &text);
    }

    /// Record the concatenated raw response after the stream is drained.
    pub fn record_response(&self, call_id: &str, response: &str) {
        let Some(dir) = &self.dir else { return };
        Self::write(dir, &format!("prompt_{call_id}_response.txt"), response);
    }

    fn write(dir: &Path, filename: &str, content: &str) {
        if let Err(e) = std::fs::create_dir_all(dir)
            .and_then(|_| std::fs::write(dir.join(filename), content))
        {
            tracing::warn!(file = %filename, error = %e, "failed to write prompt transcript");
        }
    }
}
