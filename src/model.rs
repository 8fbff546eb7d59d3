//! Model identifiers and provider family resolution.
//!
//! A model is selected by a single identifier string (e.g.
//! `claude-3-5-sonnet-20240620`, `gpt-4o`, `gemini-1.5-pro-002`). The
//! provider family is derived from the identifier's prefix exactly once,
//! when a [`ModelId`] is parsed at configuration time; the rest of the
//! pipeline dispatches on the resulting closed enum and never re-inspects
//! the string.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of provider families the model adapter can talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderFamily {
    /// OpenAI chat-completions API (`gpt-*` models).
    OpenAi,
    /// Anthropic messages API (`claude-*` models).
    Anthropic,
    /// Google Gemini generateContent API (`gemini-*` models).
    Gemini,
}

impl ProviderFamily {
    /// Environment variable holding this family's API credential.
    #[must_use]
    pub fn credential_var(&self) -> &'static str {
        match self {
            ProviderFamily::OpenAi => "OPENAI_API_KEY",
            ProviderFamily::Anthropic => "ANTHROPIC_API_KEY",
            ProviderFamily::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Whether this family's chat endpoint accepts inline images.
    #[must_use]
    pub fn supports_vision(&self) -> bool {
        matches!(self, ProviderFamily::Anthropic | ProviderFamily::Gemini)
    }
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProviderFamily::OpenAi => "openai",
            ProviderFamily::Anthropic => "anthropic",
            ProviderFamily::Gemini => "gemini",
        };
        write!(f, "{label}")
    }
}

/// Error raised when a model identifier does not match any known family.
#[derive(Debug, Error, Diagnostic)]
#[error("unsupported model: {name}")]
#[diagnostic(
    code(diaforge::model::unsupported),
    help("Known prefixes are gpt- (OpenAI), claude- (Anthropic), gemini- (Gemini).")
)]
pub struct UnsupportedModel {
    pub name: String,
}

/// A validated model identifier with its resolved provider family.
///
/// Serializes as the bare identifier string so run logs stay stable and
/// readable; deserialization re-runs prefix resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId {
    name: String,
    family: ProviderFamily,
}

impl ModelId {
    /// Parse a model identifier, resolving its provider family by prefix.
    pub fn parse(name: &str) -> Result<Self, UnsupportedModel> {
        let family = if name.starts_with("gpt-") {
            ProviderFamily::OpenAi
        } else if name.starts_with("claude-") {
            ProviderFamily::Anthropic
        } else if name.starts_with("gemini-") {
            ProviderFamily::Gemini
        } else {
            return Err(UnsupportedModel {
                name: name.to_string(),
            });
        };
        Ok(Self {
            name: name.to_string(),
            family,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn family(&self) -> ProviderFamily {
        self.family
    }

    /// Default completion-token ceiling for this model.
    ///
    /// Older Anthropic models cap at 4096; everything else gets 8192.
    #[must_use]
    pub fn default_max_tokens(&self) -> u32 {
        match self.family {
            ProviderFamily::Anthropic if !self.name.contains("3-5-sonnet") => 4096,
            _ => 8192,
        }
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl TryFrom<String> for ModelId {
    type Error = UnsupportedModel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ModelId::parse(&value)
    }
}

impl From<ModelId> for String {
    fn from(value: ModelId) -> Self {
        value.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_each_known_prefix() {
        assert_eq!(
            ModelId::parse("gpt-4o").unwrap().family(),
            ProviderFamily::OpenAi
        );
        assert_eq!(
            ModelId::parse("claude-3-haiku-20240307").unwrap().family(),
            ProviderFamily::Anthropic
        );
        assert_eq!(
            ModelId::parse("gemini-1.5-flash-8b").unwrap().family(),
            ProviderFamily::Gemini
        );
    }

    #[test]
    fn rejects_unknown_prefix() {
        let err = ModelId::parse("llama-3-70b").unwrap_err();
        assert!(err.to_string().contains("llama-3-70b"));
    }

    #[test]
    fn max_tokens_depends_on_model() {
        let sonnet = ModelId::parse("claude-3-5-sonnet-20240620").unwrap();
        let haiku = ModelId::parse("claude-3-haiku-20240307").unwrap();
        let gpt = ModelId::parse("gpt-4o-mini").unwrap();
        assert_eq!(sonnet.default_max_tokens(), 8192);
        assert_eq!(haiku.default_max_tokens(), 4096);
        assert_eq!(gpt.default_max_tokens(), 8192);
    }

    #[test]
    fn serde_round_trips_as_string() {
        let id = ModelId::parse("gemini-1.5-pro-002").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"gemini-1.5-pro-002\"");
        let back: ModelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn unknown_model_fails_deserialization() {
        let result: Result<ModelId, _> = serde_json::from_str("\"mystery-9000\"");
        assert!(result.is_err());
    }
}
