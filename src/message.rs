use serde::{Deserialize, Serialize};

/// A message in a model conversation, containing a role and text content.
///
/// Messages are the unit of prompt assembly throughout the pipeline: the
/// generation stage sends a single user message, while the fix and improve
/// stages replay prior attempts as alternating user/assistant turns.
///
/// # Examples
///
/// ```
/// use diaforge::message::Message;
///
/// let user_msg = Message::user("Generate a diagram for this data.");
/// let assistant_msg = Message::assistant("Here is the diagram: ...");
/// assert!(user_msg.has_role(Message::USER));
/// assert!(!user_msg.has_role(Message::ASSISTANT));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender (e.g., "user", "assistant").
    pub role: String,
    /// The text content of the message.
    pub content: String,
}

impl Message {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// AI assistant response message role.
    pub const ASSISTANT: &'static str = "assistant";

    /// Creates a new message with the specified role and content.
    #[must_use]
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }

    /// Creates a user message with the specified content.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an assistant message with the specified content.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convenience_constructors_set_role_and_content() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, Message::USER);
        assert_eq!(user_msg.content, "Hello");

        let assistant_msg = Message::assistant("Hi there!");
        assert_eq!(assistant_msg.role, Message::ASSISTANT);
        assert_eq!(assistant_msg.content, "Hi there!");
    }

    #[test]
    fn serializes_round_trip() {
        let original = Message::user("Test message");
        let json = serde_json::to_string(&original).expect("serialization failed");
        let parsed: Message = serde_json::from_str(&json).expect("deserialization failed");
        assert_eq!(original, parsed);
    }
}
