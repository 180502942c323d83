use poem_openapi::Object;

/// One message of a chat transcript. The queue and the worker treat the
/// content as opaque; only the completion service interprets it.
#[derive(Object, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[oai(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message author, e.g. `system`, `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}
