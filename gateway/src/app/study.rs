use std::collections::HashMap;

use api::ChatMessage;
use poem_openapi::Object;

/// Responses a participant gave for one study task, keyed by response
/// id (e.g. `"5.1"`). A value is either a raw choice string or an
/// object carrying an `answer` field.
#[derive(Object, Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct TaskRecord {
    #[oai(default)]
    #[serde(default)]
    pub responses: HashMap<String, serde_json::Value>,
}

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct SaveRequest {
    pub participant_id: String,
    pub messages: Vec<ChatMessage>,
    pub tasks: HashMap<String, TaskRecord>,
    /// Experimental condition label assigned to the participant.
    pub condition: String,
}

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct SaveAccepted {
    pub message: String,
    #[oai(skip_serializing_if_is_none)]
    pub completion_code: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub completion_url: Option<String>,
    pub correct_answers: u64,
    pub total_questions: u64,
}

#[derive(Object, Debug)]
pub struct SaveDuplicate {
    pub message: String,
}

#[derive(Object, Debug)]
pub struct ParticipationRequest {
    pub id: String,
}

#[derive(Object, Debug)]
pub struct ParticipationStatus {
    pub participated: bool,
}
