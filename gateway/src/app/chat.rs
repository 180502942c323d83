use api::ChatMessage;
use poem_openapi::Object;

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct ChatAccepted {
    /// Id to poll `/check_response` with.
    pub job_id: String,
}

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct CheckRequest {
    pub job_id: String,
}

/// Poll result: exactly one of the fields is present.
#[derive(Object, Debug, Default)]
#[oai(rename_all = "camelCase")]
pub struct CheckOk {
    /// Completion text, once the job finished.
    #[oai(skip_serializing_if_is_none)]
    pub response: Option<String>,
    /// Set while the job is still queued or running.
    #[oai(skip_serializing_if_is_none)]
    pub processing: Option<bool>,
}

#[derive(Object, Debug)]
pub struct ErrorBody {
    pub error: String,
}
