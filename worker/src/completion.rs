use api::ChatMessage;
use async_trait::async_trait;

/// The external language-model call. Latency is unspecified (seconds);
/// the runner wraps every call in its execution time limit.
#[async_trait]
pub trait Completion {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

#[derive(serde::Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(serde::Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(serde::Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    pub fn new(endpoint: String, api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl Completion for CompletionClient {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let body: CompletionResponse = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("completion returned no choices"))
    }
}
