pub mod chat;
pub mod study;

use poem::{middleware::Cors, Endpoint, EndpointExt, Route};
use poem_openapi::{payload::Json, ApiResponse, OpenApi, OpenApiService, Tags};
use queue::{JobId, JobOutcome, JobQueue, QueueError, DEFAULT_CHANNEL};

use crate::{
    scoring,
    storage::{InsertOutcome, ParticipantRecord, Storage},
};

use self::{
    chat::{ChatAccepted, ChatRequest, CheckOk, CheckRequest, ErrorBody},
    study::{
        ParticipationRequest, ParticipationStatus, SaveAccepted, SaveDuplicate, SaveRequest,
    },
};

#[derive(Tags)]
enum ApiTags {
    /// Operations about chat jobs
    Chat,
    /// Operations about study records
    Study,
}

#[derive(ApiResponse)]
enum ChatResponse {
    #[oai(status = 202)]
    Accepted(Json<ChatAccepted>),
    #[oai(status = 500)]
    Error(Json<ErrorBody>),
}

#[derive(ApiResponse)]
enum CheckResponse {
    #[oai(status = 200)]
    Ok(Json<CheckOk>),
    #[oai(status = 500)]
    Error(Json<ErrorBody>),
}

#[derive(ApiResponse)]
enum SaveResponse {
    #[oai(status = 201)]
    Created(Json<SaveAccepted>),
    #[oai(status = 409)]
    Duplicate(Json<SaveDuplicate>),
    #[oai(status = 500)]
    Error(Json<ErrorBody>),
}

#[derive(ApiResponse)]
enum ParticipationResponse {
    #[oai(status = 200)]
    Ok(Json<ParticipationStatus>),
    #[oai(status = 500)]
    Error(Json<ErrorBody>),
}

/// Study-level settings handed back to participants on save.
pub struct StudyConfig {
    pub completion_code: Option<String>,
    pub completion_url: Option<String>,
    pub right_choices: Vec<String>,
}

pub struct Api<Q, S> {
    queue: Q,
    storage: S,
    study: StudyConfig,
}

impl<Q, S> Api<Q, S> {
    pub fn new(queue: Q, storage: S, study: StudyConfig) -> Self {
        Self {
            queue,
            storage,
            study,
        }
    }
}

#[OpenApi]
impl<Q: JobQueue + Send + Sync + 'static, S: Storage + Send + Sync + 'static> Api<Q, S> {
    /// Submits the chat transcript for completion. Responds immediately
    /// with a job id; the completion itself runs on a worker.
    #[oai(tag = "ApiTags::Chat", path = "/chat", method = "post")]
    async fn chat(&self, req: Json<ChatRequest>) -> poem::Result<ChatResponse> {
        match self.queue.enqueue(DEFAULT_CHANNEL, req.0.messages).await {
            Ok(id) => Ok(ChatResponse::Accepted(Json(ChatAccepted {
                job_id: id.to_string(),
            }))),
            Err(e) => {
                tracing::error!("enqueue failed: {e}");
                Ok(ChatResponse::Error(Json(ErrorBody {
                    error: e.to_string(),
                })))
            }
        }
    }

    /// Polls a submitted job. Returns `{processing: true}` until the
    /// job reaches a terminal state, then exactly one of `{response}`
    /// or an error embedding the terminal status.
    #[oai(tag = "ApiTags::Chat", path = "/check_response", method = "post")]
    async fn check_response(&self, req: Json<CheckRequest>) -> poem::Result<CheckResponse> {
        let id = match JobId::try_from(req.0.job_id.as_str()) {
            Ok(id) => id,
            Err(e) => {
                return Ok(CheckResponse::Error(Json(ErrorBody {
                    error: format!("invalid job id: {e}"),
                })))
            }
        };
        match self.queue.fetch(&id).await {
            Ok(JobOutcome::Succeeded(response)) => Ok(CheckResponse::Ok(Json(CheckOk {
                response: Some(response),
                ..Default::default()
            }))),
            Ok(JobOutcome::Pending(_)) => Ok(CheckResponse::Ok(Json(CheckOk {
                processing: Some(true),
                ..Default::default()
            }))),
            Ok(JobOutcome::Failed { status, detail }) => {
                Ok(CheckResponse::Error(Json(ErrorBody {
                    error: format!("job ended {status}: {detail}"),
                })))
            }
            Err(e @ QueueError::NotFound(_)) => Ok(CheckResponse::Error(Json(ErrorBody {
                error: e.to_string(),
            }))),
            Err(e) => {
                tracing::error!("fetch failed: {e}");
                Ok(CheckResponse::Error(Json(ErrorBody {
                    error: e.to_string(),
                })))
            }
        }
    }

    /// Persists a participant's study results, scoring their answers.
    /// A second save for the same participant id is rejected.
    #[oai(tag = "ApiTags::Study", path = "/save", method = "post")]
    async fn save(&self, req: Json<SaveRequest>) -> poem::Result<SaveResponse> {
        let req = req.0;
        let (correct_answers, _) =
            scoring::evaluate_answers(&req.tasks, &self.study.right_choices);
        let total_questions = self.study.right_choices.len() as u64;
        let record = ParticipantRecord {
            participant_id: req.participant_id,
            messages: req.messages,
            tasks: req.tasks,
            condition: req.condition,
            correct_answers,
            total_questions,
            saved_at_unix: 0,
        }
        .saved_now();

        match self.storage.insert(record).await {
            Ok(InsertOutcome::Inserted) => Ok(SaveResponse::Created(Json(SaveAccepted {
                message: "OK".to_string(),
                completion_code: self.study.completion_code.clone(),
                completion_url: self.study.completion_url.clone(),
                correct_answers,
                total_questions,
            }))),
            Ok(InsertOutcome::Duplicate) => Ok(SaveResponse::Duplicate(Json(SaveDuplicate {
                message: "Record already exists".to_string(),
            }))),
            Err(e) => {
                tracing::error!("save failed: {e}");
                Ok(SaveResponse::Error(Json(ErrorBody {
                    error: e.to_string(),
                })))
            }
        }
    }

    /// Reports whether a participant id has already submitted results.
    #[oai(tag = "ApiTags::Study", path = "/check_participation", method = "post")]
    async fn check_participation(
        &self,
        req: Json<ParticipationRequest>,
    ) -> poem::Result<ParticipationResponse> {
        match self.storage.entry_exists(&req.0.id).await {
            Ok(participated) => Ok(ParticipationResponse::Ok(Json(ParticipationStatus {
                participated,
            }))),
            Err(e) => {
                tracing::error!("participation check failed: {e}");
                Ok(ParticipationResponse::Error(Json(ErrorBody {
                    error: e.to_string(),
                })))
            }
        }
    }
}

pub fn create_app<Q, S>(api: Api<Q, S>, front_origin: Option<String>) -> impl Endpoint
where
    Q: JobQueue + Send + Sync + 'static,
    S: Storage + Send + Sync + 'static,
{
    let api_service = OpenApiService::new(api, "Study Backend", "1.0").server("/");
    let doc = api_service.rapidoc();
    let spec = api_service.spec_endpoint();
    let cors = match front_origin {
        Some(origin) => Cors::new().allow_origin(origin),
        None => Cors::new(),
    };
    Route::new()
        .nest("/", api_service)
        .nest("/spec.json", spec)
        .nest("/doc", doc)
        .with(cors)
}

#[cfg(test)]
mod tests {
    use poem::{http::StatusCode, test::TestClient};
    use queue::{JobStatus, MemoryQueue, DEFAULT_CHANNELS};
    use serde_json::json;
    use tokio::runtime::Runtime;

    use super::*;
    use crate::storage::FileStorage;

    // Hands back the storage path too, so each test removes its file.
    fn test_app(queue: MemoryQueue) -> (impl Endpoint, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "study-app-test-{}-{}.json",
            std::process::id(),
            uuid_ish()
        ));
        let _ = std::fs::remove_file(&path);
        let storage = FileStorage::open(&path).unwrap();
        let api = Api::new(
            queue,
            storage,
            StudyConfig {
                completion_code: Some("CODE123".to_string()),
                completion_url: Some("https://study.example/done".to_string()),
                right_choices: vec!["A".to_string()],
            },
        );
        (create_app(api, None), path)
    }

    // Enough uniqueness for parallel test runs within one process.
    fn uuid_ish() -> u128 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }

    fn listened() -> Vec<String> {
        DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn chat_polling_protocol() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let queue = MemoryQueue::new();
            let (app, store) = test_app(queue.clone());
            let cli = TestClient::new(app);

            let resp = cli
                .post("/chat")
                .body_json(&json!({"messages": [{"role": "user", "content": "hi"}]}))
                .send()
                .await;
            resp.assert_status(StatusCode::ACCEPTED);
            let body = resp.json().await;
            let job_id = body.value().object().get("jobId").string().to_string();

            // Before any worker touched it: still processing.
            let resp = cli
                .post("/check_response")
                .body_json(&json!({ "jobId": job_id }))
                .send()
                .await;
            resp.assert_status_is_ok();
            let body = resp.json().await;
            assert!(body.value().object().get("processing").bool());

            // Stand in for the worker.
            let job = queue.dequeue(&listened()).await.unwrap();
            queue.complete(&job.id, "Hello!".to_string()).await.unwrap();

            let resp = cli
                .post("/check_response")
                .body_json(&json!({ "jobId": job_id }))
                .send()
                .await;
            resp.assert_status_is_ok();
            let body = resp.json().await;
            assert_eq!(body.value().object().get("response").string(), "Hello!");
            let _ = std::fs::remove_file(&store);
        });
    }

    #[test]
    fn failed_job_reports_terminal_status() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let queue = MemoryQueue::new();
            let (app, store) = test_app(queue.clone());
            let cli = TestClient::new(app);

            let resp = cli
                .post("/chat")
                .body_json(&json!({"messages": [{"role": "user", "content": "hi"}]}))
                .send()
                .await;
            let body = resp.json().await;
            let job_id = body.value().object().get("jobId").string().to_string();

            let job = queue.dequeue(&listened()).await.unwrap();
            queue
                .fail(&job.id, JobStatus::Failed, "completion error".to_string())
                .await
                .unwrap();

            let resp = cli
                .post("/check_response")
                .body_json(&json!({ "jobId": job_id }))
                .send()
                .await;
            resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
            let body = resp.json().await;
            let error = body.value().object().get("error").string().to_string();
            assert!(error.contains("failed"), "error was: {error}");
            let _ = std::fs::remove_file(&store);
        });
    }

    #[test]
    fn unknown_job_id_is_an_error() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let (app, store) = test_app(MemoryQueue::new());
            let cli = TestClient::new(app);
            let resp = cli
                .post("/check_response")
                .body_json(&json!({"jobId": "not-a-job"}))
                .send()
                .await;
            resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
            let _ = std::fs::remove_file(&store);
        });
    }

    #[test]
    fn save_scores_and_rejects_duplicates() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let (app, store) = test_app(MemoryQueue::new());
            let cli = TestClient::new(app);
            let body = json!({
                "participantId": "p1",
                "messages": [],
                "tasks": {"5": {"responses": {"5.1": "A"}}},
                "condition": "treatment",
            });

            let resp = cli.post("/save").body_json(&body).send().await;
            resp.assert_status(StatusCode::CREATED);
            let saved = resp.json().await;
            let saved = saved.value().object();
            assert_eq!(saved.get("correctAnswers").i64(), 1);
            assert_eq!(saved.get("totalQuestions").i64(), 1);
            assert_eq!(saved.get("completionCode").string(), "CODE123");

            let resp = cli.post("/save").body_json(&body).send().await;
            resp.assert_status(StatusCode::CONFLICT);

            let resp = cli
                .post("/check_participation")
                .body_json(&json!({"id": "p1"}))
                .send()
                .await;
            resp.assert_status_is_ok();
            let body = resp.json().await;
            assert!(body.value().object().get("participated").bool());
            let _ = std::fs::remove_file(&store);
        });
    }
}
