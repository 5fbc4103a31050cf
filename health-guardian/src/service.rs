use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    config::GuardianConfig,
    error::{GuardianError, ModelError},
    gemini::{ChatModel, ContentGenerator, GeminiClient, RigChatModel},
    intake::{DocumentInput, ImagePayload},
    models::{AnalysisResult, CarePlan, ChatMessage, View},
    report::{render_analysis, render_care_plan},
    tasks::{analyze_document, generate_care_plan, send_message},
    workspace::{CarePlanView, ChatView, ViewSnapshot, Workspace},
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

fn api_error(err: GuardianError) -> ApiError {
    let status = match &err {
        GuardianError::MissingInput(_) | GuardianError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        GuardianError::Busy(_) => StatusCode::CONFLICT,
        GuardianError::NotFound(_) => StatusCode::NOT_FOUND,
        GuardianError::Analysis(_) | GuardianError::CarePlan(_) | GuardianError::Chat(_) => {
            StatusCode::BAD_GATEWAY
        }
        GuardianError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeDocumentRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<ImagePayload>,
}

#[derive(Debug, Deserialize)]
pub struct SelectViewRequest {
    pub view: View,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatTurnResponse {
    pub reply: ChatMessage,
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone)]
pub struct AppState {
    pub workspace: Arc<Mutex<Workspace>>,
    pub generator: Arc<dyn ContentGenerator>,
    pub chat_model: Arc<dyn ChatModel>,
    pub analysis_model: String,
    pub care_plan_model: String,
}

impl AppState {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        chat_model: Arc<dyn ChatModel>,
        analysis_model: impl Into<String>,
        care_plan_model: impl Into<String>,
    ) -> Self {
        Self {
            workspace: Arc::new(Mutex::new(Workspace::new())),
            generator,
            chat_model,
            analysis_model: analysis_model.into(),
            care_plan_model: care_plan_model.into(),
        }
    }
}

pub fn create_app(config: &GuardianConfig) -> Result<Router, ModelError> {
    let generator = Arc::new(GeminiClient::new(config)?);
    let chat_model = Arc::new(RigChatModel::new(config)?);

    let state = AppState::new(
        generator,
        chat_model,
        config.analysis_model.clone(),
        config.care_plan_model.clone(),
    );
    Ok(build_router(state))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/view", get(get_view).put(select_view))
        .route("/documents/analyze", post(analyze_submission))
        .route("/documents/upload", post(upload_document))
        .route("/analysis", get(get_analysis))
        .route("/analysis/report", get(get_analysis_report))
        .route("/chat", get(get_chat))
        .route("/chat/messages", post(post_chat_message))
        .route("/care-plan", get(get_care_plan).post(create_care_plan))
        .route("/care-plan/report", get(get_care_plan_report))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Health Guardian",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Plain-language interpretation of medical documents, with a grounded chat and generated care plans",
        "endpoints": {
            "GET /view": "Snapshot of the active view",
            "PUT /view": "Switch between dashboard, chat and care-plan",
            "POST /documents/analyze": "Analyze pasted text or an inline base64 image",
            "POST /documents/upload": "Analyze an uploaded text or image body",
            "GET /analysis": "Current analysis",
            "GET /analysis/report": "Current analysis as a plain-text report",
            "GET /chat": "Chat messages",
            "POST /chat/messages": "Send a chat message",
            "GET /care-plan": "Care plan state",
            "POST /care-plan": "Generate a care plan from the current analysis",
            "GET /care-plan/report": "Care plan as a plain-text report",
            "GET /health": "Health check"
        },
        "disclaimer": crate::report::DISCLAIMER
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_view(State(state): State<AppState>) -> Json<ViewSnapshot> {
    Json(state.workspace.lock().await.snapshot().await)
}

async fn select_view(
    State(state): State<AppState>,
    Json(request): Json<SelectViewRequest>,
) -> Json<ViewSnapshot> {
    let mut workspace = state.workspace.lock().await;
    workspace.select(request.view);
    Json(workspace.snapshot().await)
}

async fn analyze_submission(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeDocumentRequest>,
) -> ApiResult<AnalysisResult> {
    let input = match DocumentInput::from_parts(request.text, request.image) {
        Ok(input) => input,
        Err(e) => return Err(reject_submission(&state, e).await),
    };
    run_analysis(state, input).await
}

async fn upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<AnalysisResult> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    info!(content_type = ?content_type, size = body.len(), "Received document upload");

    let input = match DocumentInput::from_bytes(body.to_vec(), content_type) {
        Ok(input) => input,
        Err(e) => return Err(reject_submission(&state, e).await),
    };
    run_analysis(state, input).await
}

/// Local validation failures are shown on the dashboard like any other error.
async fn reject_submission(state: &AppState, err: GuardianError) -> ApiError {
    info!(error = %err, "Rejected document submission");
    state.workspace.lock().await.fail_analysis(err.to_string());
    api_error(err)
}

async fn run_analysis(state: AppState, input: DocumentInput) -> ApiResult<AnalysisResult> {
    let guard = {
        let mut workspace = state.workspace.lock().await;
        let guard = workspace.begin_analysis().map_err(api_error)?;
        workspace.clear_analysis_error();
        guard
    };

    let workspace = state.workspace.clone();
    let generator = state.generator.clone();
    let model = state.analysis_model.clone();

    // Runs to completion even if the client goes away, so the loading flag and
    // the stored analysis stay consistent.
    let task = tokio::spawn(async move {
        let result = analyze_document(&*generator, &model, &input).await;
        let mut workspace = workspace.lock().await;
        let outcome = match result {
            Ok(analysis) => Ok(workspace.complete_analysis(analysis)),
            Err(e) => {
                workspace.fail_analysis(e.to_string());
                Err(e)
            }
        };
        drop(guard);
        outcome
    });

    match task.await {
        Ok(Ok(analysis)) => Ok(Json(AnalysisResult::clone(&analysis))),
        Ok(Err(e)) => Err(api_error(e)),
        Err(e) => {
            error!("Analysis task aborted: {}", e);
            Err(internal_error("Analysis task aborted", &e.to_string()))
        }
    }
}

async fn get_analysis(State(state): State<AppState>) -> ApiResult<AnalysisResult> {
    let workspace = state.workspace.lock().await;
    workspace
        .analysis()
        .map(|analysis| Json(AnalysisResult::clone(analysis)))
        .ok_or_else(|| api_error(no_analysis()))
}

async fn get_analysis_report(
    State(state): State<AppState>,
) -> Result<String, (StatusCode, Json<Value>)> {
    let workspace = state.workspace.lock().await;
    workspace
        .analysis()
        .map(|analysis| render_analysis(analysis))
        .ok_or_else(|| api_error(no_analysis()))
}

fn no_analysis() -> GuardianError {
    GuardianError::NotFound("No document has been analyzed yet.".to_string())
}

async fn get_chat(State(state): State<AppState>) -> Json<ChatView> {
    Json(state.workspace.lock().await.chat_view().await)
}

async fn post_chat_message(
    State(state): State<AppState>,
    Json(request): Json<ChatMessageRequest>,
) -> ApiResult<ChatTurnResponse> {
    let handle = state.workspace.lock().await.chat_handle();
    let model = state.chat_model.clone();
    let session = handle.clone();

    let task =
        tokio::spawn(async move { send_message(&session, &*model, &request.message).await });

    let reply = match task.await {
        Ok(result) => result.map_err(api_error)?,
        Err(e) => {
            error!("Chat task aborted: {}", e);
            return Err(internal_error("Chat task aborted", &e.to_string()));
        }
    };

    let messages = handle.lock().await.messages().to_vec();
    Ok(Json(ChatTurnResponse { reply, messages }))
}

async fn get_care_plan(State(state): State<AppState>) -> Json<CarePlanView> {
    Json(state.workspace.lock().await.care_plan_view())
}

async fn create_care_plan(State(state): State<AppState>) -> ApiResult<CarePlan> {
    let (context, guard) = state
        .workspace
        .lock()
        .await
        .begin_care_plan()
        .map_err(api_error)?;

    info!(
        findings = context.analysis().key_findings.len(),
        "Care plan generation requested"
    );

    let workspace = state.workspace.clone();
    let generator = state.generator.clone();
    let model = state.care_plan_model.clone();

    let task = tokio::spawn(async move {
        let result = match context.request() {
            Ok(request) => generate_care_plan(&*generator, &model, request).await,
            Err(e) => Err(e),
        };
        let mut workspace = workspace.lock().await;
        let outcome = match result {
            Ok(plan) => {
                workspace.complete_care_plan(&context, plan.clone());
                Ok(plan)
            }
            Err(e) => {
                workspace.fail_care_plan(&context, e.to_string());
                Err(e)
            }
        };
        drop(guard);
        outcome
    });

    match task.await {
        Ok(Ok(plan)) => Ok(Json(plan)),
        Ok(Err(e)) => Err(api_error(e)),
        Err(e) => {
            error!("Care plan task aborted: {}", e);
            Err(internal_error("Care plan task aborted", &e.to_string()))
        }
    }
}

async fn get_care_plan_report(
    State(state): State<AppState>,
) -> Result<String, (StatusCode, Json<Value>)> {
    let workspace = state.workspace.lock().await;
    workspace.care_plan().map(render_care_plan).ok_or_else(|| {
        api_error(GuardianError::NotFound(
            "No care plan has been generated yet.".to_string(),
        ))
    })
}
