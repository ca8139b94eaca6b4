//! Studymap server: prompt proxy, course mind map and quiz.
//!
//! Thin axum server over studymap_lib. HTML pages for browsers, JSON twins
//! under /api for scripts.
//!
//! Usage:
//!   STUDYMAP_DB=/path/to/course.db STUDYMAP_BIND=127.0.0.1:3741 studymap-server
//!
//! Or with args:
//!   studymap-server --db /path/to/course.db --bind 0.0.0.0:3741

use axum::{
    extract::{FromRequest, Path, Query, Request, State},
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use studymap_lib::ai_client::AiClient;
use studymap_lib::db::{Database, RefValue, TopicWithLabel};
use studymap_lib::error::CoreError;
use studymap_lib::mindmap::{build_mind_map, MindMap};
use studymap_lib::quiz::{load_quiz, Feedback, Quiz, QuizError, QuizEvent, QuizSession, QuizSummary, Step};
use studymap_lib::sequencer::{next_topic_for, NextTopic};
use studymap_lib::settings::{self, Settings};
use studymap_lib::store::CourseStore;
use studymap_lib::{render, utils};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

// ============================================================================
// AppState
// ============================================================================

#[derive(Clone)]
struct AppState {
    db: Arc<Database>,
    ai: Arc<AiClient>,
    start_time: Instant,
}

impl AppState {
    fn store(&self) -> &dyn CourseStore {
        self.db.as_ref()
    }
}

// ============================================================================
// Error types
// ============================================================================

/// JSON error for /api routes.
struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({"error": self.1}))).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound(msg) => not_found(msg),
            CoreError::Upstream(msg) => {
                tracing::error!("[Server] Upstream failure: {}", msg);
                AppError(StatusCode::BAD_GATEWAY, msg)
            }
        }
    }
}

impl From<QuizError> for AppError {
    fn from(e: QuizError) -> Self {
        let status = match e {
            QuizError::SessionMismatch => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        };
        AppError(status, e.to_string())
    }
}

/// HTML error page for browser routes.
struct PageError(StatusCode, String);

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        (self.0, Html(render::error_page(&self.1))).into_response()
    }
}

impl From<AppError> for PageError {
    fn from(e: AppError) -> Self {
        PageError(e.0, e.1)
    }
}

impl From<CoreError> for PageError {
    fn from(e: CoreError) -> Self {
        AppError::from(e).into()
    }
}

fn not_found(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::NOT_FOUND, msg.into())
}

fn bad_request(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::BAD_REQUEST, msg.into())
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize)]
struct GenerateRequest {
    prompt: String,
}

#[derive(Deserialize)]
struct FormatQuery {
    format: Option<String>,
}

#[derive(Serialize)]
struct GenerateResponse {
    prompt: String,
    response: String,
    #[serde(rename = "generatedAt")]
    generated_at: String,
}

#[derive(Deserialize)]
struct LearnForm {
    session: String,
    event: String,
}

#[derive(Serialize)]
struct LearnState {
    topic: TopicWithLabel,
    quiz: Quiz,
    session: QuizSession,
}

#[derive(Deserialize)]
struct LearnEventRequest {
    session: QuizSession,
    event: QuizEvent,
}

#[derive(Serialize)]
struct LearnEventResponse {
    session: QuizSession,
    feedback: Option<Feedback>,
    completed: Option<QuizSummary>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    courses: usize,
    labels: usize,
    topics: usize,
    questions: usize,
    uptime_secs: u64,
}

// ============================================================================
// Helpers
// ============================================================================

fn load_topic(store: &dyn CourseStore, topic_id: &str) -> Result<TopicWithLabel, AppError> {
    let reference = RefValue::from_param(topic_id);
    store
        .get_topic_with_label(&reference)
        .map_err(CoreError::from)?
        .ok_or_else(|| not_found(format!("Topic '{}' not found", topic_id)))
}

fn load_topic_quiz(store: &dyn CourseStore, topic_id: &str) -> Result<(TopicWithLabel, Quiz), AppError> {
    let topic = load_topic(store, topic_id)?;
    let quiz = load_quiz(store, topic.topic.id)?;
    Ok((topic, quiz))
}

/// Completion payload. A topic whose label cannot be resolved still completes,
/// just without an onward link.
fn completion_summary(store: &dyn CourseStore, session: &QuizSession, topic_id: i64) -> Result<QuizSummary, AppError> {
    let next = match next_topic_for(store, &RefValue::Int(topic_id)) {
        Ok(next) => next,
        Err(CoreError::NotFound(msg)) => {
            tracing::warn!("[Learn] No next topic for {}: {}", topic_id, msg);
            NextTopic { next_topic_id: None, next_topic_name: None }
        }
        Err(e) => return Err(e.into()),
    };
    Ok(session.summary(next))
}

fn wants_json(request: &Request, query: &FormatQuery) -> bool {
    if query.format.as_deref() == Some("json") {
        return true;
    }
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false)
}

// ============================================================================
// Handlers
// ============================================================================

// GET /
async fn home_handler(State(state): State<AppState>) -> Result<Html<String>, PageError> {
    let courses = state.store().get_courses().map_err(CoreError::from)?;
    Ok(Html(render::home_page(&courses, state.ai.is_available())))
}

// POST /generate
async fn generate_handler(
    State(state): State<AppState>,
    Query(query): Query<FormatQuery>,
    request: Request,
) -> Response {
    let json = wants_json(&request, &query);
    let result = generate(&state, request, json).await;
    match (result, json) {
        (Ok(resp), true) => Json(resp).into_response(),
        (Ok(resp), false) => Html(render::generate_page(&resp.prompt, &resp.response)).into_response(),
        (Err(e), true) => e.into_response(),
        (Err(e), false) => PageError::from(e).into_response(),
    }
}

async fn generate(state: &AppState, request: Request, json: bool) -> Result<GenerateResponse, AppError> {
    let is_json_body = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);

    let req: GenerateRequest = if is_json_body {
        let Json(req) = Json::<GenerateRequest>::from_request(request, &())
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        req
    } else {
        let Form(req) = Form::<GenerateRequest>::from_request(request, &())
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        req
    };

    let prompt = req.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(bad_request("Prompt must not be empty"));
    }

    let started = Instant::now();
    let response = state.ai.generate_text(&prompt).await.map_err(CoreError::from)?;

    tracing::info!(
        "[POST /generate] '{}' -> {} chars in {}ms ({})",
        utils::safe_truncate(&prompt, 40),
        response.len(),
        started.elapsed().as_millis(),
        if json { "json" } else { "html" }
    );

    Ok(GenerateResponse {
        prompt,
        response,
        generated_at: chrono::Utc::now().to_rfc3339(),
    })
}

// GET /mindmap
async fn mindmap_page_handler(State(state): State<AppState>) -> Result<Html<String>, PageError> {
    let map = build_mind_map(state.store())?;
    Ok(Html(render::mindmap_page(&map)))
}

// GET /api/mindmap
async fn mindmap_api_handler(State(state): State<AppState>) -> Result<Json<MindMap>, AppError> {
    let map = build_mind_map(state.store())?;
    tracing::debug!("[GET /api/mindmap] {} nodes", map.nodes.len());
    Ok(Json(map))
}

// GET /learn/{topic_id}
async fn learn_page_handler(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> Result<Html<String>, PageError> {
    let (topic, quiz) = load_topic_quiz(state.store(), &topic_id)?;
    let session = QuizSession::new(&quiz);
    Ok(Html(render::learn_page(&topic, &quiz, &session, None)))
}

// POST /learn/{topic_id}
async fn learn_form_handler(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Form(form): Form<LearnForm>,
) -> Result<Response, PageError> {
    let store = state.store();
    let (topic, quiz) = load_topic_quiz(store, &topic_id)?;

    let mut session = match serde_json::from_str::<QuizSession>(&form.session) {
        Ok(s) => s,
        Err(_) => {
            let fresh = QuizSession::new(&quiz);
            let html = render::learn_page(&topic, &quiz, &fresh, Some("Your quiz session was lost, starting over."));
            return Ok((StatusCode::BAD_REQUEST, Html(html)).into_response());
        }
    };

    let outcome = form
        .event
        .parse::<QuizEvent>()
        .and_then(|event| session.apply(&quiz, event));

    match outcome {
        Ok(Step::Completed) => {
            let summary = completion_summary(store, &session, topic.topic.id)?;
            tracing::info!(
                "[Learn] Topic {} finished: {}/{}",
                topic.topic.id,
                summary.correct_count,
                summary.total_questions
            );
            Ok(Html(render::completion_page(&topic, &summary)).into_response())
        }
        Ok(Step::Continue) => Ok(Html(render::learn_page(&topic, &quiz, &session, None)).into_response()),
        Err(QuizError::SessionMismatch) => {
            let fresh = QuizSession::new(&quiz);
            let html = render::learn_page(&topic, &quiz, &fresh, Some("This quiz changed, starting over."));
            Ok((StatusCode::CONFLICT, Html(html)).into_response())
        }
        Err(QuizError::Finished) => {
            let summary = completion_summary(store, &session, topic.topic.id)?;
            Ok(Html(render::completion_page(&topic, &summary)).into_response())
        }
        Err(e) => {
            let html = render::learn_page(&topic, &quiz, &session, Some(&e.to_string()));
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(html)).into_response())
        }
    }
}

// GET /api/learn/{topic_id}
async fn learn_api_handler(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> Result<Json<LearnState>, AppError> {
    let (topic, quiz) = load_topic_quiz(state.store(), &topic_id)?;
    let session = QuizSession::new(&quiz);
    Ok(Json(LearnState { topic, quiz, session }))
}

// POST /api/learn/{topic_id}/event
async fn learn_event_handler(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Json(req): Json<LearnEventRequest>,
) -> Result<Json<LearnEventResponse>, AppError> {
    let store = state.store();
    let (topic, quiz) = load_topic_quiz(store, &topic_id)?;

    let mut session = req.session;
    let step = session.apply(&quiz, req.event)?;

    let completed = match step {
        Step::Completed => Some(completion_summary(store, &session, topic.topic.id)?),
        Step::Continue => None,
    };
    let feedback = session.feedback(&quiz);

    Ok(Json(LearnEventResponse { session, feedback, completed }))
}

// GET /api/topics/{topic_id}/next
async fn next_topic_handler(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> Result<Json<NextTopic>, AppError> {
    let next = next_topic_for(state.store(), &RefValue::from_param(&topic_id))?;
    Ok(Json(next))
}

// GET /health
async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let (courses, labels, topics, questions) = state
        .db
        .get_stats()
        .map_err(|e| AppError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        courses,
        labels,
        topics,
        questions,
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

// ============================================================================
// Router
// ============================================================================

fn build_router(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(home_handler))
        .route("/generate", post(generate_handler))
        .route("/mindmap", get(mindmap_page_handler))
        .route("/api/mindmap", get(mindmap_api_handler))
        .route("/learn/{topic_id}", get(learn_page_handler).post(learn_form_handler))
        .route("/api/learn/{topic_id}", get(learn_api_handler))
        .route("/api/learn/{topic_id}/event", post(learn_event_handler))
        .route("/api/topics/{topic_id}/next", get(next_topic_handler))
        .route("/health", get(health_handler))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Main
// ============================================================================

#[derive(Parser)]
#[command(name = "studymap-server", version, about = "Course mind map, quiz and prompt proxy")]
struct Args {
    /// Database path (overrides STUDYMAP_DB and settings)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Bind address (overrides STUDYMAP_BIND and settings)
    #[arg(long)]
    bind: Option<String>,

    /// Settings file
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    studymap_lib::init_tracing("info");
    let args = Args::parse();

    let settings_path = args.settings.clone().unwrap_or_else(settings::default_path);
    let mut config = Settings::load(&settings_path);
    config.apply_env();
    if let Some(db) = &args.db {
        config.db_path = Some(db.to_string_lossy().to_string());
    }
    if let Some(bind) = &args.bind {
        config.bind = bind.clone();
    }

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    tracing::info!("[Server] Settings: {}", settings_path.display());
    tracing::info!("[Server] Database: {}", db_path.display());

    let db = match Database::new(&db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!("[Server] Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let ai = Arc::new(AiClient::new(&config));
    if ai.is_available() {
        tracing::info!("[Server] LLM model: {}", ai.model());
    } else {
        tracing::warn!("[Server] ANTHROPIC_API_KEY not set, /generate will fail");
    }

    let state = AppState { db, ai, start_time: Instant::now() };
    let app = build_router(state, config.body_limit_bytes);

    let listener = match tokio::net::TcpListener::bind(&config.bind).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("[Server] Failed to bind to {}: {}", config.bind, e);
            std::process::exit(1);
        }
    };

    tracing::info!("[Server] Listening on {}", config.bind);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("[Server] Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studymap_lib::import::SeedFile;

    const SEED: &str = r#"{
        "labels": [
            {"id": 1, "name": "Arithmetic", "level": 1, "item": "A"},
            {"id": 2, "name": "Fractions", "level": 2, "item": "A", "parent_id": 1},
            {"id": 3, "name": "Decimals", "level": 2, "item": "B", "parent_id": "1"}
        ],
        "topics": [
            {"id": 10, "topic": "Halves", "labelId": 2, "item": "A"},
            {"id": 20, "topic": "Tenths", "labelId": 3, "item": "A"}
        ],
        "questions": [{"id": 100, "question": "1/2 of 4?", "topicId": 10}],
        "answers": [
            {"id": 1000, "answer": "2", "correct": 1, "questionId": 100, "explanation": "Split in two"},
            {"id": 1001, "answer": "3", "correct": 0, "questionId": 100}
        ]
    }"#;

    fn state() -> AppState {
        let db = Database::in_memory().unwrap();
        db.insert_seed(&SeedFile::from_json(SEED).unwrap()).unwrap();
        AppState {
            db: Arc::new(db),
            ai: Arc::new(AiClient::new(&Settings::default())),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_health_counts_rows() {
        let Json(health) = health_handler(State(state())).await.ok().unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.labels, 3);
        assert_eq!(health.topics, 2);
    }

    #[tokio::test]
    async fn test_next_topic_crosses_labels() {
        let Json(next) = next_topic_handler(State(state()), Path("10".to_string())).await.ok().unwrap();
        assert_eq!(next.next_topic_id, Some(20));

        let Json(end) = next_topic_handler(State(state()), Path("20".to_string())).await.ok().unwrap();
        assert_eq!(end.next_topic_id, None);

        let missing = next_topic_handler(State(state()), Path("99".to_string())).await;
        assert_eq!(missing.err().unwrap().0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_json_quiz_flow() {
        let state = state();
        let Json(start) = learn_api_handler(State(state.clone()), Path("10".to_string())).await.ok().unwrap();
        assert_eq!(start.quiz.questions.len(), 1);

        let wrong = LearnEventRequest { session: start.session, event: QuizEvent::Submit { option_id: 1001 } };
        let Json(resp) = learn_event_handler(State(state.clone()), Path("10".to_string()), Json(wrong))
            .await
            .ok()
            .unwrap();
        assert_eq!(resp.feedback.as_ref().map(|f| f.correct), Some(false));
        assert_eq!(resp.session.correct_count(), 0);

        let early = LearnEventRequest { session: resp.session.clone(), event: QuizEvent::Advance };
        let err = learn_event_handler(State(state.clone()), Path("10".to_string()), Json(early)).await;
        assert_eq!(err.err().unwrap().0, StatusCode::BAD_REQUEST);

        let right = LearnEventRequest { session: resp.session, event: QuizEvent::Submit { option_id: 1000 } };
        let Json(resp) = learn_event_handler(State(state.clone()), Path("10".to_string()), Json(right))
            .await
            .ok()
            .unwrap();
        assert_eq!(resp.feedback.unwrap().explanation.as_deref(), Some("Split in two"));

        let finish = LearnEventRequest { session: resp.session, event: QuizEvent::Advance };
        let Json(done) = learn_event_handler(State(state), Path("10".to_string()), Json(finish))
            .await
            .ok()
            .unwrap();
        let summary = done.completed.unwrap();
        assert_eq!(summary.correct_count, 1);
        assert_eq!(summary.total_questions, 1);
        assert_eq!(summary.next.next_topic_id, Some(20));
    }

    #[tokio::test]
    async fn test_learn_form_bad_session_restarts() {
        let form = LearnForm { session: "garbage".to_string(), event: "skip".to_string() };
        let resp = learn_form_handler(State(state()), Path("10".to_string()), Form(form)).await.ok().unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mindmap_api_is_ready() {
        let Json(map) = mindmap_api_handler(State(state())).await.ok().unwrap();
        assert!(!map.is_empty());
        assert_eq!(map.nodes.len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_topic_page_is_not_found() {
        let err = learn_page_handler(State(state()), Path("nope".to_string())).await.err().unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
