use std::collections::HashSet;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures::future::try_join_all;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    app_state::{AppState, Status},
    chunking::{normalize_text, text_stats, ChunkOptions, TextStats},
    error::PipelineError,
    flashcards::{count_eligible, generate_flashcards},
    mindmap::{generate_mind_map, layout, Breakpoint, MindMapTree},
    models::{
        Difficulty, FlashcardEligibility, FlashcardSet, FlashcardType, MindMapLayout, MindMapSource, NotesDocument,
        QuestionType, Quiz,
    },
    notes::build_notes,
    quiz::{generate_quiz, QuizConfig, QuizRequest},
    source::{confine_to_root, extract_text, SourceMaterial},
    store::ArtifactKind,
};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct CreateDocumentPayload {
    owner: String,
    source: SourceMaterial,
    #[serde(default)]
    chunking: Option<ChunkOptions>,
}

#[derive(Serialize)]
pub struct CreateDocumentResponse {
    document_id: String,
    stats: TextStats,
    notes: NotesDocument,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    owner: String,
}

#[derive(Deserialize)]
pub struct FlashcardsPayload {
    owner: String,
    types: Vec<FlashcardType>,
}

#[derive(Deserialize)]
pub struct QuizPayload {
    owner: String,
    question_count: usize,
    question_type: QuestionType,
    difficulty: Difficulty,
    #[serde(default)]
    include_subsections: Option<bool>,
    #[serde(default)]
    min_points_per_section: Option<usize>,
}

#[derive(Deserialize)]
pub struct LayoutPayload {
    owner: String,
    #[serde(default)]
    expanded_keys: HashSet<String>,
    #[serde(default)]
    breakpoint: Option<Breakpoint>,
    #[serde(default)]
    viewport_width: Option<u32>,
    /// Si es `true` se dibuja el mapa generado por el LLM en lugar de los apuntes.
    #[serde(default)]
    use_generated: bool,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/documents", post(create_document_handler))
        .route("/api/documents/:id/notes", get(notes_handler))
        .route("/api/documents/:id/eligibility", get(eligibility_handler))
        .route("/api/documents/:id/flashcards", post(flashcards_handler))
        .route("/api/documents/:id/quiz", post(quiz_handler))
        .route("/api/documents/:id/mindmap", post(mindmap_handler))
        .route("/api/documents/:id/mindmap/layout", post(mindmap_layout_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Errores ---

fn error_body(status: StatusCode, body: Value) -> ApiError {
    (status, Json(body))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    error_body(StatusCode::BAD_REQUEST, json!({ "error": message.into() }))
}

fn internal_error(err: anyhow::Error) -> ApiError {
    error!("Error interno: {:#}", err);
    error_body(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": format!("Error interno: {}", err) }),
    )
}

fn pipeline_error(err: PipelineError) -> ApiError {
    warn!("Fallo del pipeline: {}", err);
    match err {
        PipelineError::Validation(_) => bad_request(err.to_string()),
        PipelineError::Generation(_) => error_body(StatusCode::BAD_GATEWAY, json!({ "error": err.to_string() })),
        PipelineError::MalformedDocument {
            ref raw,
            ref fixes_attempted,
            ref reason,
        } => error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": format!("Documento mal formado: {reason}"),
                "fixes_attempted": fixes_attempted,
                "raw": raw,
            }),
        ),
        PipelineError::ShapeViolation(_) => {
            error_body(StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": err.to_string() }))
        }
    }
}

fn require_owner(owner: &str) -> Result<(), ApiError> {
    if owner.trim().is_empty() {
        return Err(bad_request("El campo 'owner' es obligatorio."));
    }
    Ok(())
}

// --- Acceso al almacén ---

async fn load_artifact<T: DeserializeOwned>(
    state: &AppState,
    owner: &str,
    kind: ArtifactKind,
    id: &str,
) -> Result<T, ApiError> {
    let stored = state
        .store
        .get(owner, kind, id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            error_body(
                StatusCode::NOT_FOUND,
                json!({ "error": format!("No existe {kind} para el documento '{id}'.") }),
            )
        })?;
    serde_json::from_value(stored.body).map_err(|e| internal_error(e.into()))
}

async fn save_artifact<T: Serialize>(
    state: &AppState,
    owner: &str,
    kind: ArtifactKind,
    id: &str,
    artifact: &T,
) -> Result<(), ApiError> {
    let body = serde_json::to_value(artifact).map_err(|e| internal_error(e.into()))?;
    state.store.put(owner, kind, id, body).await.map_err(internal_error)?;
    Ok(())
}

// --- Handlers ---

#[axum::debug_handler]
async fn create_document_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateDocumentPayload>,
) -> ApiResult<CreateDocumentResponse> {
    require_owner(&payload.owner)?;
    let options = payload.chunking.unwrap_or(state.config.chunking);
    options.validate().map_err(bad_request)?;
    let source = confine_to_root(payload.source, state.config.source_root.as_deref()).map_err(pipeline_error)?;

    state.set_status(true, "Extrayendo texto de la fuente...", 0.1);
    let raw = tokio::task::spawn_blocking(move || extract_text(&source))
        .await
        .map_err(|e| internal_error(e.into()))
        .and_then(|r| r.map_err(pipeline_error));
    let raw = match raw {
        Ok(raw) => raw,
        Err(e) => {
            state.set_status(false, "Error al extraer el texto.", 0.0);
            return Err(e);
        }
    };

    let normalized = normalize_text(&raw);
    let stats = text_stats(&normalized);
    if stats.exceeds_token_ceiling {
        warn!(
            "El texto supera el límite de tokens: sólo cabe el {}%",
            stats.token_coverage
        );
    }

    state.set_status(true, "Generando apuntes...", 0.4);
    let notes = match build_notes(state.generator.as_ref(), &normalized, &options).await {
        Ok(notes) => notes,
        Err(e) => {
            state.set_status(false, format!("Error generando apuntes: {e}"), 0.0);
            return Err(pipeline_error(e));
        }
    };

    let document_id = Uuid::new_v4().to_string();
    if let Err(e) = save_artifact(&state, &payload.owner, ArtifactKind::Notes, &document_id, &notes).await {
        state.set_status(false, "Error guardando los apuntes.", 0.0);
        return Err(e);
    }
    state.set_status(false, format!("Apuntes '{}' listos.", notes.title), 0.0);
    info!("Documento {document_id} creado para '{}'", payload.owner);

    Ok(Json(CreateDocumentResponse {
        document_id,
        stats,
        notes,
    }))
}

#[axum::debug_handler]
async fn notes_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<NotesDocument> {
    require_owner(&query.owner)?;
    let notes = load_artifact(&state, &query.owner, ArtifactKind::Notes, &id).await?;
    Ok(Json(notes))
}

#[axum::debug_handler]
async fn eligibility_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<FlashcardEligibility> {
    require_owner(&query.owner)?;
    let notes: NotesDocument = load_artifact(&state, &query.owner, ArtifactKind::Notes, &id).await?;
    Ok(Json(count_eligible(&notes)))
}

#[axum::debug_handler]
async fn flashcards_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<FlashcardsPayload>,
) -> ApiResult<Vec<FlashcardSet>> {
    require_owner(&payload.owner)?;
    let mut types: Vec<FlashcardType> = Vec::new();
    for kind in payload.types {
        if !types.contains(&kind) {
            types.push(kind);
        }
    }
    if types.is_empty() {
        return Err(bad_request("Indique al menos un tipo de flashcard."));
    }

    let notes: NotesDocument = load_artifact(&state, &payload.owner, ArtifactKind::Notes, &id).await?;
    let generator = state.generator.as_ref();
    let sets = try_join_all(types.iter().map(|&kind| generate_flashcards(generator, &notes, kind)))
        .await
        .map_err(pipeline_error)?;

    save_artifact(&state, &payload.owner, ArtifactKind::Flashcards, &id, &sets).await?;
    Ok(Json(sets))
}

#[axum::debug_handler]
async fn quiz_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<QuizPayload>,
) -> ApiResult<Quiz> {
    require_owner(&payload.owner)?;
    let config = QuizConfig {
        include_subsections: payload.include_subsections.unwrap_or(true),
        min_points_per_section: payload
            .min_points_per_section
            .unwrap_or(state.config.quiz_min_points),
    };
    let request = QuizRequest {
        question_count: payload.question_count,
        question_type: payload.question_type,
        difficulty: payload.difficulty,
    };

    let notes: NotesDocument = load_artifact(&state, &payload.owner, ArtifactKind::Notes, &id).await?;
    let quiz = generate_quiz(state.generator.as_ref(), &notes, &config, &request)
        .await
        .map_err(pipeline_error)?;

    save_artifact(&state, &payload.owner, ArtifactKind::Quiz, &id, &quiz).await?;
    Ok(Json(quiz))
}

#[axum::debug_handler]
async fn mindmap_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<OwnerQuery>,
) -> ApiResult<MindMapSource> {
    require_owner(&payload.owner)?;
    let notes: NotesDocument = load_artifact(&state, &payload.owner, ArtifactKind::Notes, &id).await?;
    let source = generate_mind_map(state.generator.as_ref(), &notes)
        .await
        .map_err(pipeline_error)?;

    save_artifact(&state, &payload.owner, ArtifactKind::Mindmap, &id, &source).await?;
    Ok(Json(source))
}

#[axum::debug_handler]
async fn mindmap_layout_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<LayoutPayload>,
) -> ApiResult<MindMapLayout> {
    require_owner(&payload.owner)?;
    let breakpoint = payload
        .breakpoint
        .or(payload.viewport_width.map(Breakpoint::from_width))
        .unwrap_or(Breakpoint::Lg);

    let tree = if payload.use_generated {
        let source: MindMapSource = load_artifact(&state, &payload.owner, ArtifactKind::Mindmap, &id).await?;
        MindMapTree::from_source(&source)
    } else {
        let notes: NotesDocument = load_artifact(&state, &payload.owner, ArtifactKind::Notes, &id).await?;
        MindMapTree::from_notes(&notes)
    };

    Ok(Json(layout(&tree, &payload.expanded_keys, breakpoint)))
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status_snapshot())
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Ok(mut sender) = state.shutdown_sender.lock() {
        if let Some(sender) = sender.take() {
            let _ = sender.send(());
        }
    }
    StatusCode::OK
}
