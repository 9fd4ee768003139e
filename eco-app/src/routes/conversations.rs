use crate::conversation::{Conversation, TurnOutcome, valid_conversation_id};
use crate::server::AppState;
use axum::extract::Path;
use axum::routing::{delete, get, post};
use axum::{Extension, Json};
use eco_forms::{FormState, Interaction, UserTurn};
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/v1/conversations", get(list_conversations))
        .route("/api/v1/conversations/{id}", delete(delete_conversation))
        .route(
            "/api/v1/conversations/{id}/form",
            post(activate_form).delete(exit_form),
        )
        .route("/api/v1/conversations/{id}/turns", post(post_turn))
        .route(
            "/api/v1/conversations/{id}/interaction",
            post(remember_interaction),
        )
}

fn invalid_id() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "error", "error": "invalid conversation id" }))
}

fn outcome_json(conversation: &Conversation, outcome: TurnOutcome) -> Json<serde_json::Value> {
    let report_id = match &outcome.state {
        FormState::Submitted { report_id } => Some(report_id.as_str().to_string()),
        _ => None,
    };
    Json(serde_json::json!({
        "status": "ok",
        "conversation_id": conversation.id,
        "state": outcome.state.label(),
        "report_id": report_id,
        "requested_slot": conversation.form.requested_slot(),
        "slots": conversation.form.slots(),
        "replies": outcome.outbox,
    }))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_conversations(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let conversations = state.conversations.list().await;
    Json(serde_json::json!({ "conversations": conversations }))
}

#[tracing::instrument(level = "info", skip_all, fields(conversation_id = %id))]
async fn delete_conversation(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    if !valid_conversation_id(&id) {
        return invalid_id();
    }
    let removed = state.conversations.remove(&id);
    Json(serde_json::json!({ "status": if removed { "ok" } else { "not_found" } }))
}

#[tracing::instrument(level = "info", skip_all, fields(conversation_id = %id))]
async fn activate_form(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    if !valid_conversation_id(&id) {
        return invalid_id();
    }
    let handle = state.conversations.get_or_create(&id);
    let mut conversation = handle.lock().await;
    let outcome = conversation.activate_form(&state.forms);
    outcome_json(&conversation, outcome)
}

#[tracing::instrument(level = "info", skip_all, fields(conversation_id = %id))]
async fn exit_form(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    if !valid_conversation_id(&id) {
        return invalid_id();
    }
    let Some(handle) = state.conversations.get(&id) else {
        return Json(serde_json::json!({ "status": "not_found" }));
    };
    let mut conversation = handle.lock().await;
    let outcome = conversation.exit_form(&state.forms);
    outcome_json(&conversation, outcome)
}

#[tracing::instrument(level = "info", skip_all, fields(conversation_id = %id))]
async fn post_turn(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    Json(turn): Json<UserTurn>,
) -> Json<serde_json::Value> {
    if !valid_conversation_id(&id) {
        return invalid_id();
    }
    let handle = state.conversations.get_or_create(&id);
    let mut conversation = handle.lock().await;
    let outcome = conversation
        .respond(&state.forms, &state.feedback, &turn)
        .await;
    outcome_json(&conversation, outcome)
}

#[tracing::instrument(level = "debug", skip_all, fields(conversation_id = %id))]
async fn remember_interaction(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    Json(interaction): Json<Interaction>,
) -> Json<serde_json::Value> {
    if !valid_conversation_id(&id) {
        return invalid_id();
    }
    let handle = state.conversations.get_or_create(&id);
    handle.lock().await.feedback.remember(interaction);
    Json(serde_json::json!({ "status": "ok" }))
}
