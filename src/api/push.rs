use crate::api::AppState;
use crate::api::extract::ApiJson;
use crate::api::schemas::push::{
    PushConditionRequest, PushMultiRequest, PushResponse, PushSingleRequest, PushTokenRequest, PushTokensRequest,
    PushTopicRequest,
};
use crate::domain::Message;
use crate::error::{AppError, Result};
use axum::{Json, extract::State};

fn legacy_message(body: &str) -> Message {
    Message::notification("Test", body).with_data("notification", "true")
}

fn log_unregistered(tokens: &[String]) {
    if !tokens.is_empty() {
        tracing::info!(tokens = %tokens.join(", "), "Unregistered device token(s)");
    }
}

/// Sends a fixed test message to one device through the legacy multicast path.
///
/// # Errors
/// Returns `AppError::BadRequest` for an invalid payload and `AppError::SendFailed` if sending fails.
pub async fn push_single(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PushSingleRequest>,
) -> Result<Json<PushResponse>> {
    payload.validate().map_err(AppError::BadRequest)?;

    #[allow(deprecated)]
    let unregistered =
        state.fcm.send_multicast(&legacy_message("Test from single (legacy)"), &[payload.device_token]).await?;
    tracing::info!("Message sent successfully");
    log_unregistered(&unregistered);

    Ok(Json(PushResponse::ok()))
}

/// Sends a fixed test message to several devices through the legacy multicast path.
///
/// # Errors
/// Returns `AppError::BadRequest` for an invalid payload and `AppError::SendFailed` if sending fails.
pub async fn push_multi(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PushMultiRequest>,
) -> Result<Json<PushResponse>> {
    payload.validate().map_err(AppError::BadRequest)?;

    #[allow(deprecated)]
    let unregistered =
        state.fcm.send_multicast(&legacy_message("Test from multiple (legacy)"), &payload.device_tokens).await?;
    tracing::info!("Message sent successfully");
    log_unregistered(&unregistered);

    Ok(Json(PushResponse::ok()))
}

/// # Errors
/// Returns `AppError::BadRequest` for an invalid payload and `AppError::SendFailed` if sending fails.
pub async fn push_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PushTokenRequest>,
) -> Result<Json<PushResponse>> {
    payload.validate().map_err(AppError::BadRequest)?;
    state.fcm.send_to_token(&payload.message, &payload.token).await?;
    Ok(Json(PushResponse::ok()))
}

/// Fans a message out to a list of tokens and reports the unregistered ones.
///
/// # Errors
/// Returns `AppError::BadRequest` for an invalid payload and `AppError::SendFailed` if the
/// fan-out cannot start.
pub async fn push_tokens(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PushTokensRequest>,
) -> Result<Json<PushResponse>> {
    payload.validate().map_err(AppError::BadRequest)?;
    let report = state.fcm.send_to_tokens(&payload.message, &payload.tokens).await?;
    Ok(Json(PushResponse::with_unregistered(report.unregistered_tokens)))
}

/// # Errors
/// Returns `AppError::BadRequest` for an invalid payload and `AppError::SendFailed` if sending fails.
pub async fn push_topic(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PushTopicRequest>,
) -> Result<Json<PushResponse>> {
    payload.validate().map_err(AppError::BadRequest)?;
    state.fcm.send_to_topic(&payload.message, &payload.topic).await?;
    Ok(Json(PushResponse::ok()))
}

/// # Errors
/// Returns `AppError::BadRequest` for an invalid payload and `AppError::SendFailed` if sending fails.
pub async fn push_condition(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PushConditionRequest>,
) -> Result<Json<PushResponse>> {
    payload.validate().map_err(AppError::BadRequest)?;
    state.fcm.send_to_condition(&payload.message, &payload.condition).await?;
    Ok(Json(PushResponse::ok()))
}
