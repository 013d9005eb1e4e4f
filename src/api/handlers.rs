//! REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use tracing::error;

use super::types::{
    ErrorResponse, MessageResponse, QrResponse, ResetResponse, SendResponse, StatusResponse,
};
use super::upload::{read_form, FormData, UploadConfig, UploadError};
use crate::dispatch::{Dispatcher, InvoiceRequest, SendRequest};
use crate::session::SessionManager;

/// Error half of every fallible handler.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub uploads: Arc<UploadConfig>,
}

impl AppState {
    pub fn new(session: Arc<SessionManager>, dispatcher: Dispatcher, uploads: UploadConfig) -> Self {
        Self {
            session,
            dispatcher: Arc::new(dispatcher),
            uploads: Arc::new(uploads),
        }
    }
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// Whether the session can send, and as whom.
pub async fn wa_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::from_status(state.session.current_status()))
}

/// The pending pairing challenge.
pub async fn wa_qr(State(state): State<AppState>) -> Result<Json<QrResponse>, ApiError> {
    state
        .session
        .pending_challenge()
        .map(|qr| Json(QrResponse { qr }))
        .ok_or_else(|| (StatusCode::NOT_FOUND, Json(ErrorResponse::new("No QR available"))))
}

/// Send a text message or a document.
///
/// Form fields: `to`, `message`, and an optional `file` part.
pub async fn wa_send(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SendResponse>, ApiError> {
    let mut form = receive(multipart, &state.uploads, "file").await?;

    let request = SendRequest {
        destination: form.field("to"),
        body: form.field("message"),
        attachment: form.file.take(),
    };

    let receipt = state.dispatcher.send(request).await.map_err(|e| {
        let (status, body) = ErrorResponse::for_send(e);
        (status, Json(body))
    })?;

    Ok(Json(SendResponse::sent(
        receipt.normalized.as_str(),
        receipt.file_name,
    )))
}

/// Deliver an invoice.
///
/// Form fields: `mobileNumber` and an `invoiceFile` part.
pub async fn send_invoice(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut form = receive(multipart, &state.uploads, "invoiceFile").await?;

    let request = InvoiceRequest {
        mobile_number: form.field("mobileNumber"),
        invoice: form.file.take(),
    };

    state.dispatcher.send_invoice(request).await.map_err(|e| {
        let (status, body) = ErrorResponse::for_invoice(e);
        (status, Json(body))
    })?;

    Ok(Json(MessageResponse {
        message: "Invoice sent successfully!".to_string(),
    }))
}

/// Drop the session and its credentials, then pair afresh.
pub async fn wa_reset(State(state): State<AppState>) -> Json<ResetResponse> {
    state.session.reset_session();
    Json(ResetResponse::default())
}

async fn receive(
    multipart: Multipart,
    uploads: &UploadConfig,
    file_field: &str,
) -> Result<FormData, ApiError> {
    read_form(multipart, uploads, file_field).await.map_err(upload_error)
}

fn upload_error(err: UploadError) -> ApiError {
    if err.is_too_large() {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ErrorResponse::new("File too large.").with_details(err.to_string())),
        );
    }
    error!("Upload failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("File upload failed.").with_details(err.to_string())),
    )
}
