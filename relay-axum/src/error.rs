use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_core::errors::RelayError;
use relay_pipe::TransferError;
use tracing::error;

#[derive(Debug)]
pub struct RelayAxumError(pub anyhow::Error);

impl From<anyhow::Error> for RelayAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<RelayError> for RelayAxumError {
    fn from(e: RelayError) -> Self {
        Self(e.into_anyhow())
    }
}

impl From<TransferError> for RelayAxumError {
    fn from(e: TransferError) -> Self {
        Self(e.into_relay_error().into_anyhow())
    }
}

impl IntoResponse for RelayAxumError {
    fn into_response(self) -> Response {
        if let Some(relay) = RelayError::from_anyhow(&self.0) {
            let safe = relay.sanitize_for_client();
            let status =
                StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(safe.to_json())).into_response();
        }

        // Anything else is a 500 with the detail kept out of the body
        error!(error = %self.0, "unhandled error");
        let safe = RelayError::general_error("Internal Server Error");
        let status = StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(safe.to_json())).into_response()
    }
}
