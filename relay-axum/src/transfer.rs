use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method},
    Json,
};
use relay_core::errors::RelayError;
use relay_pipe::{ResponseState, TransferPayload, TransferRequest};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use crate::{RelayAxumError, RelayAxumState};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Default, Deserialize)]
struct TransferBody {
    #[serde(rename = "videoId", alias = "assetId", alias = "asset_id")]
    asset_id: Option<String>,
}

/// Body parsing is lenient: an unreadable body reads as "no asset id" so
/// the auth and method checks still run first.
fn asset_id_from_body(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice::<TransferBody>(body) {
        Ok(parsed) => parsed.asset_id,
        Err(err) => {
            debug!(error = %err, "ignoring unparseable request body");
            None
        }
    }
}

/// Accepts every method; the coordinator decides what is allowed.
pub async fn transfer(
    State(state): State<RelayAxumState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TransferPayload>, RelayAxumError> {
    let mut request = TransferRequest::new(method.as_str());
    request.api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    request.asset_id = asset_id_from_body(&body);

    let (response, rx) = ResponseState::channel();
    let token = CancellationToken::new();

    // Cancels the relay if this handler is dropped (client went away)
    let guard = token.clone().drop_guard();

    let coordinator = Arc::clone(&state.coordinator);
    tokio::spawn(
        async move {
            coordinator
                .handle(request, Arc::new(response), token)
                .await;
        }
        .in_current_span(),
    );

    let reply = rx.await;
    guard.disarm();

    match reply {
        Ok(Ok(payload)) => Ok(Json(payload)),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(RelayError::general_error("Transfer ended without a response").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_video_id_and_aliases() {
        assert_eq!(
            asset_id_from_body(br#"{"videoId":"abc123"}"#).as_deref(),
            Some("abc123")
        );
        assert_eq!(
            asset_id_from_body(br#"{"assetId":"xyz"}"#).as_deref(),
            Some("xyz")
        );
    }

    #[test]
    fn bad_bodies_have_no_asset_id() {
        assert_eq!(asset_id_from_body(b""), None);
        assert_eq!(asset_id_from_body(b"{\"videoId\":"), None);
        assert_eq!(asset_id_from_body(br#"{"other":1}"#), None);
        assert_eq!(asset_id_from_body(br#"{"videoId":42}"#), None);
    }
}
