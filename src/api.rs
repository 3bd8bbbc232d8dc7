//! The Application API (spec §6): get/post validator, get/post flash node.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, RegistryError, StatusError};
use crate::payload::{KnownChannel, RegistrationPayload, Signature};
use crate::pubkey::PublicKey;
use crate::registry::Registry;

struct ApiState {
    registry: Arc<Registry>,
}

pub fn router(registry: Arc<Registry>) -> Router {
    let state = Arc::new(ApiState { registry });
    Router::new()
        .route("/validator/{pubkey}", get(get_validator))
        .route("/validator", post(post_validator))
        .route("/flash_node/{pubkey}", get(get_flash_node))
        .route("/flash_node", post(post_flash_node))
        .with_state(state)
}

fn parse_pubkey(raw: &str) -> Result<PublicKey, StatusError> {
    PublicKey::parse(raw).map_err(|_| StatusError(StatusCode::BAD_REQUEST, RegistryError::AddressMalformed))
}

async fn get_validator(
    State(state): State<Arc<ApiState>>,
    Path(pubkey): Path<String>,
) -> Result<Json<Option<RegistrationPayload>>, StatusError> {
    let pubkey = parse_pubkey(&pubkey)?;
    let payload = state
        .registry
        .get_validator_or_fetch(&pubkey)
        .await
        .map_err(|e| StatusError(e.status(), e))?;
    Ok(Json(payload))
}

async fn get_flash_node(
    State(state): State<Arc<ApiState>>,
    Path(pubkey): Path<String>,
) -> Result<Json<Option<RegistrationPayload>>, StatusError> {
    let pubkey = parse_pubkey(&pubkey)?;
    let payload = state
        .registry
        .get_flash_node_or_fetch(&pubkey)
        .await
        .map_err(|e| StatusError(e.status(), e))?;
    Ok(Json(payload))
}

/// Request body for `POST /validator`.
#[derive(Deserialize)]
struct RegisterValidatorRequest {
    payload: RegistrationPayload,
    #[serde(default)]
    signature: Vec<u8>,
}

async fn post_validator(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<RegisterValidatorRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .register_validator(req.payload, Signature(req.signature))
        .await
        .map_err(|e| e.into())?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for `POST /flash_node`.
#[derive(Deserialize)]
struct RegisterFlashNodeRequest {
    payload: RegistrationPayload,
    #[serde(default)]
    signature: Vec<u8>,
    channel: KnownChannel,
}

async fn post_flash_node(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<RegisterFlashNodeRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .register_flash_node(req.payload, Signature(req.signature), req.channel)
        .await
        .map_err(|e| e.into())?;
    Ok(StatusCode::NO_CONTENT)
}

impl Serialize for KnownChannel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("KnownChannel", 2)?;
        s.serialize_field("height", &self.height)?;
        s.serialize_field("conf", &self.conf)?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for KnownChannel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            height: u64,
            conf: u32,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(KnownChannel {
            height: raw.height,
            conf: raw.conf,
        })
    }
}
