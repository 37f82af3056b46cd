//! # Admin API
//!
//! Bans and the admin audit log. Every endpoint here requires an admin
//! caller; dispute and review moderation live with their own routers.
//!
//! The audit log is read-only over HTTP. `GET /v1/admin/actions/verify`
//! re-hashes the full chain and reports the first broken link, if any.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use gmx_arbitration::{AdminAction, ChainVerification};
use gmx_core::{Profile, ProfileId, ValidationError};

use crate::auth::CurrentActor;
use crate::engine::MAX_BAN_REASON_CHARS;
use crate::error::AppError;
use crate::extractors::{extract_optional_json, Validate};
use crate::routes::utc;
use crate::state::AppState;

/// One entry of the audit chain.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminActionView {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action_type: String,
    pub target_type: String,
    pub target_id: Uuid,
    pub description: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl From<&AdminAction> for AdminActionView {
    fn from(a: &AdminAction) -> Self {
        Self {
            id: *a.id.as_uuid(),
            admin_id: *a.admin_id.as_uuid(),
            action_type: a.action_type.as_str().to_string(),
            target_type: a.target_type.as_str().to_string(),
            target_id: a.target_id,
            description: a.description.clone(),
            metadata: a.metadata.clone(),
            created_at: utc(a.created_at),
            sequence: a.sequence,
            previous_hash: a.previous_hash.clone(),
            entry_hash: a.entry_hash.clone(),
        }
    }
}

/// Ban or unban request. An empty body bans.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BanRequest {
    #[serde(default = "default_banned")]
    pub banned: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_banned() -> bool {
    true
}

impl Default for BanRequest {
    fn default() -> Self {
        Self {
            banned: true,
            reason: None,
        }
    }
}

impl Validate for BanRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.reason.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => {
                gmx_core::error::check_length("reason", r, 1, MAX_BAN_REASON_CHARS)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileView {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Profile> for ProfileView {
    fn from(p: &Profile) -> Self {
        Self {
            id: *p.id.as_uuid(),
            username: p.username.clone(),
            is_admin: p.is_admin,
            is_banned: p.is_banned,
            created_at: utc(p.created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ActionsQuery {
    /// Only entries targeting this record.
    pub target_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChainVerificationView {
    pub total_entries: usize,
    pub broken_links: usize,
    pub first_broken_sequence: Option<u64>,
    pub chain_valid: bool,
}

impl From<ChainVerification> for ChainVerificationView {
    fn from(v: ChainVerification) -> Self {
        Self {
            total_entries: v.total_entries,
            broken_links: v.broken_links,
            first_broken_sequence: v.first_broken_sequence,
            chain_valid: v.chain_valid,
        }
    }
}

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/profiles/{id}/ban", post(set_ban))
        .route("/v1/admin/actions", get(list_actions))
        .route("/v1/admin/actions/verify", get(verify_actions))
}

/// POST /v1/admin/profiles/{id}/ban: Ban or unban a profile.
#[utoipa::path(
    post,
    path = "/v1/admin/profiles/{id}/ban",
    params(("id" = Uuid, Path, description = "Profile ID")),
    request_body(content = BanRequest, description = "Omit to ban without a reason"),
    responses(
        (status = 200, description = "Ban status changed", body = ProfileView),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Profile not found", body = crate::error::ErrorBody),
        (status = 409, description = "Profile already in the requested state", body = crate::error::ErrorBody),
        (status = 422, description = "Self-ban or invalid reason", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn set_ban(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Result<Json<BanRequest>, JsonRejection>,
) -> Result<Json<ProfileView>, AppError> {
    let req: BanRequest = extract_optional_json(body)?;
    req.validate()?;
    let profile = state
        .engine
        .set_banned(&actor, ProfileId::from_uuid(id), req.banned, req.reason)
        .await?;
    Ok(Json(ProfileView::from(&profile)))
}

/// GET /v1/admin/actions: The audit log in chain order.
#[utoipa::path(
    get,
    path = "/v1/admin/actions",
    params(
        ("target_id" = Option<Uuid>, Query, description = "Only entries targeting this record"),
    ),
    responses(
        (status = 200, description = "Audit entries, oldest first", body = Vec<AdminActionView>),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn list_actions(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ActionsQuery>,
) -> Result<Json<Vec<AdminActionView>>, AppError> {
    let actions = state.engine.admin_actions(&actor, query.target_id).await?;
    Ok(Json(actions.iter().map(AdminActionView::from).collect()))
}

/// GET /v1/admin/actions/verify: Re-hash the audit chain.
#[utoipa::path(
    get,
    path = "/v1/admin/actions/verify",
    responses(
        (status = 200, description = "Verification result", body = ChainVerificationView),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn verify_actions(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<ChainVerificationView>, AppError> {
    let verification = state.engine.verify_audit_chain(&actor).await?;
    Ok(Json(verification.into()))
}
