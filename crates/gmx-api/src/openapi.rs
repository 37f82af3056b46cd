//! # OpenAPI Document Assembly
//!
//! Collects every utoipa-documented handler and schema into one OpenAPI
//! document, served at `/openapi.json` behind the same auth as the API.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "`Authorization: Bearer {profile_id}:{secret}`. The secret is \
                             required only when AUTH_TOKEN is set.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "GMX Marketplace Order API",
        version = "0.1.0",
        description = "Order lifecycle for the GMX gaming-goods marketplace.\n\n- **Orders**: checkout, payment capture, delivery, buyer confirmation, cancellation\n- **Buyer protection**: 48-hour window after delivery, then automatic completion\n- **Disputes**: buyer filings, admin review and verdicts\n- **Reviews**: one buyer review per completed order, admin moderation\n- **Audit**: hash-chained log of every admin action\n\nHealth checks (`/health/*`) and `/metrics` are unauthenticated.",
        license(name = "AGPL-3.0-or-later"),
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Orders ──────────────────────────────────────────────────────
        crate::routes::orders::create_order,
        crate::routes::orders::list_orders,
        crate::routes::orders::get_order,
        crate::routes::orders::capture_payment,
        crate::routes::orders::mark_delivered,
        crate::routes::orders::confirm_receipt,
        crate::routes::orders::cancel_order,
        // ── Disputes ────────────────────────────────────────────────────
        crate::routes::disputes::open_dispute,
        crate::routes::disputes::get_active_dispute,
        crate::routes::disputes::begin_review,
        crate::routes::disputes::resolve_dispute,
        // ── Reviews ─────────────────────────────────────────────────────
        crate::routes::reviews::submit_review,
        crate::routes::reviews::get_order_review,
        crate::routes::reviews::edit_review,
        crate::routes::reviews::delete_review,
        // ── Admin ───────────────────────────────────────────────────────
        crate::routes::admin::set_ban,
        crate::routes::admin::list_actions,
        crate::routes::admin::verify_actions,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            // ── Order DTOs ──────────────────────────────────────────────
            crate::routes::orders::CreateOrderRequest,
            crate::routes::orders::ListingInput,
            crate::routes::orders::CancelRequest,
            crate::routes::orders::OrderView,
            crate::routes::orders::ListingView,
            crate::routes::orders::PricingView,
            crate::routes::orders::ProtectionView,
            // ── Dispute DTOs ────────────────────────────────────────────
            crate::routes::disputes::DisputeRequest,
            crate::routes::disputes::ResolveRequest,
            crate::routes::disputes::DisputeView,
            crate::routes::disputes::ActiveDisputeResponse,
            crate::routes::disputes::ResolutionResponse,
            // ── Review DTOs ─────────────────────────────────────────────
            crate::routes::reviews::ReviewRequest,
            crate::routes::reviews::EditReviewRequest,
            crate::routes::reviews::DeleteReviewRequest,
            crate::routes::reviews::ReviewView,
            crate::routes::reviews::OrderReviewResponse,
            // ── Admin DTOs ──────────────────────────────────────────────
            crate::routes::admin::AdminActionView,
            crate::routes::admin::BanRequest,
            crate::routes::admin::ProfileView,
            crate::routes::admin::ChainVerificationView,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "orders", description = "Order checkout, fulfilment and the buyer-protection countdown"),
        (name = "disputes", description = "Buyer dispute filing and lookup"),
        (name = "reviews", description = "Buyer reviews of completed orders"),
        (name = "admin", description = "Dispute verdicts, review moderation, bans and the audit log"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI document.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_generates() {
        let doc = ApiDoc::openapi();
        assert_eq!(doc.info.title, "GMX Marketplace Order API");
        assert!(!doc.paths.paths.is_empty());
    }

    #[test]
    fn document_has_lifecycle_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/v1/orders",
            "/v1/orders/{id}",
            "/v1/orders/{id}/pay",
            "/v1/orders/{id}/deliver",
            "/v1/orders/{id}/confirm",
            "/v1/orders/{id}/cancel",
            "/v1/orders/{id}/dispute",
            "/v1/orders/{id}/review",
            "/v1/admin/orders/{id}/dispute/review",
            "/v1/admin/orders/{id}/dispute/resolve",
            "/v1/admin/reviews/{id}",
            "/v1/admin/profiles/{id}/ban",
            "/v1/admin/actions",
            "/v1/admin/actions/verify",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn document_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
