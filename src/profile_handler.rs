use crate::auth::Authenticator;
use crate::error::ProfileError;
use crate::profile_service::ProfileService;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared handles for request handlers
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<dyn Authenticator>,
    pub profiles: Arc<ProfileService>,
}

impl IntoResponse for ProfileError {
    fn into_response(self) -> Response {
        match self {
            // Deliberately identical
            ProfileError::Unauthenticated | ProfileError::TargetUnavailable => {
                (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
            }
            ProfileError::RateLimitExceeded { retry_after, .. } => {
                let mut secs = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 || secs == 0 {
                    secs += 1;
                }
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            ProfileError::StorageFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

pub async fn get_profile_handler(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let caller = match state.authenticator.authenticate(authorization).await {
        Ok(caller) => caller,
        Err(e) => {
            error!("Authentication backend failed: {}", e);
            return e.into_response();
        }
    };

    match state.profiles.get_profile(caller.as_ref(), &identifier).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => {
            if !e.is_unauthorized() {
                info!(target_id = %identifier, "Profile request failed: {}", e);
            }
            e.into_response()
        }
    }
}

/// Build the HTTP surface
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/profile/{identifier}", get(get_profile_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(cors)
        .with_state(state)
}
