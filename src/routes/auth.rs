use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::routes::error::ApiError;
use crate::services::identity::IdentityResolver;

#[derive(Clone)]
pub struct AuthState {
    pub identity: Arc<dyn IdentityResolver>,
}

/// Resolve the caller and attach it to the request as an extension.
pub async fn require_caller(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = auth.identity.resolve(req.headers()).map_err(|e| {
        tracing::debug!(error = %e, "Rejected unauthenticated request");
        ApiError::Unauthenticated
    })?;

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
