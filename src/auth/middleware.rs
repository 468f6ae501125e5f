use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use tracing::debug;

use crate::{error::AppError, service::authenticator::Authenticator};

/// Resolves the bearer token into a `Session` stored in the request
/// extensions; rejects the request otherwise.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let authenticator = match req.app_data::<Data<Authenticator>>() {
        Some(a) => a.clone(),
        None => {
            let err = AppError::internal(anyhow::anyhow!("Authenticator missing from app data"));
            return Ok(req.into_response(err.error_response()));
        }
    };

    let token = match req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(t) => t.trim().to_string(),
        None => return Ok(req.into_response(AppError::MissingToken.error_response())),
    };

    let session = match authenticator.validate(&token) {
        Ok(s) => s,
        Err(e) => {
            debug!(error = %e, path = %req.path(), "Rejected bearer token");
            return Ok(req.into_response(e.error_response()));
        }
    };

    debug!(
        subject_id = %session.subject_id,
        issued_at = session.issued_at,
        expires_at = session.expires_at,
        "Authenticated request"
    );
    req.extensions_mut().insert(session);

    next.call(req).await
}
