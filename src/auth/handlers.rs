use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    auth::session::Session,
    error::AppError,
    models::{ChangePasswordReq, InitDataReq, LoginReqDto, RegisterReq},
    service::{
        authenticator::{Authenticator, NewCredential},
        bootstrap::BootstrapService,
    },
};

#[derive(Serialize, ToSchema)]
pub struct CheckInitResponse {
    pub initialized: bool,
}

/// One-time system bootstrap
#[utoipa::path(
    post,
    path = "/auth/init-data",
    request_body = InitDataReq,
    responses(
        (status = 200, description = "First administrator created", body = crate::service::bootstrap::InitialAdmin),
        (status = 400, description = "Invalid admin or company name"),
        (status = 501, description = "System already initialized", body = Object, example = json!({
            "status": 501,
            "message": "system already initialized"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
pub async fn init_data(
    req: web::Json<InitDataReq>,
    bootstrap: web::Data<BootstrapService>,
    authenticator: web::Data<Authenticator>,
) -> Result<impl Responder, AppError> {
    let admin = bootstrap
        .initialize(&req.admin_name, &req.company_name)
        .await?;

    authenticator.remember_email(&admin.email).await;

    Ok(HttpResponse::Ok().json(admin))
}

/// Whether bootstrap already ran
#[utoipa::path(
    get,
    path = "/auth/check-init",
    responses(
        (status = 200, description = "Initialization state", body = CheckInitResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
pub async fn check_init(bootstrap: web::Data<BootstrapService>) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(CheckInitResponse {
        initialized: bootstrap.is_initialized().await?,
    }))
}

/// Credential login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Signed token and profile info", body = crate::service::authenticator::LoginResponse),
        (status = 400, description = "Missing email or password"),
        (status = 501, description = "Invalid email or password", body = Object, example = json!({
            "status": 501,
            "message": "invalid email or password"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
#[instrument(name = "login_request", skip(req, authenticator))]
pub async fn login(
    req: web::Json<LoginReqDto>,
    authenticator: web::Data<Authenticator>,
) -> Result<impl Responder, AppError> {
    info!("Login request received");
    let resp = authenticator.login(&req.email, &req.password).await?;
    Ok(HttpResponse::Ok().json(resp))
}

/// Change own password
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordReq,
    responses(
        (status = 200, description = "Password changed", body = Object, example = json!({
            "message": "Password changed successfully"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 501, description = "New passwords differ or old password is wrong"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn change_password(
    session: Session,
    req: web::Json<ChangePasswordReq>,
    authenticator: web::Data<Authenticator>,
) -> Result<impl Responder, AppError> {
    authenticator
        .change_password(
            &session.subject_id,
            &req.old_password,
            &req.new_password1,
            &req.new_password2,
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Password changed successfully"
    })))
}

/// Register a credential with its employee profile stub
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 200, description = "Credential created", body = crate::service::authenticator::RegisteredCredential),
        (status = 400, description = "Invalid fields or unknown role"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not ADMIN/HRD, or HRD asked for an ADMIN role"),
        (status = 501, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn register(
    session: Session,
    req: web::Json<RegisterReq>,
    authenticator: web::Data<Authenticator>,
) -> Result<impl Responder, AppError> {
    session.require_hr_or_admin()?;

    let created = authenticator
        .register(NewCredential {
            granted_by: session.role,
            email: &req.email,
            password: &req.password,
            role: &req.role,
            full_name: &req.full_name,
        })
        .await?;

    Ok(HttpResponse::Ok().json(created))
}
