use std::collections::HashMap;

use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::{
    auth::session::Session,
    error::AppError,
    model::attendance::AttendanceRecord,
    models::{AbsenceReq, RangeQuery},
    service::attendance::AttendanceLedger,
};

#[derive(Serialize, ToSchema)]
pub struct CheckInResponse {
    #[schema(example = "08:00:00")]
    pub check_in: String,
}

#[derive(Serialize, ToSchema)]
pub struct CheckOutResponse {
    #[schema(example = "17:00:00")]
    pub check_out: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceResponse {
    pub employee_id: String,
    #[schema(example = "Siti Rahma")]
    pub full_name: Option<String>,
    /// Local start of day, epoch seconds.
    #[schema(example = 1773162000)]
    pub day_key: i64,
    #[schema(example = "08:00:00")]
    pub check_in: Option<String>,
    #[schema(example = "17:00:00")]
    pub check_out: Option<String>,
    pub status_code: Option<i32>,
    #[schema(example = "Sick")]
    pub status_name: Option<String>,
    pub created_at: i64,
}

async fn describe(
    ledger: &AttendanceLedger,
    records: Vec<AttendanceRecord>,
) -> Result<Vec<AttendanceResponse>, AppError> {
    let full_names = ledger.full_names(&records).await?;
    let status_names: HashMap<i32, String> = ledger
        .statuses()
        .await?
        .into_iter()
        .map(|s| (s.code, s.name))
        .collect();

    Ok(records
        .into_iter()
        .map(|r| AttendanceResponse {
            full_name: full_names.get(&r.employee_id).cloned(),
            status_name: r.status_code.and_then(|c| status_names.get(&c).cloned()),
            employee_id: r.employee_id,
            day_key: r.day_key.0,
            check_in: r.check_in,
            check_out: r.check_out,
            status_code: r.status_code,
            created_at: r.created_at,
        })
        .collect())
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    responses(
        (status = 200, description = "Checked in successfully", body = CheckInResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No employee profile for this credential"),
        (status = 501, description = "Already checked in today", body = Object, example = json!({
            "status": 501,
            "message": "already checked in today"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    session: Session,
    ledger: web::Data<AttendanceLedger>,
) -> Result<impl Responder, AppError> {
    let check_in = ledger.check_in(&session.subject_id).await?;
    Ok(HttpResponse::Ok().json(CheckInResponse { check_in }))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Checked out successfully", body = CheckOutResponse),
        (status = 401, description = "Unauthorized"),
        (status = 501, description = "Not checked in yet or already checked out", body = Object, example = json!({
            "status": 501,
            "message": "not checked in yet today"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    session: Session,
    ledger: web::Data<AttendanceLedger>,
) -> Result<impl Responder, AppError> {
    let check_out = ledger.check_out(&session.subject_id).await?;
    Ok(HttpResponse::Ok().json(CheckOutResponse { check_out }))
}

/// Mark a day with a leave/absence status
#[utoipa::path(
    post,
    path = "/api/attendance/absence",
    request_body = AbsenceReq,
    responses(
        (status = 200, description = "Status recorded", body = Object, example = json!({
            "message": "Absence recorded",
            "day_key": 1773162000
        })),
        (status = 400, description = "Malformed body"),
        (status = 401, description = "Unauthorized"),
        (status = 501, description = "Unknown absence status"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn mark_absence(
    session: Session,
    req: web::Json<AbsenceReq>,
    ledger: web::Data<AttendanceLedger>,
) -> Result<impl Responder, AppError> {
    let day = ledger
        .mark_absence(&session.subject_id, req.day_key, req.status_code)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Absence recorded",
        "day_key": day.0
    })))
}

/// Own attendance within an inclusive day range
#[utoipa::path(
    get,
    path = "/api/attendance/self",
    params(RangeQuery),
    responses(
        (status = 200, description = "Own attendance records", body = [AttendanceResponse]),
        (status = 400, description = "Invalid range"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_self(
    session: Session,
    query: web::Query<RangeQuery>,
    ledger: web::Data<AttendanceLedger>,
) -> Result<impl Responder, AppError> {
    let records = ledger
        .list_by_range(Some(&session.subject_id), query.from, query.to)
        .await?;
    Ok(HttpResponse::Ok().json(describe(&ledger, records).await?))
}

/// Everyone's attendance within an inclusive day range (ADMIN/HRD)
#[utoipa::path(
    get,
    path = "/api/attendance/admin",
    params(RangeQuery),
    responses(
        (status = 200, description = "Attendance across all employees", body = [AttendanceResponse]),
        (status = 400, description = "Invalid range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_admin(
    session: Session,
    query: web::Query<RangeQuery>,
    ledger: web::Data<AttendanceLedger>,
) -> Result<impl Responder, AppError> {
    session.require_hr_or_admin()?;

    let records = ledger.list_by_range(None, query.from, query.to).await?;
    Ok(HttpResponse::Ok().json(describe(&ledger, records).await?))
}

/// Leave/absence status catalogue
#[utoipa::path(
    get,
    path = "/api/attendance/statuses",
    responses(
        (status = 200, description = "Known absence statuses", body = [crate::model::absence_status::AbsenceStatus]),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn statuses(
    _session: Session,
    ledger: web::Data<AttendanceLedger>,
) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(ledger.statuses().await?))
}
