use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

use crate::{
    api::attendance::{AttendanceResponse, CheckInResponse, CheckOutResponse},
    auth::handlers::CheckInitResponse,
    model::{absence_status::AbsenceStatus, role::Role},
    models::{AbsenceReq, ChangePasswordReq, InitDataReq, LoginReqDto, RegisterReq},
    service::{
        authenticator::{LoginInfo, LoginResponse, RegisteredCredential},
        bootstrap::InitialAdmin,
    },
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Presence API",
        version = "1.0.0",
        description = r#"
## Authentication & Attendance Ledger

Back-office API for an HR system: one-time bootstrap of the first
administrator, credential login issuing signed bearer tokens, role-gated
administration, and a per-employee, per-day attendance ledger.

### Conventions
- Day keys are epoch seconds of the local start of day; any instant within
  the day is accepted and normalized.
- Times of day are `HH:MM:SS`.
- Rejected business actions (already checked in, bad credentials, ...)
  answer **501** with `{status, message}`.
"#,
    ),
    paths(
        crate::auth::handlers::init_data,
        crate::auth::handlers::check_init,
        crate::auth::handlers::login,
        crate::auth::handlers::change_password,
        crate::auth::handlers::register,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::mark_absence,
        crate::api::attendance::list_self,
        crate::api::attendance::list_admin,
        crate::api::attendance::statuses
    ),
    components(
        schemas(
            InitDataReq,
            InitialAdmin,
            CheckInitResponse,
            LoginReqDto,
            LoginResponse,
            LoginInfo,
            ChangePasswordReq,
            RegisterReq,
            RegisteredCredential,
            Role,
            AbsenceReq,
            AbsenceStatus,
            AttendanceResponse,
            CheckInResponse,
            CheckOutResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Bootstrap, login and credential APIs"),
        (name = "Attendance", description = "Attendance ledger APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
