use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct InitDataReq {
    #[schema(example = "Budi Santoso")]
    pub admin_name: String,
    #[schema(example = "PT Maju Jaya")]
    pub company_name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "admin@ptmajujaya.com", format = "email")]
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordReq {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

/// Role arrives as a raw string so unknown values become a field error
/// instead of a generic body parse failure.
#[derive(Deserialize, ToSchema)]
pub struct RegisterReq {
    #[schema(example = "siti@ptmajujaya.com", format = "email")]
    pub email: String,
    pub password: String,
    #[schema(example = "EMPLOYEE")]
    pub role: String,
    #[schema(example = "Siti Rahma")]
    pub full_name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AbsenceReq {
    /// Any instant within the target day, epoch seconds.
    #[schema(example = 1773162000)]
    pub day_key: i64,
    #[schema(example = 2)]
    pub status_code: i32,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RangeQuery {
    /// First day, epoch seconds (inclusive).
    pub from: i64,
    /// Last day, epoch seconds (inclusive).
    pub to: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// credential id
    pub sub: String,
    pub email: String,
    /// Kept as a string; unknown roles fail validation explicitly.
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}
