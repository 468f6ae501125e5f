use super::role::Role;

/// Login identity. Never serialized, so the hash stays inside the crate.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,
    /// Always stored lower-cased.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
