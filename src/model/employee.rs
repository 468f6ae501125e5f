use serde::{Deserialize, Serialize};

/// Employee-profile stub. Its id is the owning credential's id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmployeeProfile {
    pub id: String,
    pub full_name: String,
    pub created_at: i64,
}
