use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Entry of the leave/absence enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AbsenceStatus {
    #[schema(example = 2)]
    pub code: i32,
    #[schema(example = "Sick")]
    pub name: String,
}

/// Seed rows for a fresh deployment.
pub fn default_statuses() -> Vec<AbsenceStatus> {
    [(1, "Permission"), (2, "Sick"), (3, "Annual leave"), (4, "Business travel")]
        .into_iter()
        .map(|(code, name)| AbsenceStatus {
            code,
            name: name.to_string(),
        })
        .collect()
}
