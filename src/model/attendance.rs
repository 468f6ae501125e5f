use serde::{Deserialize, Serialize};

/// Start-of-day instant (epoch seconds) identifying a local calendar day.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(pub i64);

/// One employee's attendance for one day. `(employee_id, day_key)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub employee_id: String,
    pub day_key: DayKey,
    /// `HH:MM:SS`
    pub check_in: Option<String>,
    /// `HH:MM:SS`
    pub check_out: Option<String>,
    pub status_code: Option<i32>,
    pub created_at: i64,
}

impl AttendanceRecord {
    pub fn new(employee_id: &str, day_key: DayKey, created_at: i64) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            day_key,
            check_in: None,
            check_out: None,
            status_code: None,
            created_at,
        }
    }
}
