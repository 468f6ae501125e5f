//! Persistence seams. Services only see these traits; `main` picks the
//! MySQL implementation when a database is configured and the in-memory
//! one otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use derive_more::Display;

use crate::model::{
    absence_status::AbsenceStatus,
    attendance::{AttendanceRecord, DayKey},
    credential::Credential,
    employee::EmployeeProfile,
};

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[derive(Debug, Display)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[display(fmt = "duplicate key")]
    DuplicateKey,
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),
    #[display(fmt = "malformed row: {}", _0)]
    Malformed(String),
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23000") {
                return StoreError::DuplicateKey;
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn count(&self) -> StoreResult<u64>;

    /// `email` must already be normalized.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Credential>>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Credential>>;

    /// Writes the credential and its profile stub as one unit.
    async fn insert(&self, credential: &Credential, profile: &EmployeeProfile) -> StoreResult<()>;

    /// Like `insert`, but only while no credential exists at all.
    /// Returns `false` when the store was already initialized.
    async fn insert_initial(
        &self,
        credential: &Credential,
        profile: &EmployeeProfile,
    ) -> StoreResult<bool>;

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> StoreResult<bool>;

    async fn touch_last_login(&self, id: &str, at: i64) -> StoreResult<()>;

    async fn list_emails(&self) -> StoreResult<Vec<String>>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_profile(&self, id: &str) -> StoreResult<Option<EmployeeProfile>>;
}

#[async_trait]
pub trait StatusCatalog: Send + Sync {
    async fn find_status(&self, code: i32) -> StoreResult<Option<AbsenceStatus>>;

    async fn list_statuses(&self) -> StoreResult<Vec<AbsenceStatus>>;
}

/// Conditional setters return `true` only when they changed the row, which
/// is how concurrent writers learn whether they won.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find(&self, employee_id: &str, day: DayKey) -> StoreResult<Option<AttendanceRecord>>;

    /// `DuplicateKey` if a record for the same employee and day exists.
    async fn insert(&self, record: &AttendanceRecord) -> StoreResult<()>;

    /// Sets check-in only where it is still unset.
    async fn set_check_in(&self, employee_id: &str, day: DayKey, time: &str) -> StoreResult<bool>;

    /// Sets check-out only where check-in is set and check-out is unset.
    async fn set_check_out(&self, employee_id: &str, day: DayKey, time: &str)
    -> StoreResult<bool>;

    async fn set_status(&self, employee_id: &str, day: DayKey, status_code: i32)
    -> StoreResult<bool>;

    /// Inclusive on both ends, ordered by day then employee.
    async fn list_range(
        &self,
        employee_id: Option<&str>,
        from: DayKey,
        to: DayKey,
    ) -> StoreResult<Vec<AttendanceRecord>>;
}

/// The four store handles the services are built from.
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub directory: Arc<dyn EmployeeDirectory>,
    pub statuses: Arc<dyn StatusCatalog>,
    pub attendance: Arc<dyn AttendanceStore>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            credentials: store.clone(),
            directory: store.clone(),
            statuses: store.clone(),
            attendance: store,
        }
    }

    pub fn mysql(pool: sqlx::MySqlPool) -> Self {
        let store = Arc::new(MySqlStore::new(pool));
        Self {
            credentials: store.clone(),
            directory: store.clone(),
            statuses: store.clone(),
            attendance: store,
        }
    }
}
