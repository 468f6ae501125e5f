use std::str::FromStr;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::{FromRow, MySqlPool};

use super::{
    AttendanceStore, CredentialStore, EmployeeDirectory, StatusCatalog, StoreError, StoreResult,
};
use crate::model::{
    absence_status::AbsenceStatus,
    attendance::{AttendanceRecord, DayKey},
    credential::Credential,
    employee::EmployeeProfile,
    role::Role,
};

#[derive(FromRow)]
struct CredentialSql {
    id: String,
    email: String,
    password_hash: String,
    role: String,
    active: bool,
    created_at: i64,
    last_login_at: Option<i64>,
}

impl TryFrom<CredentialSql> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialSql) -> Result<Self, Self::Error> {
        let role = Role::from_str(&row.role)
            .map_err(|_| StoreError::Malformed(format!("unknown role {:?}", row.role)))?;
        Ok(Credential {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role,
            active: row.active,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        })
    }
}

#[derive(FromRow)]
struct AttendanceSql {
    employee_id: String,
    day_key: i64,
    check_in: Option<String>,
    check_out: Option<String>,
    status_code: Option<i32>,
    created_at: i64,
}

impl From<AttendanceSql> for AttendanceRecord {
    fn from(row: AttendanceSql) -> Self {
        AttendanceRecord {
            employee_id: row.employee_id,
            day_key: DayKey(row.day_key),
            check_in: row.check_in,
            check_out: row.check_out,
            status_code: row.status_code,
            created_at: row.created_at,
        }
    }
}

const CREDENTIAL_COLUMNS: &str =
    "id, email, password_hash, role, active, created_at, last_login_at";

const ATTENDANCE_COLUMNS: &str =
    "employee_id, day_key, check_in, check_out, status_code, created_at";

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

async fn insert_pair(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    credential: &Credential,
    profile: &EmployeeProfile,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO credentials (id, email, password_hash, role, active, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&credential.id)
    .bind(&credential.email)
    .bind(&credential.password_hash)
    .bind(credential.role.as_ref())
    .bind(credential.active)
    .bind(credential.created_at)
    .execute(&mut **tx)
    .await?;

    sqlx::query("INSERT INTO employee_profiles (id, full_name, created_at) VALUES (?, ?, ?)")
        .bind(&profile.id)
        .bind(&profile.full_name)
        .bind(profile.created_at)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

#[async_trait]
impl CredentialStore for MySqlStore {
    async fn count(&self) -> StoreResult<u64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM credentials")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Credential>> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE email = ?");
        sqlx::query_as::<_, CredentialSql>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(Credential::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Credential>> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = ?");
        sqlx::query_as::<_, CredentialSql>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Credential::try_from)
            .transpose()
    }

    async fn insert(&self, credential: &Credential, profile: &EmployeeProfile) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_pair(&mut tx, credential, profile).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_initial(
        &self,
        credential: &Credential,
        profile: &EmployeeProfile,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        // singleton row: the second bootstrapper hits the primary key
        let claimed = sqlx::query("INSERT INTO system_init (id, initialized_at) VALUES (1, ?)")
            .bind(credential.created_at)
            .execute(&mut *tx)
            .await;
        match claimed {
            Ok(_) => {}
            Err(e) => {
                return match StoreError::from(e) {
                    StoreError::DuplicateKey => Ok(false),
                    other => Err(other),
                };
            }
        }

        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM credentials")
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_pair(&mut tx, credential, profile).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE credentials SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_login(&self, id: &str, at: i64) -> StoreResult<()> {
        sqlx::query("UPDATE credentials SET last_login_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_emails(&self) -> StoreResult<Vec<String>> {
        let emails = sqlx::query_scalar::<_, String>("SELECT email FROM credentials")
            .fetch(&self.pool)
            .try_collect()
            .await?;
        Ok(emails)
    }
}

#[async_trait]
impl EmployeeDirectory for MySqlStore {
    async fn find_profile(&self, id: &str) -> StoreResult<Option<EmployeeProfile>> {
        let profile = sqlx::query_as::<_, EmployeeProfile>(
            "SELECT id, full_name, created_at FROM employee_profiles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }
}

#[async_trait]
impl StatusCatalog for MySqlStore {
    async fn find_status(&self, code: i32) -> StoreResult<Option<AbsenceStatus>> {
        let status = sqlx::query_as::<_, AbsenceStatus>(
            "SELECT code, name FROM absence_statuses WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    async fn list_statuses(&self) -> StoreResult<Vec<AbsenceStatus>> {
        let statuses = sqlx::query_as::<_, AbsenceStatus>(
            "SELECT code, name FROM absence_statuses ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(statuses)
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn find(&self, employee_id: &str, day: DayKey) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance_records WHERE employee_id = ? AND day_key = ?"
        );
        let row = sqlx::query_as::<_, AttendanceSql>(&sql)
            .bind(employee_id)
            .bind(day.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AttendanceRecord::from))
    }

    async fn insert(&self, record: &AttendanceRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance_records
                (employee_id, day_key, check_in, check_out, status_code, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.employee_id)
        .bind(record.day_key.0)
        .bind(&record.check_in)
        .bind(&record.check_out)
        .bind(record.status_code)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_check_in(&self, employee_id: &str, day: DayKey, time: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_records
            SET check_in = ?
            WHERE employee_id = ?
            AND day_key = ?
            AND check_in IS NULL
            "#,
        )
        .bind(time)
        .bind(employee_id)
        .bind(day.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_check_out(
        &self,
        employee_id: &str,
        day: DayKey,
        time: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_records
            SET check_out = ?
            WHERE employee_id = ?
            AND day_key = ?
            AND check_in IS NOT NULL
            AND check_out IS NULL
            "#,
        )
        .bind(time)
        .bind(employee_id)
        .bind(day.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_status(
        &self,
        employee_id: &str,
        day: DayKey,
        status_code: i32,
    ) -> StoreResult<bool> {
        // MySQL reports 0 affected rows when the value is unchanged, so
        // existence is checked separately.
        let result = sqlx::query(
            "UPDATE attendance_records SET status_code = ? WHERE employee_id = ? AND day_key = ?",
        )
        .bind(status_code)
        .bind(employee_id)
        .bind(day.0)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        Ok(self.find(employee_id, day).await?.is_some())
    }

    async fn list_range(
        &self,
        employee_id: Option<&str>,
        from: DayKey,
        to: DayKey,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let mut where_sql = String::from(" WHERE day_key BETWEEN ? AND ?");
        if employee_id.is_some() {
            where_sql.push_str(" AND employee_id = ?");
        }
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance_records{where_sql} ORDER BY day_key, employee_id"
        );

        let mut query = sqlx::query_as::<_, AttendanceSql>(&sql).bind(from.0).bind(to.0);
        if let Some(id) = employee_id {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(AttendanceRecord::from).collect())
    }
}
