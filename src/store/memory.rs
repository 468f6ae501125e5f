use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{
    AttendanceStore, CredentialStore, EmployeeDirectory, StatusCatalog, StoreError, StoreResult,
};
use crate::model::{
    absence_status::{AbsenceStatus, default_statuses},
    attendance::{AttendanceRecord, DayKey},
    credential::Credential,
    employee::EmployeeProfile,
};

#[derive(Default)]
struct Inner {
    credentials: HashMap<String, Credential>,
    /// normalized email -> credential id
    emails: HashMap<String, String>,
    profiles: HashMap<String, EmployeeProfile>,
    statuses: BTreeMap<i32, AbsenceStatus>,
    /// keyed by (day, employee) so range scans come out ordered
    attendance: BTreeMap<(DayKey, String), AttendanceRecord>,
}

impl Inner {
    fn insert_pair(&mut self, credential: &Credential, profile: &EmployeeProfile) -> StoreResult<()> {
        if self.emails.contains_key(&credential.email)
            || self.credentials.contains_key(&credential.id)
        {
            return Err(StoreError::DuplicateKey);
        }
        self.emails
            .insert(credential.email.clone(), credential.id.clone());
        self.credentials
            .insert(credential.id.clone(), credential.clone());
        self.profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    fn record_mut(&mut self, employee_id: &str, day: DayKey) -> Option<&mut AttendanceRecord> {
        self.attendance.get_mut(&(day, employee_id.to_string()))
    }
}

/// Process-local store. Every method runs inside one lock acquisition, so
/// each conditional write is atomic.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let statuses = default_statuses()
            .into_iter()
            .map(|s| (s.code, s))
            .collect();
        Self {
            inner: RwLock::new(Inner {
                statuses,
                ..Inner::default()
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("memory store poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("memory store poisoned")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn count(&self) -> StoreResult<u64> {
        Ok(self.read().credentials.len() as u64)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Credential>> {
        let inner = self.read();
        Ok(inner
            .emails
            .get(email)
            .and_then(|id| inner.credentials.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Credential>> {
        Ok(self.read().credentials.get(id).cloned())
    }

    async fn insert(&self, credential: &Credential, profile: &EmployeeProfile) -> StoreResult<()> {
        self.write().insert_pair(credential, profile)
    }

    async fn insert_initial(
        &self,
        credential: &Credential,
        profile: &EmployeeProfile,
    ) -> StoreResult<bool> {
        let mut inner = self.write();
        if !inner.credentials.is_empty() {
            return Ok(false);
        }
        inner.insert_pair(credential, profile)?;
        Ok(true)
    }

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> StoreResult<bool> {
        match self.write().credentials.get_mut(id) {
            Some(c) => {
                c.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_last_login(&self, id: &str, at: i64) -> StoreResult<()> {
        if let Some(c) = self.write().credentials.get_mut(id) {
            c.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn list_emails(&self) -> StoreResult<Vec<String>> {
        Ok(self.read().emails.keys().cloned().collect())
    }
}

#[async_trait]
impl EmployeeDirectory for MemoryStore {
    async fn find_profile(&self, id: &str) -> StoreResult<Option<EmployeeProfile>> {
        Ok(self.read().profiles.get(id).cloned())
    }
}

#[async_trait]
impl StatusCatalog for MemoryStore {
    async fn find_status(&self, code: i32) -> StoreResult<Option<AbsenceStatus>> {
        Ok(self.read().statuses.get(&code).cloned())
    }

    async fn list_statuses(&self) -> StoreResult<Vec<AbsenceStatus>> {
        Ok(self.read().statuses.values().cloned().collect())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find(&self, employee_id: &str, day: DayKey) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self
            .read()
            .attendance
            .get(&(day, employee_id.to_string()))
            .cloned())
    }

    async fn insert(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let mut inner = self.write();
        let key = (record.day_key, record.employee_id.clone());
        if inner.attendance.contains_key(&key) {
            return Err(StoreError::DuplicateKey);
        }
        inner.attendance.insert(key, record.clone());
        Ok(())
    }

    async fn set_check_in(&self, employee_id: &str, day: DayKey, time: &str) -> StoreResult<bool> {
        let mut inner = self.write();
        match inner.record_mut(employee_id, day) {
            Some(r) if r.check_in.is_none() => {
                r.check_in = Some(time.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_check_out(
        &self,
        employee_id: &str,
        day: DayKey,
        time: &str,
    ) -> StoreResult<bool> {
        let mut inner = self.write();
        match inner.record_mut(employee_id, day) {
            Some(r) if r.check_in.is_some() && r.check_out.is_none() => {
                r.check_out = Some(time.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_status(
        &self,
        employee_id: &str,
        day: DayKey,
        status_code: i32,
    ) -> StoreResult<bool> {
        let mut inner = self.write();
        match inner.record_mut(employee_id, day) {
            Some(r) => {
                r.status_code = Some(status_code);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_range(
        &self,
        employee_id: Option<&str>,
        from: DayKey,
        to: DayKey,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        if from > to {
            return Ok(Vec::new());
        }
        let inner = self.read();
        let lower = (from, String::new());
        Ok(inner
            .attendance
            .range(lower..)
            .take_while(|((day, _), _)| *day <= to)
            .filter(|((_, emp), _)| employee_id.map_or(true, |id| emp.as_str() == id))
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(emp: &str, day: i64) -> AttendanceRecord {
        AttendanceRecord::new(emp, DayKey(day), 0)
    }

    #[actix_web::test]
    async fn attendance_insert_rejects_same_natural_key() {
        let store = MemoryStore::new();
        AttendanceStore::insert(&store, &record("e1", 100)).await.unwrap();
        let second = AttendanceStore::insert(&store, &record("e1", 100)).await;
        assert!(matches!(second, Err(StoreError::DuplicateKey)));
        AttendanceStore::insert(&store, &record("e2", 100)).await.unwrap();
    }

    #[actix_web::test]
    async fn conditional_setters_only_fire_once() {
        let store = MemoryStore::new();
        AttendanceStore::insert(&store, &record("e1", 100)).await.unwrap();

        assert!(!store.set_check_out("e1", DayKey(100), "17:00:00").await.unwrap());
        assert!(store.set_check_in("e1", DayKey(100), "08:00:00").await.unwrap());
        assert!(!store.set_check_in("e1", DayKey(100), "09:00:00").await.unwrap());
        assert!(store.set_check_out("e1", DayKey(100), "17:00:00").await.unwrap());
        assert!(!store.set_check_out("e1", DayKey(100), "18:00:00").await.unwrap());

        let r = store.find("e1", DayKey(100)).await.unwrap().unwrap();
        assert_eq!(r.check_in.as_deref(), Some("08:00:00"));
        assert_eq!(r.check_out.as_deref(), Some("17:00:00"));
    }

    #[actix_web::test]
    async fn range_is_inclusive_and_ordered() {
        let store = MemoryStore::new();
        for (emp, day) in [("b", 200), ("a", 200), ("a", 100), ("c", 300), ("a", 400)] {
            AttendanceStore::insert(&store, &record(emp, day)).await.unwrap();
        }

        let all = store.list_range(None, DayKey(100), DayKey(300)).await.unwrap();
        let keys: Vec<_> = all
            .iter()
            .map(|r| (r.day_key.0, r.employee_id.as_str()))
            .collect();
        assert_eq!(keys, vec![(100, "a"), (200, "a"), (200, "b"), (300, "c")]);

        let only_a = store
            .list_range(Some("a"), DayKey(0), DayKey(1_000))
            .await
            .unwrap();
        assert_eq!(only_a.len(), 3);
    }

    #[actix_web::test]
    async fn seeded_statuses_are_listed() {
        let store = MemoryStore::new();
        let statuses = store.list_statuses().await.unwrap();
        assert_eq!(statuses.len(), 4);
        assert!(store.find_status(2).await.unwrap().is_some());
        assert!(store.find_status(99).await.unwrap().is_none());
    }
}
