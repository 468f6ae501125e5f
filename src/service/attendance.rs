//! Per-employee, per-day attendance state machine.
//!
//! Every transition is a conditional write against the store. A write that
//! loses a race re-reads the record and re-evaluates, so concurrent callers
//! for the same `(employee, day)` observe some serial order.

use std::{collections::HashMap, sync::Arc};

use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};

use crate::{
    clock::{Clock, normalize_epoch},
    error::AppError,
    model::{
        absence_status::AbsenceStatus,
        attendance::{AttendanceRecord, DayKey},
    },
    store::{AttendanceStore, EmployeeDirectory, StatusCatalog, StoreError},
};

/// Only reached when a record keeps changing under us, which a record that
/// is never deleted cannot do more than twice.
const MAX_ATTEMPTS: usize = 3;

pub struct AttendanceLedger {
    attendance: Arc<dyn AttendanceStore>,
    directory: Arc<dyn EmployeeDirectory>,
    statuses: Arc<dyn StatusCatalog>,
    clock: Arc<dyn Clock>,
}

fn contention(op: &str, employee_id: &str, day: DayKey) -> AppError {
    AppError::internal(anyhow!(
        "{op} for {employee_id} on {} did not settle after {MAX_ATTEMPTS} attempts",
        day.0
    ))
}

impl AttendanceLedger {
    pub fn new(
        attendance: Arc<dyn AttendanceStore>,
        directory: Arc<dyn EmployeeDirectory>,
        statuses: Arc<dyn StatusCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attendance,
            directory,
            statuses,
            clock,
        }
    }

    async fn ensure_employee(&self, employee_id: &str) -> Result<(), AppError> {
        match self.directory.find_profile(employee_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound("employee")),
        }
    }

    fn normalize(&self, field: &str, epoch_secs: i64) -> Result<DayKey, AppError> {
        normalize_epoch(epoch_secs, self.clock.offset())
            .ok_or_else(|| AppError::validation_field(field, "day is out of range"))
    }

    /// Returns the recorded check-in time.
    #[instrument(name = "ledger_check_in", skip(self))]
    pub async fn check_in(&self, employee_id: &str) -> Result<String, AppError> {
        self.ensure_employee(employee_id).await?;

        let day = self.clock.today();
        let time = self.clock.time_of_day();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attendance.find(employee_id, day).await? {
                None => {
                    let mut record =
                        AttendanceRecord::new(employee_id, day, self.clock.now().timestamp());
                    record.check_in = Some(time.clone());

                    match self.attendance.insert(&record).await {
                        Ok(()) => {
                            info!(check_in = %time, "Checked in");
                            return Ok(time);
                        }
                        Err(StoreError::DuplicateKey) => {
                            debug!(attempt, "Record created concurrently, retrying");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Some(existing) if existing.check_in.is_some() => {
                    return Err(AppError::AlreadyCheckedIn);
                }
                Some(_) => {
                    if self.attendance.set_check_in(employee_id, day, &time).await? {
                        info!(check_in = %time, "Checked in on marked day");
                        return Ok(time);
                    }
                    debug!(attempt, "Check-in lost a race, retrying");
                }
            }
        }

        warn!("Check-in did not settle");
        Err(contention("check-in", employee_id, day))
    }

    /// Returns the recorded check-out time.
    #[instrument(name = "ledger_check_out", skip(self))]
    pub async fn check_out(&self, employee_id: &str) -> Result<String, AppError> {
        self.ensure_employee(employee_id).await?;

        let day = self.clock.today();
        let time = self.clock.time_of_day();

        for attempt in 1..=MAX_ATTEMPTS {
            let record = self
                .attendance
                .find(employee_id, day)
                .await?
                .ok_or(AppError::NotCheckedInYet)?;

            let check_in = match (&record.check_in, &record.check_out) {
                (None, _) => return Err(AppError::NotCheckedInYet),
                (Some(_), Some(_)) => return Err(AppError::AlreadyCheckedOut),
                (Some(check_in), None) => check_in,
            };

            // HH:MM:SS compares correctly as text
            if time.as_str() < check_in.as_str() {
                return Err(AppError::CheckOutBeforeCheckIn);
            }

            if self.attendance.set_check_out(employee_id, day, &time).await? {
                info!(check_out = %time, "Checked out");
                return Ok(time);
            }
            debug!(attempt, "Check-out lost a race, retrying");
        }

        warn!("Check-out did not settle");
        Err(contention("check-out", employee_id, day))
    }

    /// Sets the day's status, keeping any check-in/out times already there.
    /// Past and future days are allowed.
    #[instrument(name = "ledger_mark_absence", skip(self))]
    pub async fn mark_absence(
        &self,
        employee_id: &str,
        day_key: i64,
        status_code: i32,
    ) -> Result<DayKey, AppError> {
        let day = self.normalize("day_key", day_key)?;

        if self.statuses.find_status(status_code).await?.is_none() {
            return Err(AppError::UnknownStatus);
        }
        self.ensure_employee(employee_id).await?;

        for attempt in 1..=MAX_ATTEMPTS {
            if self
                .attendance
                .set_status(employee_id, day, status_code)
                .await?
            {
                info!(day = day.0, "Status overwritten on existing record");
                return Ok(day);
            }

            let mut record = AttendanceRecord::new(employee_id, day, self.clock.now().timestamp());
            record.status_code = Some(status_code);

            match self.attendance.insert(&record).await {
                Ok(()) => {
                    info!(day = day.0, "Absence recorded");
                    return Ok(day);
                }
                Err(StoreError::DuplicateKey) => {
                    debug!(attempt, "Record created concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!("Absence marking did not settle");
        Err(contention("mark-absence", employee_id, day))
    }

    /// `employee_id = None` lists every employee. Both bounds inclusive.
    pub async fn list_by_range(
        &self,
        employee_id: Option<&str>,
        from: i64,
        to: i64,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        let from = self.normalize("from", from)?;
        let to = self.normalize("to", to)?;
        if from > to {
            return Err(AppError::validation_field("from", "from must not be after to"));
        }

        Ok(self.attendance.list_range(employee_id, from, to).await?)
    }

    /// Full names of the employees appearing in `records`, keyed by id.
    pub async fn full_names(
        &self,
        records: &[AttendanceRecord],
    ) -> Result<HashMap<String, String>, AppError> {
        let mut names = HashMap::new();
        for record in records {
            if names.contains_key(&record.employee_id) {
                continue;
            }
            if let Some(profile) = self.directory.find_profile(&record.employee_id).await? {
                names.insert(record.employee_id.clone(), profile.full_name);
            }
        }
        Ok(names)
    }

    pub async fn statuses(&self) -> Result<Vec<AbsenceStatus>, AppError> {
        Ok(self.statuses.list_statuses().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use chrono::{Duration, FixedOffset, TimeZone, Utc};

    use super::*;
    use crate::{
        clock::FixedClock,
        model::{credential::Credential, employee::EmployeeProfile, role::Role},
        store::{CredentialStore, MemoryStore},
    };

    const SICK: i32 = 2;

    struct Fixture {
        ledger: AttendanceLedger,
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
    }

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    /// Clock at 08:00:00 local on 2026-03-11.
    async fn fixture(employees: &[&str]) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        for id in employees {
            let credential = Credential {
                id: id.to_string(),
                email: format!("{id}@corp.com"),
                password_hash: String::new(),
                role: Role::Employee,
                active: true,
                created_at: 0,
                last_login_at: None,
            };
            let profile = EmployeeProfile {
                id: id.to_string(),
                full_name: id.to_uppercase(),
                created_at: 0,
            };
            CredentialStore::insert(&*store, &credential, &profile)
                .await
                .unwrap();
        }

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 11, 1, 0, 0).unwrap(),
            offset(),
        ));
        let ledger = AttendanceLedger::new(store.clone(), store.clone(), store.clone(), clock.clone());
        Fixture { ledger, store, clock }
    }

    impl Fixture {
        async fn today_record(&self, employee_id: &str) -> Option<AttendanceRecord> {
            self.store
                .find(employee_id, self.clock.today())
                .await
                .unwrap()
        }
    }

    #[actix_web::test]
    async fn working_day_scenario() {
        let f = fixture(&["e1"]).await;

        assert_eq!(f.ledger.check_in("e1").await.unwrap(), "08:00:00");
        f.clock.advance(Duration::hours(9));
        assert_eq!(f.ledger.check_out("e1").await.unwrap(), "17:00:00");

        let done = f.today_record("e1").await.unwrap();
        assert_eq!(done.check_in.as_deref(), Some("08:00:00"));
        assert_eq!(done.check_out.as_deref(), Some("17:00:00"));

        f.clock.advance(Duration::minutes(30));
        assert!(matches!(
            f.ledger.check_out("e1").await,
            Err(AppError::AlreadyCheckedOut)
        ));
        assert_eq!(f.today_record("e1").await.unwrap(), done);
    }

    #[actix_web::test]
    async fn second_check_in_keeps_the_first_time() {
        let f = fixture(&["e1"]).await;
        f.ledger.check_in("e1").await.unwrap();

        f.clock.advance(Duration::minutes(5));
        assert!(matches!(
            f.ledger.check_in("e1").await,
            Err(AppError::AlreadyCheckedIn)
        ));
        assert_eq!(
            f.today_record("e1").await.unwrap().check_in.as_deref(),
            Some("08:00:00")
        );
    }

    #[actix_web::test]
    async fn check_out_without_check_in_touches_nothing() {
        let f = fixture(&["e1"]).await;
        assert!(matches!(
            f.ledger.check_out("e1").await,
            Err(AppError::NotCheckedInYet)
        ));
        assert!(f.today_record("e1").await.is_none());
    }

    #[actix_web::test]
    async fn next_local_day_starts_fresh() {
        let f = fixture(&["e1"]).await;
        f.ledger.check_in("e1").await.unwrap();

        // 17:00 UTC is 00:00 local the next day
        f.clock.advance(Duration::hours(16));
        assert_eq!(f.ledger.check_in("e1").await.unwrap(), "00:00:00");
    }

    #[actix_web::test]
    async fn absence_preserves_check_in() {
        let f = fixture(&["e1"]).await;
        f.ledger.check_in("e1").await.unwrap();

        // any instant within the day addresses it
        let afternoon = f.clock.today().0 + 15 * 3600;
        let day = f.ledger.mark_absence("e1", afternoon, SICK).await.unwrap();
        assert_eq!(day, f.clock.today());

        let record = f.today_record("e1").await.unwrap();
        assert_eq!(record.check_in.as_deref(), Some("08:00:00"));
        assert_eq!(record.status_code, Some(SICK));
    }

    #[actix_web::test]
    async fn check_in_on_a_marked_day_sets_the_time() {
        let f = fixture(&["e1"]).await;
        f.ledger
            .mark_absence("e1", f.clock.today().0, SICK)
            .await
            .unwrap();

        f.ledger.check_in("e1").await.unwrap();
        let record = f.today_record("e1").await.unwrap();
        assert_eq!(record.check_in.as_deref(), Some("08:00:00"));
        assert_eq!(record.status_code, Some(SICK));
    }

    #[actix_web::test]
    async fn unknown_status_and_employee_are_rejected() {
        let f = fixture(&["e1"]).await;
        let today = f.clock.today().0;

        assert!(matches!(
            f.ledger.mark_absence("e1", today, 99).await,
            Err(AppError::UnknownStatus)
        ));
        assert!(matches!(
            f.ledger.mark_absence("ghost", today, SICK).await,
            Err(AppError::NotFound("employee"))
        ));
        assert!(matches!(
            f.ledger.check_in("ghost").await,
            Err(AppError::NotFound("employee"))
        ));
        assert!(f.today_record("e1").await.is_none());
    }

    #[actix_web::test]
    async fn admin_range_lists_every_employee_in_order() {
        let f = fixture(&["e1", "e2"]).await;
        let d = f.clock.today().0;
        let day = 86_400;

        f.ledger.mark_absence("e2", d, SICK).await.unwrap();
        f.ledger.mark_absence("e1", d, SICK).await.unwrap();
        f.ledger.mark_absence("e1", d + 7 * day, 1).await.unwrap();
        f.ledger.mark_absence("e1", d + 8 * day, 1).await.unwrap();
        f.ledger.mark_absence("e2", d - day, 1).await.unwrap();

        let all = f.ledger.list_by_range(None, d, d + 7 * day).await.unwrap();
        let keys: Vec<_> = all
            .iter()
            .map(|r| (r.day_key.0 - d, r.employee_id.as_str()))
            .collect();
        assert_eq!(keys, vec![(0, "e1"), (0, "e2"), (7 * day, "e1")]);

        let mine = f
            .ledger
            .list_by_range(Some("e2"), d - day, d + 7 * day)
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.employee_id == "e2"));
    }

    #[actix_web::test]
    async fn inverted_range_is_a_validation_error() {
        let f = fixture(&["e1"]).await;
        let d = f.clock.today().0;
        assert!(matches!(
            f.ledger.list_by_range(None, d + 86_400, d).await,
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn concurrent_check_ins_yield_exactly_one_success() {
        const CALLERS: usize = 8;

        let f = futures::executor::block_on(fixture(&["e1"]));
        let barrier = Barrier::new(CALLERS);

        let outcomes: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    let ledger = &f.ledger;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        futures::executor::block_on(ledger.check_in("e1"))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(AppError::AlreadyCheckedIn)))
                .count(),
            CALLERS - 1
        );

        let today = f.clock.today();
        let records = futures::executor::block_on(f.store.list_range(None, today, today)).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn concurrent_check_outs_yield_exactly_one_success() {
        const CALLERS: usize = 8;

        let f = futures::executor::block_on(fixture(&["e1"]));
        futures::executor::block_on(f.ledger.check_in("e1")).unwrap();
        f.clock.advance(Duration::hours(9));
        let barrier = Barrier::new(CALLERS);

        let outcomes: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    let ledger = &f.ledger;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        futures::executor::block_on(ledger.check_out("e1"))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(AppError::AlreadyCheckedOut)))
                .count(),
            CALLERS - 1
        );

        let record = futures::executor::block_on(f.today_record("e1")).unwrap();
        assert_eq!(record.check_in.as_deref(), Some("08:00:00"));
        assert_eq!(record.check_out.as_deref(), Some("17:00:00"));
    }

    #[test]
    fn absence_and_check_in_race_merge_into_one_record() {
        let ids: Vec<String> = (0..16).map(|i| format!("e{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let f = futures::executor::block_on(fixture(&refs));
        let today = f.clock.today();

        for id in refs.iter().copied() {
            let barrier = Barrier::new(2);
            let (marked, checked) = std::thread::scope(|s| {
                let ledger = &f.ledger;
                let barrier = &barrier;
                let mark = s.spawn(move || {
                    barrier.wait();
                    futures::executor::block_on(ledger.mark_absence(id, today.0, SICK))
                });
                let check = s.spawn(move || {
                    barrier.wait();
                    futures::executor::block_on(ledger.check_in(id))
                });
                (mark.join().unwrap(), check.join().unwrap())
            });

            assert_eq!(marked.unwrap(), today);
            assert_eq!(checked.unwrap(), "08:00:00");

            let records =
                futures::executor::block_on(f.store.list_range(Some(id), today, today)).unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].check_in.as_deref(), Some("08:00:00"));
            assert_eq!(records[0].status_code, Some(SICK));
        }
    }

    #[actix_web::test]
    async fn full_names_resolve_each_employee_once() {
        let f = fixture(&["e1", "e2"]).await;
        let d = f.clock.today().0;
        f.ledger.mark_absence("e1", d, SICK).await.unwrap();
        f.ledger.mark_absence("e1", d + 86_400, SICK).await.unwrap();
        f.ledger.mark_absence("e2", d, SICK).await.unwrap();

        let records = f.ledger.list_by_range(None, d, d + 86_400).await.unwrap();
        let names = f.ledger.full_names(&records).await.unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names["e1"], "E1");
        assert_eq!(names["e2"], "E2");
    }
}
