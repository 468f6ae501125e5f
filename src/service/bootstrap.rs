use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::password::{generate_password, hash_password},
    clock::Clock,
    error::{AppError, FieldErrors},
    model::{credential::Credential, employee::EmployeeProfile, role::Role},
    store::{CredentialStore, StoreError},
};

/// Returned once. The plaintext password cannot be recovered afterwards.
#[derive(Debug, Serialize, ToSchema)]
pub struct InitialAdmin {
    #[schema(example = "admin@ptmajujaya.com")]
    pub email: String,
    #[schema(example = "q8ZkP2xa")]
    pub password: String,
    pub role: Role,
}

/// One-time creation of the first administrator.
pub struct BootstrapService {
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    email_tld: String,
}

/// `"PT Maju Jaya"` -> `"ptmajujaya"`
pub fn company_slug(company_name: &str) -> String {
    company_name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn validate(admin_name: &str, company_name: &str) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();

    let admin_len = admin_name.chars().count();
    if !(3..=100).contains(&admin_len) {
        errors.insert(
            "admin_name".into(),
            "admin name must be between 3 and 100 characters".into(),
        );
    }

    let company_len = company_name.chars().count();
    if !(2..=100).contains(&company_len) {
        errors.insert(
            "company_name".into(),
            "company name must be between 2 and 100 characters".into(),
        );
    } else if company_slug(company_name).is_empty() {
        errors.insert(
            "company_name".into(),
            "company name must contain a letter or digit".into(),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

impl BootstrapService {
    pub fn new(credentials: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>, email_tld: &str) -> Self {
        Self {
            credentials,
            clock,
            email_tld: email_tld.trim_start_matches('.').to_string(),
        }
    }

    pub async fn is_initialized(&self) -> Result<bool, AppError> {
        Ok(self.credentials.count().await? > 0)
    }

    #[instrument(name = "bootstrap_initialize", skip(self))]
    pub async fn initialize(
        &self,
        admin_name: &str,
        company_name: &str,
    ) -> Result<InitialAdmin, AppError> {
        let admin_name = admin_name.trim();
        let company_name = company_name.trim();
        validate(admin_name, company_name)?;

        let email = format!("admin@{}.{}", company_slug(company_name), self.email_tld);
        let password = generate_password();
        let now = self.clock.now().timestamp();

        let credential = Credential {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash: hash_password(&password).map_err(AppError::internal)?,
            role: Role::Admin,
            active: true,
            created_at: now,
            last_login_at: None,
        };
        let profile = EmployeeProfile {
            id: credential.id.clone(),
            full_name: admin_name.to_string(),
            created_at: now,
        };

        let created = match self.credentials.insert_initial(&credential, &profile).await {
            Ok(created) => created,
            Err(StoreError::DuplicateKey) => false,
            Err(e) => return Err(e.into()),
        };
        if !created {
            warn!("Bootstrap attempted on an initialized system");
            return Err(AppError::AlreadyInitialized);
        }

        info!(email = %credential.email, "Initial administrator created");

        Ok(InitialAdmin {
            email: credential.email,
            password,
            role: Role::Admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use chrono::{FixedOffset, TimeZone, Utc};

    use super::*;
    use crate::{
        auth::password::{GENERATED_PASSWORD_LEN, verify_password},
        clock::FixedClock,
        store::{EmployeeDirectory, MemoryStore},
    };

    fn service() -> (BootstrapService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 11, 1, 0, 0).unwrap(),
            FixedOffset::east_opt(7 * 3600).unwrap(),
        ));
        (BootstrapService::new(store.clone(), clock, "com"), store)
    }

    #[test]
    fn slug_keeps_only_lowercase_alphanumerics() {
        assert_eq!(company_slug("PT Maju Jaya"), "ptmajujaya");
        assert_eq!(company_slug("A&B Co. 2"), "abco2");
        assert_eq!(company_slug("-- --"), "");
    }

    #[actix_web::test]
    async fn first_call_creates_an_admin() {
        let (svc, store) = service();
        assert!(!svc.is_initialized().await.unwrap());

        let admin = svc.initialize("Budi Santoso", "PT Maju Jaya").await.unwrap();
        assert_eq!(admin.email, "admin@ptmajujaya.com");
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.password.len(), GENERATED_PASSWORD_LEN);

        let stored = store.find_by_email(&admin.email).await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Admin);
        assert!(verify_password(&admin.password, &stored.password_hash));
        assert_eq!(
            store.find_profile(&stored.id).await.unwrap().unwrap().full_name,
            "Budi Santoso"
        );
        assert!(svc.is_initialized().await.unwrap());
    }

    #[actix_web::test]
    async fn second_call_is_rejected_without_side_effects() {
        let (svc, store) = service();
        svc.initialize("Budi Santoso", "PT Maju Jaya").await.unwrap();

        let err = svc.initialize("Another Admin", "Other Corp").await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyInitialized));
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.find_by_email("admin@othercorp.com").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn invalid_names_are_field_errors() {
        let (svc, store) = service();
        match svc.initialize("Al", "!!").await.unwrap_err() {
            AppError::Validation(fields) => {
                assert!(fields.contains_key("admin_name"));
                assert!(fields.contains_key("company_name"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[test]
    fn concurrent_bootstraps_yield_a_single_admin() {
        let (svc, store) = service();
        let barrier = Barrier::new(4);

        let outcomes: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let svc = &svc;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        futures::executor::block_on(
                            svc.initialize("Budi Santoso", &format!("Company {i}")),
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, AppError::AlreadyInitialized))
        );
        assert_eq!(futures::executor::block_on(store.count()).unwrap(), 1);
    }
}
