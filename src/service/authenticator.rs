use std::{str::FromStr, sync::Arc};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{
        jwt::TokenKeys,
        policy::authorize_grant,
        password::{burn_verification, hash_password, verify_password},
        session::Session,
    },
    clock::Clock,
    error::{AppError, FieldErrors},
    model::{
        credential::{Credential, normalize_email},
        employee::EmployeeProfile,
        role::Role,
    },
    store::{CredentialStore, EmployeeDirectory, StoreError},
    utils::{email_cache::EmailCache, email_filter::EmailFilter},
};

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginInfo {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub full_name: Option<String>,
    /// Previous login, epoch seconds.
    pub last_login_at: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub info: LoginInfo,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisteredCredential {
    pub id: String,
    pub email: String,
    pub role: Role,
}

pub struct NewCredential<'a> {
    /// Role of the session doing the registration.
    pub granted_by: Role,
    pub email: &'a str,
    pub password: &'a str,
    pub role: &'a str,
    pub full_name: &'a str,
}

/// Verifies credentials and issues / validates session tokens.
pub struct Authenticator {
    credentials: Arc<dyn CredentialStore>,
    directory: Arc<dyn EmployeeDirectory>,
    clock: Arc<dyn Clock>,
    keys: TokenKeys,
    email_filter: Arc<EmailFilter>,
    email_cache: Arc<EmailCache>,
}

impl Authenticator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        directory: Arc<dyn EmployeeDirectory>,
        clock: Arc<dyn Clock>,
        keys: TokenKeys,
        email_filter: Arc<EmailFilter>,
        email_cache: Arc<EmailCache>,
    ) -> Self {
        Self {
            credentials,
            directory,
            clock,
            keys,
            email_filter,
            email_cache,
        }
    }

    #[instrument(name = "auth_login", skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AppError> {
        let email = normalize_email(email);

        let mut errors = FieldErrors::new();
        if email.is_empty() || !email.contains('@') {
            errors.insert("email".into(), "a valid email is required".into());
        }
        if password.is_empty() {
            errors.insert("password".into(), "password is required".into());
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        debug!("Fetching credential");
        let credential = match self.credentials.find_by_email(&email).await? {
            Some(c) if c.active => c,
            _ => {
                burn_verification(password);
                info!("Invalid credentials");
                return Err(AppError::InvalidCredentials);
            }
        };

        if !verify_password(password, &credential.password_hash) {
            info!("Invalid credentials");
            return Err(AppError::InvalidCredentials);
        }

        let now = self.clock.now().timestamp();
        let (token, _) = self
            .keys
            .generate_access_token(&credential.id, &credential.email, credential.role, now)
            .map_err(AppError::internal)?;

        // stale last-login is not worth failing the login over
        if let Err(e) = self.credentials.touch_last_login(&credential.id, now).await {
            warn!(error = %e, "Failed to update last_login_at");
        }

        let profile = self.directory.find_profile(&credential.id).await?;

        info!(subject_id = %credential.id, "Login successful");

        Ok(LoginResponse {
            token,
            info: LoginInfo {
                id: credential.id,
                email: credential.email,
                role: credential.role,
                full_name: profile.map(|p| p.full_name),
                last_login_at: credential.last_login_at,
            },
        })
    }

    pub async fn change_password(
        &self,
        subject_id: &str,
        old_password: &str,
        new_password1: &str,
        new_password2: &str,
    ) -> Result<(), AppError> {
        if new_password1 != new_password2 {
            return Err(AppError::PasswordMismatch);
        }
        if new_password1.is_empty() {
            return Err(AppError::validation_field(
                "new_password1",
                "password must not be empty",
            ));
        }

        let credential = self
            .credentials
            .find_by_id(subject_id)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(old_password, &credential.password_hash) {
            info!(subject_id, "Password change rejected: old password mismatch");
            return Err(AppError::InvalidCredentials);
        }

        let hashed = hash_password(new_password1).map_err(AppError::internal)?;
        if !self
            .credentials
            .update_password_hash(subject_id, &hashed)
            .await?
        {
            return Err(AppError::NotFound("credential"));
        }

        info!(subject_id, "Password changed");
        Ok(())
    }

    /// Stateless: signature plus the clock decide.
    pub fn validate(&self, token: &str) -> Result<Session, AppError> {
        self.keys.verify_token(token, self.clock.now().timestamp())
    }

    /// true  => email AVAILABLE
    /// false => email TAKEN
    pub async fn is_email_available(&self, email: &str) -> Result<bool, AppError> {
        // cuckoo filter: a miss is definitive
        if !self.email_filter.might_exist(email) {
            return Ok(true);
        }

        // moka cache: fast positive
        if self.email_cache.is_taken(email).await {
            return Ok(false);
        }

        let taken = self.credentials.find_by_email(email).await?.is_some();
        if taken {
            self.email_cache.mark_taken(email).await;
        }
        Ok(!taken)
    }

    /// Creates a credential plus its employee-profile stub.
    pub async fn register(&self, req: NewCredential<'_>) -> Result<RegisteredCredential, AppError> {
        let email = normalize_email(req.email);
        let full_name = req.full_name.trim();

        let mut errors = FieldErrors::new();
        if email.is_empty() || !email.contains('@') {
            errors.insert("email".into(), "a valid email is required".into());
        }
        if req.password.is_empty() {
            errors.insert("password".into(), "password is required".into());
        }
        if full_name.is_empty() {
            errors.insert("full_name".into(), "full name is required".into());
        }
        let role = Role::from_str(req.role.trim());
        if role.is_err() {
            errors.insert("role".into(), "role must be one of ADMIN, HRD, EMPLOYEE".into());
        }
        let role = match role {
            Ok(r) if errors.is_empty() => r,
            _ => return Err(AppError::Validation(errors)),
        };
        authorize_grant(req.granted_by, role)?;

        if !self.is_email_available(&email).await? {
            return Err(AppError::DuplicateEmail);
        }

        let now = self.clock.now().timestamp();
        let credential = Credential {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash: hash_password(req.password).map_err(AppError::internal)?,
            role,
            active: true,
            created_at: now,
            last_login_at: None,
        };
        let profile = EmployeeProfile {
            id: credential.id.clone(),
            full_name: full_name.to_string(),
            created_at: now,
        };

        match self.credentials.insert(&credential, &profile).await {
            Ok(()) => {}
            // lost a race with a concurrent registration
            Err(StoreError::DuplicateKey) => return Err(AppError::DuplicateEmail),
            Err(e) => return Err(e.into()),
        }

        self.remember_email(&credential.email).await;
        info!(subject_id = %credential.id, role = %credential.role, "Credential registered");

        Ok(RegisteredCredential {
            id: credential.id,
            email: credential.email,
            role: credential.role,
        })
    }

    pub async fn remember_email(&self, email: &str) {
        self.email_filter.insert(email);
        self.email_cache.mark_taken(email).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::FixedClock, store::MemoryStore};
    use chrono::{FixedOffset, TimeZone, Utc};

    struct Fixture {
        auth: Authenticator,
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 11, 1, 0, 0).unwrap(),
            FixedOffset::east_opt(7 * 3600).unwrap(),
        ));
        let auth = Authenticator::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            TokenKeys::new("secret", 900),
            Arc::new(EmailFilter::new()),
            Arc::new(EmailCache::new()),
        );
        Fixture { auth, store, clock }
    }

    async fn seed(f: &Fixture, email: &str, password: &str, role: &str) -> RegisteredCredential {
        f.auth
            .register(NewCredential {
                granted_by: Role::Admin,
                email,
                password,
                role,
                full_name: "Siti Rahma",
            })
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn login_issues_a_token_that_validates() {
        let f = fixture();
        let created = seed(&f, "Siti@Corp.com", "pw-123", "HRD").await;

        let resp = f.auth.login("  siti@corp.COM ", "pw-123").await.unwrap();
        assert_eq!(resp.info.id, created.id);
        assert_eq!(resp.info.full_name.as_deref(), Some("Siti Rahma"));

        let session = f.auth.validate(&resp.token).unwrap();
        assert_eq!(session.subject_id, created.id);
        assert_eq!(session.role, Role::Hrd);
        assert_eq!(session.email, "siti@corp.com");

        let stored = f.store.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.last_login_at, Some(f.clock.now().timestamp()));
    }

    #[actix_web::test]
    async fn login_failures_are_indistinguishable() {
        let f = fixture();
        seed(&f, "a@corp.com", "right", "EMPLOYEE").await;

        let wrong_pw = f.auth.login("a@corp.com", "wrong").await.unwrap_err();
        let unknown = f.auth.login("b@corp.com", "right").await.unwrap_err();
        assert!(matches!(wrong_pw, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
    }

    #[actix_web::test]
    async fn token_expires_with_the_clock() {
        let f = fixture();
        seed(&f, "a@corp.com", "pw", "EMPLOYEE").await;
        let token = f.auth.login("a@corp.com", "pw").await.unwrap().token;

        f.clock.advance(chrono::Duration::seconds(899));
        assert!(f.auth.validate(&token).is_ok());
        f.clock.advance(chrono::Duration::seconds(1));
        assert!(matches!(f.auth.validate(&token), Err(AppError::TokenExpired)));
    }

    #[actix_web::test]
    async fn change_password_mismatch_leaves_hash_untouched() {
        let f = fixture();
        let created = seed(&f, "a@corp.com", "old", "EMPLOYEE").await;
        let before = f.store.find_by_id(&created.id).await.unwrap().unwrap().password_hash;

        let err = f
            .auth
            .change_password(&created.id, "old", "new-1", "new-2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PasswordMismatch));

        let after = f.store.find_by_id(&created.id).await.unwrap().unwrap().password_hash;
        assert_eq!(before, after);
    }

    #[actix_web::test]
    async fn change_password_requires_old_password() {
        let f = fixture();
        let created = seed(&f, "a@corp.com", "old", "EMPLOYEE").await;

        let err = f
            .auth
            .change_password(&created.id, "nope", "new", "new")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));

        f.auth
            .change_password(&created.id, "old", "new", "new")
            .await
            .unwrap();
        assert!(f.auth.login("a@corp.com", "old").await.is_err());
        assert!(f.auth.login("a@corp.com", "new").await.is_ok());
    }

    #[actix_web::test]
    async fn register_rejects_duplicates_and_unknown_roles() {
        let f = fixture();
        seed(&f, "a@corp.com", "pw", "EMPLOYEE").await;

        let dup = f
            .auth
            .register(NewCredential {
                granted_by: Role::Admin,
                email: "A@CORP.COM",
                password: "pw",
                role: "EMPLOYEE",
                full_name: "Other",
            })
            .await
            .unwrap_err();
        assert!(matches!(dup, AppError::DuplicateEmail));

        let bad_role = f
            .auth
            .register(NewCredential {
                granted_by: Role::Admin,
                email: "c@corp.com",
                password: "pw",
                role: "PEGAWAI",
                full_name: "Other",
            })
            .await
            .unwrap_err();
        match bad_role {
            AppError::Validation(fields) => assert!(fields.contains_key("role")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[actix_web::test]
    async fn availability_consults_store_on_filter_hit() {
        let f = fixture();
        // filter says "maybe", cache says nothing, store decides
        f.auth.email_filter.insert("ghost@corp.com");
        assert!(f.auth.is_email_available("ghost@corp.com").await.unwrap());

        seed(&f, "real@corp.com", "pw", "EMPLOYEE").await;
        assert!(!f.auth.is_email_available("real@corp.com").await.unwrap());
    }

    #[actix_web::test]
    async fn hrd_cannot_register_an_admin() {
        let f = fixture();

        let err = f
            .auth
            .register(NewCredential {
                granted_by: Role::Hrd,
                email: "boss@corp.com",
                password: "pw",
                role: "ADMIN",
                full_name: "Would Be Boss",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        assert!(f.store.find_by_email("boss@corp.com").await.unwrap().is_none());

        let hrd = f
            .auth
            .register(NewCredential {
                granted_by: Role::Hrd,
                email: "peer@corp.com",
                password: "pw",
                role: "HRD",
                full_name: "Peer",
            })
            .await
            .unwrap();
        assert_eq!(hrd.role, Role::Hrd);
    }
}
