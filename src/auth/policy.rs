//! Role gate. Pure functions of the session; no store access.

use crate::{auth::session::Session, error::AppError, model::role::Role};

/// Roles allowed to list and manage other employees' data.
pub const ADMINISTRATIVE: &[Role] = &[Role::Admin, Role::Hrd];

pub fn authorize(session: &Session, required: &[Role]) -> Result<(), AppError> {
    debug_assert!(!required.is_empty(), "role set must not be empty");
    if required.contains(&session.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// ADMIN may hand out any role, HRD anything below ADMIN.
pub fn authorize_grant(granter: Role, granted: Role) -> Result<(), AppError> {
    let allowed = match granter {
        Role::Admin => true,
        Role::Hrd => granted != Role::Admin,
        Role::Employee => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

impl Session {
    pub fn require_hr_or_admin(&self) -> Result<(), AppError> {
        authorize(self, ADMINISTRATIVE)
    }
}
