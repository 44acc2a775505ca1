//! User accounts and roles.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_DISPLAY_NAME_LEN: usize = 100;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

/// Errors that can occur during identity operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid email address: '{0}'")]
    InvalidEmail(String),

    #[error("Display name must be 1 to 100 characters")]
    InvalidDisplayName,

    #[error("Password does not meet the policy: {0}")]
    WeakPassword(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User {0} is deactivated")]
    Deactivated(UserId),

    #[error("The Student role cannot be revoked")]
    CannotRevokeStudent,

    #[error("Unknown role: '{0}'")]
    UnknownRole(String),
}

/// A role granted to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Instructor => "Instructor",
            Role::Admin => "Admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            _ => Err(IdentityError::UnknownRole(s.to_string())),
        }
    }
}

/// A normalized (trimmed, lower-cased) email address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        let normalized = value.trim().to_lowercase();
        let invalid = || IdentityError::InvalidEmail(value.trim().to_string());

        let (local, domain) = normalized.split_once('@').ok_or_else(invalid)?;
        if local.is_empty()
            || domain.is_empty()
            || domain.contains('@')
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
            || normalized.len() > 254
            || normalized.contains(char::is_whitespace)
        {
            return Err(invalid());
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks a plain-text password against the account password policy.
pub fn validate_password(password: &str) -> Result<(), IdentityError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(IdentityError::WeakPassword(format!(
            "must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(IdentityError::WeakPassword(format!(
            "must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }
    if !password.chars().any(char::is_alphabetic) || !password.chars().any(|c| c.is_ascii_digit())
    {
        return Err(IdentityError::WeakPassword(
            "must contain a letter and a digit".to_string(),
        ));
    }
    Ok(())
}

fn validate_display_name(name: &str) -> Result<String, IdentityError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_DISPLAY_NAME_LEN {
        return Err(IdentityError::InvalidDisplayName);
    }
    Ok(name.to_string())
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub display_name: String,
    pub password_hash: String,
    pub roles: BTreeSet<Role>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new active student account. The password must already be hashed.
    pub fn register(
        email: Email,
        display_name: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<Self, IdentityError> {
        Ok(Self {
            id: UserId::new(),
            email,
            display_name: validate_display_name(display_name)?,
            password_hash,
            roles: BTreeSet::from([Role::Student]),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Grants a role. Returns false when the user already had it.
    pub fn grant(&mut self, role: Role, now: DateTime<Utc>) -> bool {
        let added = self.roles.insert(role);
        if added {
            self.updated_at = now;
        }
        added
    }

    /// Revokes a role. Returns false when the user did not have it.
    pub fn revoke(&mut self, role: Role, now: DateTime<Utc>) -> Result<bool, IdentityError> {
        if role == Role::Student {
            return Err(IdentityError::CannotRevokeStudent);
        }
        let removed = self.roles.remove(&role);
        if removed {
            self.updated_at = now;
        }
        Ok(removed)
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }

    pub fn ensure_active(&self) -> Result<(), IdentityError> {
        if self.is_active {
            Ok(())
        } else {
            Err(IdentityError::Deactivated(self.id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::register(
            Email::parse("Ada@Example.com").unwrap(),
            " Ada ",
            "hash".to_string(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn email_is_normalized() {
        let email = Email::parse("  Ada.Lovelace@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "ada.lovelace@example.com");
    }

    #[test]
    fn invalid_emails_are_rejected() {
        for bad in ["", "ada", "@example.com", "ada@", "ada@example", "a@b@c.com", "a b@c.com"] {
            assert!(Email::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn password_policy() {
        assert!(validate_password("abc12345").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("12345678").is_err());
    }

    #[test]
    fn registered_user_is_active_student() {
        let user = user();
        assert_eq!(user.display_name, "Ada");
        assert!(user.is_active);
        assert!(user.has_role(Role::Student));
        assert!(!user.is_admin());
    }

    #[test]
    fn empty_display_name_is_rejected() {
        let result = User::register(
            Email::parse("a@b.co").unwrap(),
            "   ",
            "hash".to_string(),
            Utc::now(),
        );
        assert_eq!(result, Err(IdentityError::InvalidDisplayName));
    }

    #[test]
    fn grant_and_revoke_roles() {
        let mut user = user();
        assert!(user.grant(Role::Instructor, Utc::now()));
        assert!(!user.grant(Role::Instructor, Utc::now()));
        assert!(user.revoke(Role::Instructor, Utc::now()).unwrap());
        assert!(!user.revoke(Role::Admin, Utc::now()).unwrap());
        assert_eq!(
            user.revoke(Role::Student, Utc::now()),
            Err(IdentityError::CannotRevokeStudent)
        );
    }

    #[test]
    fn deactivated_user_fails_active_check() {
        let mut user = user();
        user.deactivate(Utc::now());
        assert_eq!(user.ensure_active(), Err(IdentityError::Deactivated(user.id)));
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }
}
