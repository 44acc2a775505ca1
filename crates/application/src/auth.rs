//! Password hashing, access tokens and the authenticated caller.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Duration, Utc};
use common::UserId;
use domain::identity::{Role, User};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{ApplicationError, Result};

/// Argon2id hashing of user passwords into PHC strings.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    /// Hash checked when no account matches a login, built on first use.
    pub(crate) decoy: Arc<OnceLock<String>>,
}

const DECOY_PASSWORD: &str = "no account has this password 0";

impl PasswordHasher {
    pub fn new(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            decoy: Arc::new(OnceLock::new()),
        }
    }

    /// Cheap parameters for tests.
    pub fn fast() -> Result<Self> {
        let params = Params::new(1024, 1, 1, None)
            .map_err(|e| ApplicationError::PasswordHash(e.to_string()))?;
        Ok(Self::new(params))
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| ApplicationError::PasswordHash(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Returns false on a wrong password. A malformed stored hash is an error.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| ApplicationError::PasswordHash(e.to_string()))?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(ApplicationError::PasswordHash(e.to_string())),
        }
    }

    /// Verifies `password` against a decoy hash with the same parameters, so
    /// a login for an unknown email costs as much as a wrong password.
    pub fn verify_decoy(&self, password: &str) -> Result<()> {
        let decoy = match self.decoy.get() {
            Some(hash) => hash,
            None => {
                let hash = self.hash(DECOY_PASSWORD)?;
                self.decoy.get_or_init(|| hash)
            }
        };
        self.verify(password, decoy)?;
        Ok(())
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub iat: i64,
    pub exp: i64,
}

/// A signed token and when it stops being accepted.
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies HS256 access tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<AccessToken> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.to_string(),
            roles: user.roles.iter().copied().collect(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(AccessToken {
            token,
            token_type: "Bearer",
            expires_at,
        })
    }

    /// Decodes a token, checking its signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected access token");
                ApplicationError::Unauthenticated
            })
    }
}

/// The user on whose behalf a service call runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub roles: BTreeSet<Role>,
}

impl Actor {
    pub fn new(user_id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApplicationError::forbidden("admin role required"))
        }
    }

    /// Instructors and admins may author courses.
    pub fn require_instructor(&self) -> Result<()> {
        if self.is_admin() || self.has_role(Role::Instructor) {
            Ok(())
        } else {
            Err(ApplicationError::forbidden("instructor role required"))
        }
    }

    /// Passes when the caller is `owner` or an admin.
    pub fn require_owner_or_admin(&self, owner: UserId) -> Result<()> {
        if self.user_id == owner || self.is_admin() {
            Ok(())
        } else {
            Err(ApplicationError::forbidden("not allowed to access this resource"))
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.roles.iter().copied())
    }
}
