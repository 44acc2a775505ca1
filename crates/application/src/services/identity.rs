//! Registration, login and role management.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::UserId;
use domain::identity::{Email, IdentityError, Role, User, validate_password};
use serde::{Deserialize, Serialize};
use store::{UserRepository, constraints};

use crate::auth::{AccessToken, Actor, PasswordHasher, TokenService};
use crate::error::{ApplicationError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

/// A user without the password hash, safe to return to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: Email,
    pub display_name: String,
    pub roles: BTreeSet<Role>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            roles: user.roles.clone(),
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// A successful login.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    #[serde(flatten)]
    pub token: AccessToken,
    pub user: UserProfile,
}

#[derive(Clone)]
pub struct IdentityService<S> {
    store: S,
    hasher: PasswordHasher,
    tokens: TokenService,
}

impl<S: UserRepository> IdentityService<S> {
    pub fn new(store: S, hasher: PasswordHasher, tokens: TokenService) -> Self {
        Self {
            store,
            hasher,
            tokens,
        }
    }

    #[tracing::instrument(skip(self, command), fields(email = %command.email))]
    pub async fn register(&self, command: RegisterUser) -> Result<UserProfile> {
        let email = Email::parse(&command.email)?;
        validate_password(&command.password)?;
        let hash = self.hasher.hash(&command.password)?;
        let user = User::register(email, &command.display_name, hash, Utc::now())?;

        self.store.insert_user(&user).await.map_err(|e| {
            if e.is_unique_violation(constraints::USERS_EMAIL) {
                ApplicationError::Conflict("email is already registered".to_string())
            } else {
                e.into()
            }
        })?;

        metrics::counter!("users_registered_total").increment(1);
        tracing::info!(user_id = %user.id, "user registered");
        Ok(UserProfile::from(&user))
    }

    /// Checks credentials and issues an access token. Unknown email, wrong
    /// password and deactivated account fail the same way.
    #[tracing::instrument(skip(self, email, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Session> {
        let invalid = || ApplicationError::from(IdentityError::InvalidCredentials);

        let Ok(email) = Email::parse(email) else {
            return Err(invalid());
        };
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            self.hasher.verify_decoy(password)?;
            metrics::counter!("auth_logins_total", "outcome" => "failed").increment(1);
            return Err(invalid());
        };
        if !self.hasher.verify(password, &user.password_hash)? || !user.is_active {
            metrics::counter!("auth_logins_total", "outcome" => "failed").increment(1);
            tracing::warn!(user_id = %user.id, "login rejected");
            return Err(invalid());
        }

        metrics::counter!("auth_logins_total", "outcome" => "succeeded").increment(1);
        let token = self.tokens.issue(&user, Utc::now())?;
        Ok(Session {
            token,
            user: UserProfile::from(&user),
        })
    }

    /// Resolves a bearer token to the current state of its user.
    pub async fn actor_for_token(&self, token: &str) -> Result<Actor> {
        let claims = self.tokens.verify(token)?;
        let user_id: UserId = claims
            .sub
            .parse()
            .map_err(|_| ApplicationError::Unauthenticated)?;
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(ApplicationError::Unauthenticated)?;
        if !user.is_active {
            return Err(ApplicationError::Unauthenticated);
        }
        Ok(Actor::from(&user))
    }

    pub async fn get_user(&self, id: UserId) -> Result<UserProfile> {
        Ok(UserProfile::from(&self.load(id).await?))
    }

    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn grant_role(&self, admin: &Actor, id: UserId, role: Role) -> Result<UserProfile> {
        admin.require_admin()?;
        let mut user = self.load(id).await?;
        if user.grant(role, Utc::now()) {
            self.store.update_user(&user).await?;
            tracing::info!(user_id = %id, %role, "role granted");
        }
        Ok(UserProfile::from(&user))
    }

    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn revoke_role(&self, admin: &Actor, id: UserId, role: Role) -> Result<UserProfile> {
        admin.require_admin()?;
        let mut user = self.load(id).await?;
        if user.revoke(role, Utc::now())? {
            self.store.update_user(&user).await?;
            tracing::info!(user_id = %id, %role, "role revoked");
        }
        Ok(UserProfile::from(&user))
    }

    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn deactivate(&self, admin: &Actor, id: UserId) -> Result<UserProfile> {
        admin.require_admin()?;
        if admin.user_id == id {
            return Err(ApplicationError::Conflict(
                "admins cannot deactivate themselves".to_string(),
            ));
        }
        let mut user = self.load(id).await?;
        user.deactivate(Utc::now());
        self.store.update_user(&user).await?;
        tracing::info!(user_id = %id, "user deactivated");
        Ok(UserProfile::from(&user))
    }

    /// Creates the admin account configured at start-up unless the email is
    /// already registered. Returns the new admin, if one was created.
    #[tracing::instrument(skip(self, password))]
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> Result<Option<UserProfile>> {
        let email = Email::parse(email)?;
        if self.store.find_user_by_email(&email).await?.is_some() {
            tracing::debug!("bootstrap admin already exists");
            return Ok(None);
        }

        validate_password(password)?;
        let now = Utc::now();
        let mut user = User::register(email, "Administrator", self.hasher.hash(password)?, now)?;
        user.grant(Role::Admin, now);

        match self.store.insert_user(&user).await {
            Ok(()) => {
                tracing::info!(user_id = %user.id, "bootstrap admin created");
                Ok(Some(UserProfile::from(&user)))
            }
            Err(e) if e.is_unique_violation(constraints::USERS_EMAIL) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, id: UserId) -> Result<User> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", id))
    }
}
