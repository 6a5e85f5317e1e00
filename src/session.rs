use chrono::{DateTime, Utc};
use tracing::info;
use ulid::Ulid;

use crate::model::{UserId, UserProfile};
use crate::source::{Credentials, IdentityProvider, SourceError};

/// A signed-in user. Created by [`Session::sign_in`] or [`Session::sign_up`],
/// consumed by [`Session::sign_out`].
#[derive(Debug, Clone)]
pub struct Session {
    id: Ulid,
    user: UserProfile,
    started_at: DateTime<Utc>,
}

impl Session {
    pub async fn sign_in(identity: &dyn IdentityProvider, credentials: &Credentials) -> Result<Self, SourceError> {
        let user = identity.authenticate(credentials).await?;
        Ok(Self::start(user))
    }

    /// Register a new account and sign straight into it.
    pub async fn sign_up(
        identity: &dyn IdentityProvider,
        profile: UserProfile,
        password: &str,
    ) -> Result<Self, SourceError> {
        let user = identity.register(profile, password).await?;
        Ok(Self::start(user))
    }

    fn start(user: UserProfile) -> Self {
        let session = Self {
            id: Ulid::new(),
            user,
            started_at: Utc::now(),
        };
        info!(session = %session.id, user = %session.user.id, admin = session.user.is_admin, "signed in");
        session
    }

    /// Re-read the profile, e.g. after the user edits it elsewhere.
    pub async fn reload(&mut self, identity: &dyn IdentityProvider) -> Result<(), SourceError> {
        self.user = identity.profile(self.user.id).await?;
        Ok(())
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn sign_out(self) {
        info!(session = %self.id, user = %self.user.id, "signed out");
    }
}
