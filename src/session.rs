//! Session store: the signed-in user record and the only entry points that
//! may change it.
//!
//! Every change is written straight to storage under [`STORAGE_KEY`]; logout
//! removes the key. On launch the record is restored, and anything missing or
//! unreadable simply means nobody is signed in.

use crate::catalog::CatalogPackage;
use crate::clock::Clock;
use crate::lifecycle::{Override, OverrideError};
use crate::storage::{self, Storage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const STORAGE_KEY: &str = "goti_user_v2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_package: Option<String>,
    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("name is required")]
    MissingName,
    #[error("email is required")]
    MissingEmail,
    #[error("package expiry is out of range")]
    ExpiryOutOfRange,
    #[error(transparent)]
    Override(#[from] OverrideError),
}

/// Values the session needs from configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub trial_package: String,
    pub trial_duration: Duration,
    pub contact_number: String,
    pub login_delay: Duration,
    pub purchase_delay: Duration,
}

pub struct SessionContext {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    user: Option<User>,
}

impl SessionContext {
    /// Restore whatever session was persisted last
    pub fn restore(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        let user: Option<User> = storage::load_json(storage.as_ref(), STORAGE_KEY);
        if let Some(u) = &user {
            tracing::info!(name = %u.name, "restored session");
        }
        Self {
            storage,
            clock,
            settings,
            user,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Simulated sign-in: waits the login delay, then starts the trial package
    pub fn login(&mut self, name: &str, email: &str, phone: &str) -> Result<&User, SessionError> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(SessionError::MissingName);
        }
        if email.is_empty() {
            return Err(SessionError::MissingEmail);
        }

        self.clock.sleep(self.settings.login_delay);

        let phone = match phone.trim() {
            "" => self.settings.contact_number.clone(),
            p => p.to_string(),
        };
        let expiry = i64::try_from(self.settings.trial_duration.as_millis())
            .ok()
            .and_then(|ms| self.clock.now_ms().checked_add(ms))
            .ok_or(SessionError::ExpiryOutOfRange)?;
        let user = User {
            name: name.to_string(),
            email: email.to_string(),
            phone,
            active_package: Some(self.settings.trial_package.clone()),
            expiry_timestamp: Some(expiry),
        };
        tracing::info!(name = %user.name, "signed in");
        Ok(self.replace(user))
    }

    /// Operator override of package and expiry. Invalid input leaves the
    /// record untouched.
    pub fn manual_override(
        &mut self,
        package: &str,
        value: &str,
        unit: &str,
    ) -> Result<&User, SessionError> {
        let current = self.user.as_ref().ok_or(SessionError::NotSignedIn)?;
        let o = Override::parse(package, value, unit, self.clock.now_ms())?;
        let updated = User {
            active_package: Some(o.package),
            expiry_timestamp: Some(o.expiry_ms),
            ..current.clone()
        };
        tracing::info!(package = ?updated.active_package, "manual override applied");
        Ok(self.replace(updated))
    }

    /// Simulated purchase. Time left on a still-running package carries over.
    pub fn purchase(&mut self, package: &CatalogPackage) -> Result<&User, SessionError> {
        if self.user.is_none() {
            return Err(SessionError::NotSignedIn);
        }

        self.clock.sleep(self.settings.purchase_delay);

        let now = self.clock.now_ms();
        let current = self.user.as_ref().ok_or(SessionError::NotSignedIn)?;
        let base = match current.expiry_timestamp {
            Some(expiry) if current.active_package.is_some() && expiry > now => expiry,
            _ => now,
        };
        let expiry = base
            .checked_add(package.duration_ms())
            .ok_or(SessionError::ExpiryOutOfRange)?;
        let updated = User {
            active_package: Some(package.name.clone()),
            expiry_timestamp: Some(expiry),
            ..current.clone()
        };
        tracing::info!(package = %package.id, "package purchased");
        Ok(self.replace(updated))
    }

    pub fn update_profile(
        &mut self,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<&User, SessionError> {
        let current = self.user.as_ref().ok_or(SessionError::NotSignedIn)?;
        let mut updated = current.clone();
        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(SessionError::MissingName);
            }
            updated.name = name.to_string();
        }
        if let Some(email) = email {
            let email = email.trim();
            if email.is_empty() {
                return Err(SessionError::MissingEmail);
            }
            updated.email = email.to_string();
        }
        Ok(self.replace(updated))
    }

    /// Returns whether anyone was signed in
    pub fn logout(&mut self) -> bool {
        let was_signed_in = self.user.take().is_some();
        self.persist(None);
        if was_signed_in {
            tracing::info!("signed out");
        }
        was_signed_in
    }

    fn replace(&mut self, user: User) -> &User {
        self.persist(Some(&user));
        self.user.insert(user)
    }

    fn persist(&self, user: Option<&User>) {
        let result = match user {
            Some(u) => storage::save_json(self.storage.as_ref(), STORAGE_KEY, u),
            None => self.storage.remove_item(STORAGE_KEY),
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to persist session");
        }
    }
}
