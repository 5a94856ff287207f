//! Identity providers: who is signed in, and notifications when that changes.

use async_trait::async_trait;
use campus_core::model::{Session, SessionEvent};
use tokio::sync::broadcast;

use crate::error::IdentityError;

mod local;
mod supabase;

pub use local::LocalIdentity;
pub use supabase::SupabaseAuth;

/// Capacity of the session event channel.
pub(crate) const EVENT_CAPACITY: usize = 16;

/// External authority over sessions.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The session currently held, if any.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError` if the provider cannot be reached.
    async fn current_session(&self) -> Result<Option<Session>, IdentityError>;

    /// Receiver for every later session change.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// # Errors
    ///
    /// Returns `IdentityError` for bad credentials or transport failures.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError>;

    /// # Errors
    ///
    /// Returns `IdentityError` if the account cannot be created.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, IdentityError>;

    /// # Errors
    ///
    /// Returns `IdentityError` if the provider rejects the request.
    async fn sign_out(&self) -> Result<(), IdentityError>;
}

pub(crate) fn require_credentials<'a>(
    email: &'a str,
    password: &str,
) -> Result<&'a str, IdentityError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(IdentityError::MissingCredentials);
    }
    Ok(email)
}
