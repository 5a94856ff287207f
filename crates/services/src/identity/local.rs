use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use campus_core::model::{Session, SessionEvent, UserId};
use tokio::sync::broadcast;

use super::{EVENT_CAPACITY, IdentityProvider, require_credentials};
use crate::error::IdentityError;

/// In-process identity for the local stores.
///
/// Accounts live only as long as the value. An email signs in with the
/// password it was first used with.
pub struct LocalIdentity {
    session: Mutex<Option<Session>>,
    accounts: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for LocalIdentity {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            session: Mutex::new(None),
            accounts: Mutex::new(HashMap::new()),
            events,
        }
    }
}

impl LocalIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Local user id for an email address.
    #[must_use]
    pub fn user_id_for(email: &str) -> UserId {
        UserId::new(format!("local:{}", email.trim().to_lowercase()))
    }

    fn start_session(&self, email: &str) -> Session {
        let session = Session::new(Self::user_id_for(email), email, "local");
        if let Ok(mut slot) = self.session.lock() {
            *slot = Some(session.clone());
        }
        // No receivers is fine.
        let _ = self.events.send(SessionEvent::SignedIn(session.clone()));
        session
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
        Ok(self.session.lock().ok().and_then(|slot| slot.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let email = require_credentials(email, password)?;
        let key = email.to_lowercase();
        {
            let mut accounts = self
                .accounts
                .lock()
                .map_err(|_| IdentityError::Rejected("account table poisoned".into()))?;
            match accounts.get(&key) {
                Some(known) if known != password => {
                    return Err(IdentityError::Rejected("invalid login credentials".into()));
                }
                Some(_) => {}
                None => {
                    accounts.insert(key, password.to_string());
                }
            }
        }
        tracing::info!(email, "signed in locally");
        Ok(self.start_session(email))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let email = require_credentials(email, password)?;
        {
            let mut accounts = self
                .accounts
                .lock()
                .map_err(|_| IdentityError::Rejected("account table poisoned".into()))?;
            let key = email.to_lowercase();
            if accounts.contains_key(&key) {
                return Err(IdentityError::Rejected("user already registered".into()));
            }
            accounts.insert(key, password.to_string());
        }
        Ok(self.start_session(email))
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        if let Ok(mut slot) = self.session.lock() {
            *slot = None;
        }
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_publishes_event_and_sets_session() {
        let identity = LocalIdentity::new();
        let mut events = identity.subscribe();

        let session = identity.sign_in("Alice@Example.com", "pw").await.unwrap();
        assert_eq!(session.user_id, UserId::new("local:alice@example.com"));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SignedIn(session.clone())
        );
        assert_eq!(identity.current_session().await.unwrap(), Some(session));

        identity.sign_out().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);
        assert_eq!(identity.current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let identity = LocalIdentity::new();
        identity.sign_up("bob@example.com", "right").await.unwrap();
        assert!(matches!(
            identity.sign_in("bob@example.com", "wrong").await,
            Err(IdentityError::Rejected(_))
        ));
        assert!(matches!(
            identity.sign_up("BOB@example.com", "again").await,
            Err(IdentityError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn blank_credentials_fail() {
        let identity = LocalIdentity::new();
        assert!(matches!(
            identity.sign_in("  ", "pw").await,
            Err(IdentityError::MissingCredentials)
        ));
    }
}
