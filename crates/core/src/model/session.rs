use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::UserId;

/// Proof of authentication issued by the identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    pub access_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    #[must_use]
    pub fn new(user_id: UserId, email: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// Keeps tokens out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Notification pushed by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

/// What the app currently knows about the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing resolved yet.
    #[default]
    Unknown,
    Authenticated(Session),
    Anonymous,
}

/// Effect a state change has on user-scoped data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthTransition {
    /// Nothing observable changed.
    Unchanged,
    /// A (possibly different) user is now signed in; their data must be loaded.
    UserChanged(Session),
    /// Same user, new token.
    Refreshed(Session),
    /// No user any more; user-scoped data must be dropped.
    SignedOut,
}

impl AuthState {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, AuthState::Unknown)
    }

    /// Applies the result of the initial "get current session" check.
    pub fn resolve(&mut self, current: Option<Session>) -> AuthTransition {
        match current {
            Some(session) => self.apply(SessionEvent::SignedIn(session)),
            None => self.apply(SessionEvent::SignedOut),
        }
    }

    /// Moves the state machine and reports what callers must do about it.
    pub fn apply(&mut self, event: SessionEvent) -> AuthTransition {
        let previous = std::mem::take(self);
        let (next, transition) = match (previous, event) {
            (AuthState::Authenticated(old), SessionEvent::SignedIn(new) | SessionEvent::TokenRefreshed(new))
                if old.user_id == new.user_id =>
            {
                let transition = if old == new {
                    AuthTransition::Unchanged
                } else {
                    AuthTransition::Refreshed(new.clone())
                };
                (AuthState::Authenticated(new), transition)
            }
            (_, SessionEvent::SignedIn(new) | SessionEvent::TokenRefreshed(new)) => (
                AuthState::Authenticated(new.clone()),
                AuthTransition::UserChanged(new),
            ),
            (AuthState::Anonymous, SessionEvent::SignedOut) => {
                (AuthState::Anonymous, AuthTransition::Unchanged)
            }
            (_, SessionEvent::SignedOut) => (AuthState::Anonymous, AuthTransition::SignedOut),
        };
        *self = next;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user: &str, token: &str) -> Session {
        Session::new(UserId::new(user), format!("{user}@example.com"), token)
    }

    #[test]
    fn starts_unknown() {
        assert_eq!(AuthState::default(), AuthState::Unknown);
        assert!(!AuthState::default().is_resolved());
    }

    #[test]
    fn first_check_resolves_to_anonymous() {
        let mut state = AuthState::Unknown;
        assert_eq!(state.resolve(None), AuthTransition::SignedOut);
        assert_eq!(state, AuthState::Anonymous);
        assert_eq!(state.apply(SessionEvent::SignedOut), AuthTransition::Unchanged);
    }

    #[test]
    fn cycles_between_users() {
        let mut state = AuthState::Unknown;
        let alice = session("alice", "t1");
        assert_eq!(
            state.apply(SessionEvent::SignedIn(alice.clone())),
            AuthTransition::UserChanged(alice.clone())
        );
        assert_eq!(state.apply(SessionEvent::SignedOut), AuthTransition::SignedOut);
        let bob = session("bob", "t2");
        assert_eq!(
            state.apply(SessionEvent::SignedIn(bob.clone())),
            AuthTransition::UserChanged(bob.clone())
        );
        assert_eq!(state.session(), Some(&bob));
    }

    #[test]
    fn switching_user_without_sign_out_is_a_user_change() {
        let mut state = AuthState::Authenticated(session("alice", "t1"));
        let bob = session("bob", "t2");
        assert_eq!(
            state.apply(SessionEvent::SignedIn(bob.clone())),
            AuthTransition::UserChanged(bob)
        );
    }

    #[test]
    fn token_refresh_for_same_user_is_not_a_user_change() {
        let mut state = AuthState::Authenticated(session("alice", "t1"));
        let refreshed = session("alice", "t2");
        assert_eq!(
            state.apply(SessionEvent::TokenRefreshed(refreshed.clone())),
            AuthTransition::Refreshed(refreshed.clone())
        );
        assert_eq!(
            state.apply(SessionEvent::SignedIn(refreshed)),
            AuthTransition::Unchanged
        );
    }

    #[test]
    fn debug_output_hides_token() {
        let rendered = format!("{:?}", session("alice", "secret-token"));
        assert!(!rendered.contains("secret-token"));
    }
}
