use std::sync::Mutex;

use async_trait::async_trait;
use campus_core::model::{Session, SessionEvent, UserId};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use storage::remote::{SupabaseConfig, rejection_message};
use tokio::sync::broadcast;

use super::{EVENT_CAPACITY, IdentityProvider, require_credentials};
use crate::Clock;
use crate::error::IdentityError;

/// Session plus what is needed to renew it.
#[derive(Clone)]
struct Held {
    session: Session,
    refresh_token: Option<String>,
}

/// Supabase Auth (GoTrue) over REST.
pub struct SupabaseAuth {
    client: Client,
    config: SupabaseConfig,
    clock: Clock,
    held: Mutex<Option<Held>>,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<AuthUser>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    fn into_held(self, fallback_email: &str, now: DateTime<Utc>) -> Result<Held, IdentityError> {
        let (Some(access_token), Some(user)) = (self.access_token, self.user) else {
            return Err(IdentityError::Rejected(
                "no session returned; the account may need email confirmation".into(),
            ));
        };
        let email = user.email.unwrap_or_else(|| fallback_email.to_string());
        let mut session = Session::new(UserId::new(user.id), email, access_token);
        if let Some(secs) = self.expires_in {
            session = session.with_expiry(now + Duration::seconds(secs));
        }
        Ok(Held {
            session,
            refresh_token: self.refresh_token,
        })
    }
}

impl SupabaseAuth {
    #[must_use]
    pub fn new(config: SupabaseConfig, clock: Clock) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client: Client::new(),
            config,
            clock,
            held: Mutex::new(None),
            events,
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.config.endpoint(&format!("auth/v1/{path}")))
            .header("apikey", &self.config.anon_key)
    }

    async fn token_request(
        &self,
        builder: RequestBuilder,
        email: &str,
    ) -> Result<Held, IdentityError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = rejection_message(&body);
            return Err(if status.is_client_error() {
                IdentityError::Rejected(message)
            } else {
                IdentityError::Upstream {
                    status: status.as_u16(),
                    message,
                }
            });
        }
        let body: TokenResponse = response.json().await?;
        body.into_held(email, self.clock.now())
    }

    fn replace(&self, held: Option<Held>) -> Option<Held> {
        match self.held.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, held),
            Err(_) => None,
        }
    }

    fn held(&self) -> Option<Held> {
        self.held.lock().ok().and_then(|slot| slot.clone())
    }

    async fn refresh(&self, refresh_token: &str, email: &str) -> Result<Session, IdentityError> {
        let held = self
            .token_request(
                self.post("token?grant_type=refresh_token")
                    .json(&RefreshGrant { refresh_token }),
                email,
            )
            .await?;
        let session = held.session.clone();
        self.replace(Some(held));
        tracing::debug!(user = %session.user_id, "refreshed session");
        let _ = self.events.send(SessionEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    /// Renews an expired session when a refresh token is held; a failed
    /// renewal signs the user out.
    async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
        let Some(held) = self.held() else {
            return Ok(None);
        };
        if !held.session.is_expired(self.clock.now()) {
            return Ok(Some(held.session));
        }
        let Some(refresh_token) = held.refresh_token.as_deref() else {
            self.replace(None);
            let _ = self.events.send(SessionEvent::SignedOut);
            return Ok(None);
        };
        match self.refresh(refresh_token, &held.session.email).await {
            Ok(session) => Ok(Some(session)),
            Err(IdentityError::Rejected(reason)) => {
                tracing::warn!(%reason, "session refresh rejected");
                self.replace(None);
                let _ = self.events.send(SessionEvent::SignedOut);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let email = require_credentials(email, password)?;
        let held = self
            .token_request(
                self.post("token?grant_type=password")
                    .json(&PasswordGrant { email, password }),
                email,
            )
            .await?;
        let session = held.session.clone();
        self.replace(Some(held));
        tracing::info!(user = %session.user_id, "signed in");
        let _ = self.events.send(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let email = require_credentials(email, password)?;
        let held = self
            .token_request(
                self.post("signup").json(&PasswordGrant { email, password }),
                email,
            )
            .await?;
        let session = held.session.clone();
        self.replace(Some(held));
        let _ = self.events.send(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let previous = self.replace(None);
        let _ = self.events.send(SessionEvent::SignedOut);
        let Some(previous) = previous else {
            return Ok(());
        };
        // Local state is already gone; a failed revoke only leaves the token to expire.
        let response = self
            .post("logout")
            .bearer_auth(&previous.session.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "remote sign-out failed");
        }
        Ok(())
    }
}
