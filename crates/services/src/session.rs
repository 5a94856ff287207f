use std::sync::Arc;

use campus_core::model::{AuthState, AuthTransition};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::course_service::CourseService;
use crate::identity::IdentityProvider;

/// Mirrors identity-provider sessions into a `CourseService`.
pub struct SessionListener;

impl SessionListener {
    /// Subscribes to `identity`, resolves the current session, and then
    /// applies every change event exactly once.
    ///
    /// Must be called inside a tokio runtime. The listener runs until the
    /// returned subscription is dropped.
    #[must_use]
    pub fn start(
        identity: Arc<dyn IdentityProvider>,
        courses: Arc<CourseService>,
    ) -> SessionSubscription {
        // Subscribe before the first check so no event falls in between.
        let mut events = identity.subscribe();
        let (state_tx, state_rx) = watch::channel(AuthState::Unknown);

        let handle = tokio::spawn(async move {
            let mut state = AuthState::Unknown;

            let current = match identity.current_session().await {
                Ok(current) => current,
                Err(err) => {
                    tracing::warn!(error = %err, "could not read current session");
                    None
                }
            };
            let transition = state.resolve(current);
            apply(&courses, transition).await;
            state_tx.send_replace(state.clone());

            loop {
                match events.recv().await {
                    Ok(event) => {
                        let transition = state.apply(event);
                        apply(&courses, transition).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "missed session events; re-reading session");
                        let current = identity.current_session().await.ok().flatten();
                        let transition = state.resolve(current);
                        apply(&courses, transition).await;
                    }
                    Err(RecvError::Closed) => break,
                }
                state_tx.send_replace(state.clone());
            }
        });

        SessionSubscription {
            handle,
            state: state_rx,
        }
    }
}

async fn apply(courses: &CourseService, transition: AuthTransition) {
    match &transition {
        AuthTransition::UserChanged(session) => {
            tracing::info!(user = %session.user_id, "session started");
        }
        AuthTransition::SignedOut => tracing::info!("session ended"),
        AuthTransition::Refreshed(_) | AuthTransition::Unchanged => {}
    }
    if let Err(err) = courses.apply_transition(transition).await {
        tracing::warn!(error = %err, "could not apply session change");
    }
}

/// Handle to a running listener. Dropping it stops the listener.
pub struct SessionSubscription {
    handle: JoinHandle<()>,
    state: watch::Receiver<AuthState>,
}

impl SessionSubscription {
    /// Latest state the listener has fully applied.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receiver that is notified after each applied change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }

    /// Waits until the first session check has been applied.
    pub async fn resolved(&self) -> AuthState {
        let mut rx = self.state.clone();
        match rx.wait_for(AuthState::is_resolved).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
