use std::sync::Arc;

use campus_core::model::LearnerPreferences;
use storage::repository::{OwnerScope, PreferencesRepository};

use crate::error::PreferencesServiceError;

/// Loads and saves the learner profile used to tailor generated content.
#[derive(Clone)]
pub struct PreferencesService {
    preferences: Arc<dyn PreferencesRepository>,
}

impl PreferencesService {
    #[must_use]
    pub fn new(preferences: Arc<dyn PreferencesRepository>) -> Self {
        Self { preferences }
    }

    /// The owner's preferences, or empty ones if none were saved.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Storage` if the repository fails.
    pub async fn load(
        &self,
        owner: &OwnerScope,
    ) -> Result<LearnerPreferences, PreferencesServiceError> {
        Ok(self
            .preferences
            .get_preferences(owner)
            .await?
            .unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Preferences` for invalid input, or
    /// `PreferencesServiceError::Storage` if the repository fails.
    pub async fn save(
        &self,
        owner: &OwnerScope,
        preferences: &LearnerPreferences,
    ) -> Result<(), PreferencesServiceError> {
        preferences.validate()?;
        self.preferences
            .upsert_preferences(owner, preferences)
            .await?;
        tracing::debug!(user = %owner.user_id(), "preferences saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::model::UserId;
    use storage::repository::InMemoryRepository;

    fn service() -> PreferencesService {
        PreferencesService::new(Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn missing_preferences_load_as_default() {
        let owner = OwnerScope::new(UserId::new("u"));
        assert_eq!(
            service().load(&owner).await.unwrap(),
            LearnerPreferences::default()
        );
    }

    #[tokio::test]
    async fn invalid_age_is_not_saved() {
        let service = service();
        let owner = OwnerScope::new(UserId::new("u"));
        let prefs = LearnerPreferences {
            age: Some(3),
            ..LearnerPreferences::default()
        };
        assert!(matches!(
            service.save(&owner, &prefs).await,
            Err(PreferencesServiceError::Preferences(_))
        ));
        assert_eq!(service.load(&owner).await.unwrap(), LearnerPreferences::default());
    }

    #[tokio::test]
    async fn saved_preferences_round_trip() {
        let service = service();
        let owner = OwnerScope::new(UserId::new("u"));
        let prefs = LearnerPreferences {
            experience_level: Some("Beginner".into()),
            ..LearnerPreferences::default()
        };
        service.save(&owner, &prefs).await.unwrap();
        assert_eq!(service.load(&owner).await.unwrap(), prefs);
    }
}
