use campus_core::model::LearnerPreferences;
use chrono::Utc;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{db_err, ser};
use crate::repository::{OwnerScope, PreferencesRepository, StorageError};

#[async_trait::async_trait]
impl PreferencesRepository for SqliteRepository {
    async fn get_preferences(
        &self,
        owner: &OwnerScope,
    ) -> Result<Option<LearnerPreferences>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT education_level, age, content_tone, experience_level, interested_topics
            FROM user_preferences WHERE user_id = ?1
            ",
        )
        .bind(owner.user_id().as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let age = row
            .try_get::<Option<i64>, _>("age")
            .map_err(ser)?
            .map(|v| u16::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid age: {v}"))))
            .transpose()?;
        let topics: String = row.try_get("interested_topics").map_err(ser)?;

        Ok(Some(LearnerPreferences {
            education_level: row.try_get("education_level").map_err(ser)?,
            age,
            content_tone: row.try_get("content_tone").map_err(ser)?,
            experience_level: row.try_get("experience_level").map_err(ser)?,
            interested_topics: serde_json::from_str(&topics).map_err(ser)?,
        }))
    }

    async fn upsert_preferences(
        &self,
        owner: &OwnerScope,
        preferences: &LearnerPreferences,
    ) -> Result<(), StorageError> {
        let topics = serde_json::to_string(&preferences.interested_topics).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO user_preferences
                (user_id, education_level, age, content_tone, experience_level, interested_topics, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id) DO UPDATE SET
                education_level = excluded.education_level,
                age = excluded.age,
                content_tone = excluded.content_tone,
                experience_level = excluded.experience_level,
                interested_topics = excluded.interested_topics,
                updated_at = excluded.updated_at
            ",
        )
        .bind(owner.user_id().as_str())
        .bind(preferences.education_level.as_deref())
        .bind(preferences.age.map(i64::from))
        .bind(preferences.content_tone.as_deref())
        .bind(preferences.experience_level.as_deref())
        .bind(topics)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
