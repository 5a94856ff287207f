//! Supabase (PostgREST) backed repositories.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use campus_core::model::{Chapter, Course, CourseId, LearnerPreferences};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::repository::{
    CourseRepository, OwnerScope, PreferencesRepository, Storage, StorageError,
};

mod rows;

pub use rows::rejection_message;
use rows::{ChapterRow, ChapterUpdateRow, CourseRow, CourseUpdateRow, NewCourseRow, PreferencesRow};

const COURSE_SELECT: &str = "id,title,description,status,progress,created_at,updated_at,\
chapters(id,course_id,title,summary,content,completed,position)";

/// Project URL and public key of the backend.
#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

impl SupabaseConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
        }
    }

    /// Reads `SUPABASE_URL` and `SUPABASE_ANON_KEY`; `None` if either is unset or blank.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let url = env::var("SUPABASE_URL").ok()?;
        let anon_key = env::var("SUPABASE_ANON_KEY").ok()?;
        if url.trim().is_empty() || anon_key.trim().is_empty() {
            return None;
        }
        Some(Self::new(url.trim(), anon_key.trim()))
    }

    /// `<url>/<path>` with exactly one slash in between.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Talks to the `courses`, `chapters` and `user_preferences` tables over REST.
#[derive(Clone)]
pub struct SupabaseRepository {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseRepository {
    #[must_use]
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request(&self, method: Method, table: &str, owner: &OwnerScope) -> RequestBuilder {
        let token = owner.access_token().unwrap_or(&self.config.anon_key);
        self.client
            .request(method, self.config.endpoint(&format!("rest/v1/{table}")))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
    }

    async fn send(builder: RequestBuilder) -> Result<Response, StorageError> {
        let response = builder
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::CONFLICT {
            return Err(StorageError::Conflict);
        }
        Err(StorageError::Rejected {
            status: status.as_u16(),
            message: rejection_message(&body),
        })
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, StorageError> {
        Self::send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Sends a mutation that echoes affected rows; no rows means nothing matched.
    async fn send_affecting(builder: RequestBuilder) -> Result<(), StorageError> {
        let rows: Vec<serde_json::Value> =
            Self::send_json(builder.header("Prefer", "return=representation")).await?;
        if rows.is_empty() {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl CourseRepository for SupabaseRepository {
    async fn list_courses(&self, owner: &OwnerScope) -> Result<Vec<Course>, StorageError> {
        let rows: Vec<CourseRow> = Self::send_json(
            self.request(Method::GET, "courses", owner).query(&[
                ("select", COURSE_SELECT.to_string()),
                ("user_id", eq(owner.user_id())),
                ("order", "created_at.desc".to_string()),
            ]),
        )
        .await?;
        tracing::debug!(user = %owner.user_id(), count = rows.len(), "fetched remote courses");
        rows.into_iter().map(CourseRow::into_course).collect()
    }

    async fn get_course(
        &self,
        owner: &OwnerScope,
        id: &CourseId,
    ) -> Result<Option<Course>, StorageError> {
        let rows: Vec<CourseRow> = Self::send_json(
            self.request(Method::GET, "courses", owner).query(&[
                ("select", COURSE_SELECT.to_string()),
                ("id", eq(id)),
                ("user_id", eq(owner.user_id())),
            ]),
        )
        .await?;
        rows.into_iter().next().map(CourseRow::into_course).transpose()
    }

    async fn insert_course(&self, owner: &OwnerScope, course: &Course) -> Result<(), StorageError> {
        let row = NewCourseRow::new(owner.user_id().as_str(), course);
        Self::send(self.request(Method::POST, "courses", owner).json(&row)).await?;

        if course.chapters().is_empty() {
            return Ok(());
        }
        let chapters: Vec<ChapterRow> = course
            .chapters()
            .iter()
            .map(|c| ChapterRow::from_chapter(course.id(), c))
            .collect();
        let inserted = Self::send(self.request(Method::POST, "chapters", owner).json(&chapters)).await;
        if let Err(err) = inserted {
            // Do not leave a course without its chapters behind.
            tracing::warn!(course = %course.id(), error = %err, "chapter insert failed, removing course");
            if let Err(cleanup) = self.delete_course(owner, course.id()).await {
                tracing::warn!(course = %course.id(), error = %cleanup, "course cleanup failed");
            }
            return Err(err);
        }
        Ok(())
    }

    async fn update_course(&self, owner: &OwnerScope, course: &Course) -> Result<(), StorageError> {
        Self::send_affecting(
            self.request(Method::PATCH, "courses", owner)
                .query(&[("id", eq(course.id())), ("user_id", eq(owner.user_id()))])
                .json(&CourseUpdateRow::from(course)),
        )
        .await
    }

    async fn update_chapter(
        &self,
        owner: &OwnerScope,
        course_id: &CourseId,
        chapter: &Chapter,
    ) -> Result<(), StorageError> {
        Self::send_affecting(
            self.request(Method::PATCH, "chapters", owner)
                .query(&[("id", eq(chapter.id())), ("course_id", eq(course_id))])
                .json(&ChapterUpdateRow {
                    completed: chapter.completed(),
                    content: chapter.content(),
                }),
        )
        .await
    }

    async fn delete_course(&self, owner: &OwnerScope, id: &CourseId) -> Result<(), StorageError> {
        Self::send_affecting(
            self.request(Method::DELETE, "courses", owner)
                .query(&[("id", eq(id)), ("user_id", eq(owner.user_id()))]),
        )
        .await
    }
}

#[async_trait]
impl PreferencesRepository for SupabaseRepository {
    async fn get_preferences(
        &self,
        owner: &OwnerScope,
    ) -> Result<Option<LearnerPreferences>, StorageError> {
        let rows: Vec<PreferencesRow> = Self::send_json(
            self.request(Method::GET, "user_preferences", owner).query(&[
                ("select", "*".to_string()),
                ("user_id", eq(owner.user_id())),
            ]),
        )
        .await?;
        Ok(rows.into_iter().next().map(|row| row.preferences))
    }

    async fn upsert_preferences(
        &self,
        owner: &OwnerScope,
        preferences: &LearnerPreferences,
    ) -> Result<(), StorageError> {
        let row = PreferencesRow {
            user_id: owner.user_id().to_string(),
            preferences: preferences.clone(),
            updated_at: Some(chrono::Utc::now()),
        };
        Self::send(
            self.request(Method::POST, "user_preferences", owner)
                .header("Prefer", "resolution=merge-duplicates")
                .json(&row),
        )
        .await?;
        Ok(())
    }
}

impl Storage {
    /// Build a `Storage` backed by the remote tables.
    #[must_use]
    pub fn remote(config: SupabaseConfig) -> Self {
        let repo = SupabaseRepository::new(config);
        let courses: Arc<dyn CourseRepository> = Arc::new(repo.clone());
        let preferences: Arc<dyn PreferencesRepository> = Arc::new(repo);
        Self {
            courses,
            preferences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_with_single_slash() {
        let config = SupabaseConfig::new("https://proj.supabase.co/", "anon");
        assert_eq!(
            config.endpoint("/rest/v1/courses"),
            "https://proj.supabase.co/rest/v1/courses"
        );
    }

    #[test]
    fn debug_hides_anon_key() {
        let config = SupabaseConfig::new("https://proj.supabase.co", "very-secret");
        assert!(!format!("{config:?}").contains("very-secret"));
    }

    #[test]
    fn equality_filter_format() {
        assert_eq!(eq(CourseId::new("c1")), "eq.c1");
    }
}
