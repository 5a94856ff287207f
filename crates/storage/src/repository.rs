use async_trait::async_trait;
use campus_core::model::{Chapter, Course, CourseId, LearnerPreferences, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Identifies whose rows a storage call may touch.
///
/// Remote backends also need the session's access token; local ones ignore it.
#[derive(Clone, PartialEq, Eq)]
pub struct OwnerScope {
    user_id: UserId,
    access_token: Option<String>,
}

impl OwnerScope {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            access_token: None,
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

impl std::fmt::Debug for OwnerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerScope")
            .field("user_id", &self.user_id)
            .field("has_token", &self.access_token.is_some())
            .finish()
    }
}

/// Storage port for courses and their chapters.
///
/// Every call is filtered by the owner; rows of other users behave as missing.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// All courses of the owner, newest first, chapters in position order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn list_courses(&self, owner: &OwnerScope) -> Result<Vec<Course>, StorageError>;

    /// Fetch a single course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get_course(
        &self,
        owner: &OwnerScope,
        id: &CourseId,
    ) -> Result<Option<Course>, StorageError>;

    /// Insert a course together with its chapters.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is taken, or other storage errors.
    async fn insert_course(&self, owner: &OwnerScope, course: &Course) -> Result<(), StorageError>;

    /// Write the course row (title, description, status, progress, `updated_at`).
    ///
    /// Chapters are not touched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the owner has no such course.
    async fn update_course(&self, owner: &OwnerScope, course: &Course) -> Result<(), StorageError>;

    /// Write the mutable chapter fields (completed, content).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the chapter does not exist for this owner.
    async fn update_chapter(
        &self,
        owner: &OwnerScope,
        course_id: &CourseId,
        chapter: &Chapter,
    ) -> Result<(), StorageError>;

    /// Delete a course; its chapters go with it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the owner has no such course.
    async fn delete_course(&self, owner: &OwnerScope, id: &CourseId) -> Result<(), StorageError>;
}

/// Storage port for the learner profile used to tailor generated content.
#[async_trait]
pub trait PreferencesRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get_preferences(
        &self,
        owner: &OwnerScope,
    ) -> Result<Option<LearnerPreferences>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the preferences cannot be stored.
    async fn upsert_preferences(
        &self,
        owner: &OwnerScope,
        preferences: &LearnerPreferences,
    ) -> Result<(), StorageError>;
}

/// Process-local repository; nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Arc<Mutex<HashMap<CourseId, Stored>>>,
    preferences: Arc<Mutex<HashMap<UserId, LearnerPreferences>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct Stored {
    user: UserId,
    /// Insertion order; breaks `created_at` ties like SQLite's rowid.
    seq: u64,
    course: Course,
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn list_courses(&self, owner: &OwnerScope) -> Result<Vec<Course>, StorageError> {
        let guard = self.courses.lock().map_err(poisoned)?;
        let mut owned: Vec<&Stored> = guard
            .values()
            .filter(|stored| &stored.user == owner.user_id())
            .collect();
        owned.sort_by(|a, b| {
            b.course
                .created_at()
                .cmp(&a.course.created_at())
                .then_with(|| b.seq.cmp(&a.seq))
        });
        Ok(owned.into_iter().map(|stored| stored.course.clone()).collect())
    }

    async fn get_course(
        &self,
        owner: &OwnerScope,
        id: &CourseId,
    ) -> Result<Option<Course>, StorageError> {
        let guard = self.courses.lock().map_err(poisoned)?;
        Ok(guard
            .get(id)
            .filter(|stored| &stored.user == owner.user_id())
            .map(|stored| stored.course.clone()))
    }

    async fn insert_course(&self, owner: &OwnerScope, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.courses.lock().map_err(poisoned)?;
        if guard.contains_key(course.id()) {
            return Err(StorageError::Conflict);
        }
        let seq = guard.values().map(|stored| stored.seq + 1).max().unwrap_or(0);
        guard.insert(
            course.id().clone(),
            Stored {
                user: owner.user_id().clone(),
                seq,
                course: course.clone(),
            },
        );
        Ok(())
    }

    async fn update_course(&self, owner: &OwnerScope, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.courses.lock().map_err(poisoned)?;
        let stored = &mut guard
            .get_mut(course.id())
            .filter(|stored| &stored.user == owner.user_id())
            .ok_or(StorageError::NotFound)?
            .course;
        *stored = Course::from_persisted(
            course.id().clone(),
            course.title(),
            course.description(),
            course.status(),
            stored.created_at(),
            course.updated_at(),
            stored.chapters().to_vec(),
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(())
    }

    async fn update_chapter(
        &self,
        owner: &OwnerScope,
        course_id: &CourseId,
        chapter: &Chapter,
    ) -> Result<(), StorageError> {
        let mut guard = self.courses.lock().map_err(poisoned)?;
        let stored = &mut guard
            .get_mut(course_id)
            .filter(|stored| &stored.user == owner.user_id())
            .ok_or(StorageError::NotFound)?
            .course;
        let at = stored.updated_at();
        stored
            .set_chapter_completed(chapter.id(), chapter.completed(), at)
            .map_err(|_| StorageError::NotFound)?;
        if let Some(content) = chapter.content() {
            stored
                .set_chapter_content(chapter.id(), content.to_string(), at)
                .map_err(|_| StorageError::NotFound)?;
        }
        Ok(())
    }

    async fn delete_course(&self, owner: &OwnerScope, id: &CourseId) -> Result<(), StorageError> {
        let mut guard = self.courses.lock().map_err(poisoned)?;
        let owned = guard
            .get(id)
            .is_some_and(|stored| &stored.user == owner.user_id());
        if !owned {
            return Err(StorageError::NotFound);
        }
        guard.remove(id);
        Ok(())
    }
}

#[async_trait]
impl PreferencesRepository for InMemoryRepository {
    async fn get_preferences(
        &self,
        owner: &OwnerScope,
    ) -> Result<Option<LearnerPreferences>, StorageError> {
        let guard = self.preferences.lock().map_err(poisoned)?;
        Ok(guard.get(owner.user_id()).cloned())
    }

    async fn upsert_preferences(
        &self,
        owner: &OwnerScope,
        preferences: &LearnerPreferences,
    ) -> Result<(), StorageError> {
        let mut guard = self.preferences.lock().map_err(poisoned)?;
        guard.insert(owner.user_id().clone(), preferences.clone());
        Ok(())
    }
}

/// Aggregates repositories behind trait objects so the backend is picked once at startup.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub preferences: Arc<dyn PreferencesRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let courses: Arc<dyn CourseRepository> = Arc::new(repo.clone());
        let preferences: Arc<dyn PreferencesRepository> = Arc::new(repo);
        Self {
            courses,
            preferences,
        }
    }
}
