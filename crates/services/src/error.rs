//! Shared error types for the services crate.

use thiserror::Error;

use campus_core::model::{ChapterId, CourseError, CourseId, PreferencesError, StudyError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the in-memory `CourseStore`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    #[error("course already exists: {0}")]
    DuplicateCourse(CourseId),
    #[error("course not found: {0}")]
    CourseNotFound(CourseId),
    #[error("chapter {chapter} not found in course {course}")]
    ChapterNotFound { course: CourseId, chapter: ChapterId },
    #[error(transparent)]
    Course(#[from] CourseError),
}

/// Errors emitted by the content generator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GeneratorError {
    #[error("completion API key is not set")]
    MissingApiKey,
    #[error("completion request failed with status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("completion service returned an empty response")]
    EmptyResponse,
    #[error("could not parse generated {what}: {reason}")]
    Parse { what: &'static str, reason: String },
    #[error("generated {what} is not a JSON array")]
    NotAnArray { what: &'static str },
    #[error("generated item {index} is invalid: {source}")]
    Invalid {
        index: usize,
        #[source]
        source: StudyError,
    },
}

/// Errors emitted by `CourseService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourseServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error("no user is signed in")]
    NotSignedIn,
}

impl From<CourseError> for CourseServiceError {
    fn from(err: CourseError) -> Self {
        Self::Store(StoreError::Course(err))
    }
}

/// Errors emitted by `PreferencesService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PreferencesServiceError {
    #[error(transparent)]
    Preferences(#[from] PreferencesError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by identity providers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityError {
    #[error("identity provider is not configured")]
    NotConfigured,
    #[error("email and password are required")]
    MissingCredentials,
    #[error("sign-in rejected: {0}")]
    Rejected(String),
    #[error("identity request failed with status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("remote store requires SUPABASE_URL and SUPABASE_ANON_KEY")]
    RemoteNotConfigured,
    #[error("unknown store backend: {0}")]
    UnknownBackend(String),
}
