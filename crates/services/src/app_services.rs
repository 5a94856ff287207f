use std::fmt;
use std::sync::Arc;

use storage::remote::SupabaseConfig;
use storage::repository::Storage;

use crate::Clock;
use crate::course_service::CourseService;
use crate::error::AppServicesError;
use crate::generator::{ContentGenerator, GeneratorConfig};
use crate::identity::{IdentityProvider, LocalIdentity, SupabaseAuth};
use crate::preferences_service::PreferencesService;
use crate::session::{SessionListener, SessionSubscription};

pub const DEFAULT_DB_URL: &str = "sqlite://campus.sqlite3";

/// Which storage implementation backs the services.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    Memory,
    Sqlite(String),
    Remote(SupabaseConfig),
}

impl StorageBackend {
    /// Resolves `kind` (`memory`, `sqlite` or `remote`).
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::UnknownBackend` for any other kind, and
    /// `AppServicesError::RemoteNotConfigured` when `remote` is chosen
    /// without Supabase settings.
    pub fn parse(
        kind: &str,
        db_url: Option<String>,
        remote: Option<SupabaseConfig>,
    ) -> Result<Self, AppServicesError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite(db_url.unwrap_or_else(|| DEFAULT_DB_URL.into()))),
            "remote" => remote
                .map(Self::Remote)
                .ok_or(AppServicesError::RemoteNotConfigured),
            other => Err(AppServicesError::UnknownBackend(other.to_string())),
        }
    }

    /// Reads `CAMPUS_STORE`, `CAMPUS_DB_URL`, `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    ///
    /// # Errors
    ///
    /// See [`StorageBackend::parse`].
    pub fn from_env() -> Result<Self, AppServicesError> {
        let kind = std::env::var("CAMPUS_STORE").unwrap_or_else(|_| "sqlite".into());
        Self::parse(
            &kind,
            std::env::var("CAMPUS_DB_URL").ok(),
            SupabaseConfig::from_env(),
        )
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => f.write_str("memory"),
            StorageBackend::Sqlite(url) => write!(f, "sqlite ({url})"),
            StorageBackend::Remote(config) => write!(f, "remote ({})", config.url),
        }
    }
}

/// Assembles app-facing services over the chosen storage backend.
#[derive(Clone)]
pub struct AppServices {
    courses: Arc<CourseService>,
    preferences: Arc<PreferencesService>,
    identity: Arc<dyn IdentityProvider>,
}

impl AppServices {
    /// Build services for `backend`. The remote backend authenticates with
    /// Supabase Auth; the local ones use an in-process identity.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new(
        backend: StorageBackend,
        clock: Clock,
        generator: &GeneratorConfig,
    ) -> Result<Self, AppServicesError> {
        let (storage, identity): (Storage, Arc<dyn IdentityProvider>) = match &backend {
            StorageBackend::Memory => (Storage::in_memory(), Arc::new(LocalIdentity::new())),
            StorageBackend::Sqlite(url) => {
                (Storage::sqlite(url).await?, Arc::new(LocalIdentity::new()))
            }
            StorageBackend::Remote(config) => (
                Storage::remote(config.clone()),
                Arc::new(SupabaseAuth::new(config.clone(), clock)),
            ),
        };
        tracing::debug!(%backend, "storage ready");

        Ok(Self::from_parts(
            storage,
            identity,
            clock,
            ContentGenerator::from_config(generator),
        ))
    }

    /// Build services from already constructed parts.
    #[must_use]
    pub fn from_parts(
        storage: Storage,
        identity: Arc<dyn IdentityProvider>,
        clock: Clock,
        generator: ContentGenerator,
    ) -> Self {
        let courses = Arc::new(CourseService::new(
            clock,
            Arc::clone(&storage.courses),
            generator,
        ));
        let preferences = Arc::new(PreferencesService::new(Arc::clone(&storage.preferences)));
        Self {
            courses,
            preferences,
            identity,
        }
    }

    #[must_use]
    pub fn courses(&self) -> Arc<CourseService> {
        Arc::clone(&self.courses)
    }

    #[must_use]
    pub fn preferences(&self) -> Arc<PreferencesService> {
        Arc::clone(&self.preferences)
    }

    #[must_use]
    pub fn identity(&self) -> Arc<dyn IdentityProvider> {
        Arc::clone(&self.identity)
    }

    /// Starts mirroring sessions into the course service.
    #[must_use]
    pub fn listen_for_sessions(&self) -> SessionSubscription {
        SessionListener::start(self.identity(), self.courses())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_sqlite_url() {
        let backend = StorageBackend::parse("SQLite", None, None).unwrap();
        assert!(matches!(backend, StorageBackend::Sqlite(url) if url == DEFAULT_DB_URL));
    }

    #[test]
    fn remote_requires_config() {
        assert!(matches!(
            StorageBackend::parse("remote", None, None),
            Err(AppServicesError::RemoteNotConfigured)
        ));
        let config = SupabaseConfig::new("https://proj.supabase.co", "anon");
        assert!(matches!(
            StorageBackend::parse("remote", None, Some(config)),
            Ok(StorageBackend::Remote(_))
        ));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(matches!(
            StorageBackend::parse("postgres", None, None),
            Err(AppServicesError::UnknownBackend(kind)) if kind == "postgres"
        ));
    }

    #[tokio::test]
    async fn memory_services_start_signed_out() {
        let services = AppServices::new(
            StorageBackend::Memory,
            campus_core::time::fixed_clock(),
            &GeneratorConfig::default(),
        )
        .await
        .unwrap();
        let subscription = services.listen_for_sessions();
        assert_eq!(
            subscription.resolved().await,
            campus_core::model::AuthState::Anonymous
        );
        assert!(services.courses().owner().await.is_none());
    }
}
