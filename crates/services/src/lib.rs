#![forbid(unsafe_code)]

pub mod app_services;
pub mod course_service;
pub mod course_store;
pub mod error;
pub mod generator;
pub mod identity;
pub mod preferences_service;
pub mod requests;
pub mod session;

pub use campus_core::Clock;

pub use app_services::{AppServices, StorageBackend};
pub use course_service::{ContentUpdate, CourseService};
pub use course_store::CourseStore;
pub use error::{
    AppServicesError, CourseServiceError, GeneratorError, IdentityError, PreferencesServiceError,
    StoreError,
};
pub use generator::{CompletionBackend, CompletionRequest, ContentGenerator, GeneratorConfig};
pub use identity::{IdentityProvider, LocalIdentity, SupabaseAuth};
pub use preferences_service::PreferencesService;
pub use requests::{RequestId, RequestTracker};
pub use session::{SessionListener, SessionSubscription};
