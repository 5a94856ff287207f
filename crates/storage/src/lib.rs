#![forbid(unsafe_code)]

pub mod remote;
pub mod repository;
pub mod sqlite;

pub use repository::{
    CourseRepository, InMemoryRepository, OwnerScope, PreferencesRepository, Storage,
    StorageError,
};
