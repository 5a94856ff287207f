use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Error returned when an identifier string is blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cannot be empty", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        kind: stringify!($name),
                    });
                }
                Ok(Self(trimmed.to_string()))
            }
        }
    };
}

string_id!(
    /// Opaque identifier of a course.
    CourseId
);
string_id!(
    /// Identifier of a chapter, unique within its course.
    ChapterId
);
string_id!(
    /// Identifier issued by the identity provider.
    UserId
);

impl CourseId {
    /// Fresh random identifier for a course accepted from a syllabus.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl ChapterId {
    /// Chapter id derived from the owning course and a 1-based position.
    #[must_use]
    pub fn for_position(course: &CourseId, position: u32) -> Self {
        Self(format!("{course}-{position}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_id_display_is_raw_value() {
        let id = CourseId::new("rust-101");
        assert_eq!(id.to_string(), "rust-101");
        assert_eq!(format!("{id:?}"), "CourseId(rust-101)");
    }

    #[test]
    fn blank_id_is_rejected() {
        assert!("   ".parse::<ChapterId>().is_err());
        assert_eq!(" u-1 ".parse::<UserId>().unwrap(), UserId::new("u-1"));
    }

    #[test]
    fn chapter_id_embeds_course_and_position() {
        let course = CourseId::new("abc");
        assert_eq!(ChapterId::for_position(&course, 3).as_str(), "abc-3");
    }

    #[test]
    fn generated_course_ids_differ() {
        assert_ne!(CourseId::generate(), CourseId::generate());
    }
}
