use campus_core::model::{Chapter, ChapterId, Course, CourseId, CourseStatus};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps driver errors, turning constraint hits into `Conflict`.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn parse_status(s: &str) -> Result<CourseStatus, StorageError> {
    s.parse::<CourseStatus>().map_err(ser)
}

pub(crate) fn position_to_i64(position: u32) -> i64 {
    i64::from(position)
}

fn position_from_i64(v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid position: {v}")))
}

pub(crate) fn map_chapter_row(row: &SqliteRow) -> Result<Chapter, StorageError> {
    let completed: i64 = row.try_get("completed").map_err(ser)?;
    Chapter::from_persisted(
        ChapterId::new(row.try_get::<String, _>("id").map_err(ser)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<String, _>("summary").map_err(ser)?,
        row.try_get::<Option<String>, _>("content").map_err(ser)?,
        completed != 0,
        position_from_i64(row.try_get::<i64, _>("position").map_err(ser)?)?,
    )
    .map_err(ser)
}

/// Builds a course from its row; the stored `progress` column is ignored
/// because progress is derived from the chapters.
pub(crate) fn map_course_row(row: &SqliteRow, chapters: Vec<Chapter>) -> Result<Course, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(ser)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(ser)?;
    Course::from_persisted(
        CourseId::new(row.try_get::<String, _>("id").map_err(ser)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<String, _>("description").map_err(ser)?,
        parse_status(&status)?,
        created_at,
        updated_at,
        chapters,
    )
    .map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_round_trips() {
        for status in [
            CourseStatus::Planned,
            CourseStatus::Ongoing,
            CourseStatus::Completed,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
        assert!(parse_status("archived").is_err());
    }

    #[test]
    fn negative_position_is_rejected() {
        assert!(position_from_i64(-1).is_err());
        assert_eq!(position_from_i64(7).unwrap(), 7);
    }
}
