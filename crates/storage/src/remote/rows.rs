//! Wire shapes of the backend tables.

use campus_core::model::{Chapter, ChapterId, Course, CourseId, LearnerPreferences};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[derive(Debug, Deserialize)]
pub(crate) struct CourseRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub chapters: Vec<ChapterRow>,
}

impl CourseRow {
    pub(crate) fn into_course(self) -> Result<Course, StorageError> {
        let chapters = self
            .chapters
            .into_iter()
            .map(ChapterRow::into_chapter)
            .collect::<Result<Vec<_>, _>>()?;
        Course::from_persisted(
            CourseId::new(self.id),
            self.title,
            self.description.unwrap_or_default(),
            self.status.parse().map_err(ser)?,
            self.created_at,
            self.updated_at,
            chapters,
        )
        .map_err(ser)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChapterRow {
    pub id: String,
    pub course_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub position: i64,
}

impl ChapterRow {
    pub(crate) fn from_chapter(course_id: &CourseId, chapter: &Chapter) -> Self {
        Self {
            id: chapter.id().to_string(),
            course_id: course_id.to_string(),
            title: chapter.title().to_string(),
            summary: Some(chapter.summary().to_string()),
            content: chapter.content().map(ToString::to_string),
            completed: chapter.completed(),
            position: i64::from(chapter.position()),
        }
    }

    pub(crate) fn into_chapter(self) -> Result<Chapter, StorageError> {
        let position = u32::try_from(self.position)
            .map_err(|_| StorageError::Serialization(format!("invalid position: {}", self.position)))?;
        Chapter::from_persisted(
            ChapterId::new(self.id),
            self.title,
            self.summary.unwrap_or_default(),
            self.content,
            self.completed,
            position,
        )
        .map_err(ser)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct NewCourseRow<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub status: &'a str,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> NewCourseRow<'a> {
    pub(crate) fn new(user_id: &'a str, course: &'a Course) -> Self {
        Self {
            id: course.id().as_str(),
            user_id,
            title: course.title(),
            description: course.description(),
            status: course.status().as_str(),
            progress: course.progress(),
            created_at: course.created_at(),
            updated_at: course.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CourseUpdateRow<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub status: &'a str,
    pub progress: u8,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a Course> for CourseUpdateRow<'a> {
    fn from(course: &'a Course) -> Self {
        Self {
            title: course.title(),
            description: course.description(),
            status: course.status().as_str(),
            progress: course.progress(),
            updated_at: course.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChapterUpdateRow<'a> {
    pub completed: bool,
    pub content: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PreferencesRow {
    pub user_id: String,
    #[serde(flatten)]
    pub preferences: LearnerPreferences,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Pulls the human-readable message out of a backend error body.
pub fn rejection_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error_description).or(b.msg))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::model::CourseStatus;

    #[test]
    fn nested_course_select_maps_to_domain() {
        let body = r#"[{
            "id": "c1",
            "title": "Rust",
            "description": null,
            "status": "ongoing",
            "progress": 50,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "chapters": [
                {"id": "c1-2", "course_id": "c1", "title": "Traits", "content": null, "completed": false, "position": 2},
                {"id": "c1-1", "course_id": "c1", "title": "Ownership", "content": "text", "completed": true, "position": 1}
            ]
        }]"#;
        let rows: Vec<CourseRow> = serde_json::from_str(body).unwrap();
        let course = rows.into_iter().next().unwrap().into_course().unwrap();
        assert_eq!(course.status(), CourseStatus::Ongoing);
        assert_eq!(course.chapters()[0].title(), "Ownership");
        assert_eq!(course.progress(), 50);
        assert_eq!(course.description(), "");
    }

    #[test]
    fn unknown_status_is_a_serialization_error() {
        let body = r#"{"id":"c","title":"T","status":"paused",
            "created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}"#;
        let row: CourseRow = serde_json::from_str(body).unwrap();
        assert!(matches!(row.into_course(), Err(StorageError::Serialization(_))));
    }

    #[test]
    fn preferences_row_flattens_fields() {
        let body = r#"{"user_id":"u1","content_tone":"Formal","interested_topics":["Biology"]}"#;
        let row: PreferencesRow = serde_json::from_str(body).unwrap();
        assert_eq!(row.preferences.content_tone.as_deref(), Some("Formal"));
        assert_eq!(row.preferences.interested_topics, vec!["Biology".to_string()]);
    }

    #[test]
    fn rejection_message_prefers_message_field() {
        assert_eq!(
            rejection_message(r#"{"code":"42501","message":"permission denied"}"#),
            "permission denied"
        );
        assert_eq!(rejection_message("bad gateway"), "bad gateway");
    }
}
