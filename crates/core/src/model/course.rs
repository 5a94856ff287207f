use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ChapterId, CourseId};
use crate::model::syllabus::SyllabusChapter;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("chapter title cannot be empty")]
    EmptyChapterTitle,

    #[error("duplicate chapter id: {0}")]
    DuplicateChapter(ChapterId),

    #[error("duplicate chapter position: {0}")]
    DuplicatePosition(u32),

    #[error("chapter not found: {0}")]
    ChapterNotFound(ChapterId),

    #[error("invalid course status: {0}")]
    InvalidStatus(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Where a course sits in the learner's journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Planned,
    Ongoing,
    Completed,
}

impl CourseStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CourseStatus::Planned => "planned",
            CourseStatus::Ongoing => "ongoing",
            CourseStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseStatus {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planned" => Ok(Self::Planned),
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            _ => Err(CourseError::InvalidStatus(s.to_string())),
        }
    }
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

/// `round(100 * completed / total)` with halves rounded up; 0 for an empty course.
#[must_use]
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    let pct = (200 * completed + total) / (2 * total);
    u8::try_from(pct).unwrap_or(100)
}

//
// ─── CHAPTER ───────────────────────────────────────────────────────────────────
//

/// One unit of a course, owned by exactly one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    id: ChapterId,
    title: String,
    summary: String,
    content: Option<String>,
    completed: bool,
    position: u32,
}

impl Chapter {
    /// Creates a chapter that has not been generated or completed yet.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyChapterTitle` if the title is blank.
    pub fn new(
        id: ChapterId,
        title: impl Into<String>,
        summary: impl Into<String>,
        position: u32,
    ) -> Result<Self, CourseError> {
        Self::from_persisted(id, title, summary, None, false, position)
    }

    /// Rehydrates a chapter from storage.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyChapterTitle` if the title is blank.
    pub fn from_persisted(
        id: ChapterId,
        title: impl Into<String>,
        summary: impl Into<String>,
        content: Option<String>,
        completed: bool,
        position: u32,
    ) -> Result<Self, CourseError> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(CourseError::EmptyChapterTitle);
        }
        Ok(Self {
            id,
            title,
            summary: summary.into(),
            content,
            completed,
            position,
        })
    }

    #[must_use]
    pub fn id(&self) -> &ChapterId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Short description that came with the syllabus.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Generated prose, `None` until the chapter is first opened.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Best available text for prompts: generated content, else the summary.
    #[must_use]
    pub fn study_text(&self) -> &str {
        match self.content.as_deref() {
            Some(content) if !content.trim().is_empty() => content,
            _ => &self.summary,
        }
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// Partial update for the user-editable course fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoursePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<CourseStatus>,
}

impl CoursePatch {
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: CourseStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.status.is_none()
    }
}

/// A learner's course and its chapters in position order.
///
/// Progress is derived from the chapters on every read, so it always equals
/// `round(100 * completed / total)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    id: CourseId,
    title: String,
    description: String,
    status: CourseStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    chapters: Vec<Chapter>,
}

impl Course {
    /// Creates a course stamped at `now`.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if the title is blank or chapter ids/positions repeat.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        description: impl Into<String>,
        status: CourseStatus,
        chapters: Vec<Chapter>,
        now: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        Self::from_persisted(id, title, description, status, now, now, chapters)
    }

    /// Builds a course from an accepted syllabus.
    ///
    /// Chapters get positions `1..=n` and ids `<course>-<n>`.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if the topic or any chapter title is blank.
    pub fn from_syllabus(
        id: CourseId,
        topic: &str,
        syllabus: &[SyllabusChapter],
        status: CourseStatus,
        now: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let mut chapters = Vec::with_capacity(syllabus.len());
        for (index, item) in syllabus.iter().enumerate() {
            let position = u32::try_from(index + 1).unwrap_or(u32::MAX);
            chapters.push(Chapter::new(
                ChapterId::for_position(&id, position),
                item.title.as_str(),
                item.summary.as_str(),
                position,
            )?);
        }
        let topic = topic.trim();
        Self::new(
            id,
            topic,
            format!("A comprehensive course about {topic}."),
            status,
            chapters,
            now,
        )
    }

    /// Rehydrates a course from storage, re-sorting chapters by position.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if the title is blank or chapter ids/positions repeat.
    pub fn from_persisted(
        id: CourseId,
        title: impl Into<String>,
        description: impl Into<String>,
        status: CourseStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        mut chapters: Vec<Chapter>,
    ) -> Result<Self, CourseError> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(CourseError::EmptyTitle);
        }

        let mut ids = HashSet::with_capacity(chapters.len());
        let mut positions = HashSet::with_capacity(chapters.len());
        for chapter in &chapters {
            if !ids.insert(chapter.id.clone()) {
                return Err(CourseError::DuplicateChapter(chapter.id.clone()));
            }
            if !positions.insert(chapter.position) {
                return Err(CourseError::DuplicatePosition(chapter.position));
            }
        }
        chapters.sort_by_key(|c| c.position);

        Ok(Self {
            id,
            title,
            description: description.into(),
            status,
            created_at,
            updated_at,
            chapters,
        })
    }

    #[must_use]
    pub fn id(&self) -> &CourseId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn status(&self) -> CourseStatus {
        self.status
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    #[must_use]
    pub fn chapter(&self, id: &ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|c| &c.id == id)
    }

    #[must_use]
    pub fn completed_chapters(&self) -> usize {
        self.chapters.iter().filter(|c| c.completed).count()
    }

    /// Percentage of completed chapters, 0 when the course has none.
    #[must_use]
    pub fn progress(&self) -> u8 {
        progress_percent(self.completed_chapters(), self.chapters.len())
    }

    /// The chapter right after `current` in position order.
    #[must_use]
    pub fn next_chapter(&self, current: &ChapterId) -> Option<&Chapter> {
        let idx = self.index_of(current)?;
        self.chapters.get(idx + 1)
    }

    /// The chapter right before `current` in position order.
    #[must_use]
    pub fn previous_chapter(&self, current: &ChapterId) -> Option<&Chapter> {
        let idx = self.index_of(current)?;
        self.chapters.get(idx.checked_sub(1)?)
    }

    /// Merges the patch and stamps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` if the patch blanks the title; the course is unchanged.
    pub fn apply_patch(&mut self, patch: CoursePatch, now: DateTime<Utc>) -> Result<(), CourseError> {
        if let Some(title) = patch.title.as_deref() {
            if title.trim().is_empty() {
                return Err(CourseError::EmptyTitle);
            }
        }
        if let Some(title) = patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn set_status(&mut self, status: CourseStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Flags a chapter (un)completed; progress follows automatically.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::ChapterNotFound` if the chapter is not part of this course.
    pub fn set_chapter_completed(
        &mut self,
        chapter: &ChapterId,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<&Chapter, CourseError> {
        let idx = self
            .index_of(chapter)
            .ok_or_else(|| CourseError::ChapterNotFound(chapter.clone()))?;
        self.chapters[idx].completed = completed;
        self.updated_at = now;
        Ok(&self.chapters[idx])
    }

    /// Replaces the generated prose of a chapter. Completion is untouched.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::ChapterNotFound` if the chapter is not part of this course.
    pub fn set_chapter_content(
        &mut self,
        chapter: &ChapterId,
        content: String,
        now: DateTime<Utc>,
    ) -> Result<&Chapter, CourseError> {
        let idx = self
            .index_of(chapter)
            .ok_or_else(|| CourseError::ChapterNotFound(chapter.clone()))?;
        self.chapters[idx].content = Some(content);
        self.updated_at = now;
        Ok(&self.chapters[idx])
    }

    fn index_of(&self, chapter: &ChapterId) -> Option<usize> {
        self.chapters.iter().position(|c| &c.id == chapter)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn course_with(n: u32) -> Course {
        let id = CourseId::new("c1");
        let chapters = (1..=n)
            .map(|p| {
                Chapter::new(ChapterId::for_position(&id, p), format!("Ch {p}"), "", p).unwrap()
            })
            .collect();
        Course::new(id, "Rust", "", CourseStatus::Ongoing, chapters, fixed_now()).unwrap()
    }

    fn ch(course: &Course, p: u32) -> ChapterId {
        ChapterId::for_position(course.id(), p)
    }

    #[test]
    fn progress_is_zero_without_chapters() {
        assert_eq!(course_with(0).progress(), 0);
        assert_eq!(progress_percent(0, 0), 0);
    }

    #[test]
    fn progress_rounds_half_up() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(1, 8), 13);
        assert_eq!(progress_percent(3, 3), 100);
    }

    #[test]
    fn progress_matches_invariant_for_all_small_courses() {
        for total in 1..=12_usize {
            for completed in 0..=total {
                let expected = (100.0 * completed as f64 / total as f64).round() as u8;
                assert_eq!(progress_percent(completed, total), expected, "{completed}/{total}");
            }
        }
    }

    #[test]
    fn four_chapters_progress_scenario() {
        let mut course = course_with(4);
        let first = ch(&course, 1);
        let second = ch(&course, 2);
        course.set_chapter_completed(&first, true, fixed_now()).unwrap();
        assert_eq!(course.progress(), 25);
        course.set_chapter_completed(&second, true, fixed_now()).unwrap();
        assert_eq!(course.progress(), 50);
    }

    #[test]
    fn complete_then_uncomplete_restores_progress() {
        let mut course = course_with(3);
        let first = ch(&course, 1);
        course.set_chapter_completed(&first, true, fixed_now()).unwrap();
        let before = course.progress();
        let third = ch(&course, 3);
        course.set_chapter_completed(&third, true, fixed_now()).unwrap();
        course.set_chapter_completed(&third, false, fixed_now()).unwrap();
        assert_eq!(course.progress(), before);
    }

    #[test]
    fn unknown_chapter_is_rejected() {
        let mut course = course_with(2);
        let err = course
            .set_chapter_completed(&ChapterId::new("nope"), true, fixed_now())
            .unwrap_err();
        assert_eq!(err, CourseError::ChapterNotFound(ChapterId::new("nope")));
        assert_eq!(course.progress(), 0);
    }

    #[test]
    fn navigation_stops_at_boundaries() {
        let course = course_with(3);
        assert!(course.previous_chapter(&ch(&course, 1)).is_none());
        assert!(course.next_chapter(&ch(&course, 3)).is_none());
        assert!(course.next_chapter(&ChapterId::new("missing")).is_none());
        assert!(course_with(0).next_chapter(&ChapterId::new("c1-1")).is_none());
    }

    #[test]
    fn next_and_previous_are_inverses_inside_the_course() {
        let course = course_with(5);
        for p in 1..5 {
            let id = ch(&course, p);
            let next = course.next_chapter(&id).unwrap();
            assert_eq!(course.previous_chapter(next.id()).unwrap().id(), &id);
        }
    }

    #[test]
    fn chapters_are_ordered_by_position() {
        let id = CourseId::new("c");
        let chapters = vec![
            Chapter::new(ChapterId::new("b"), "B", "", 20).unwrap(),
            Chapter::new(ChapterId::new("a"), "A", "", 10).unwrap(),
        ];
        let course = Course::new(id, "T", "", CourseStatus::Planned, chapters, fixed_now()).unwrap();
        let next = course.next_chapter(&ChapterId::new("a")).unwrap();
        assert_eq!(next.title(), "B");
    }

    #[test]
    fn duplicate_positions_are_rejected() {
        let chapters = vec![
            Chapter::new(ChapterId::new("a"), "A", "", 1).unwrap(),
            Chapter::new(ChapterId::new("b"), "B", "", 1).unwrap(),
        ];
        let err = Course::new(
            CourseId::new("c"),
            "T",
            "",
            CourseStatus::Planned,
            chapters,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, CourseError::DuplicatePosition(1));
    }

    #[test]
    fn content_update_keeps_progress() {
        let mut course = course_with(2);
        let first = ch(&course, 1);
        course.set_chapter_completed(&first, true, fixed_now()).unwrap();
        course
            .set_chapter_content(&first, "# Intro".into(), fixed_now())
            .unwrap();
        assert_eq!(course.progress(), 50);
        assert_eq!(course.chapter(&first).unwrap().content(), Some("# Intro"));
    }

    #[test]
    fn status_change_leaves_progress_alone() {
        let mut course = course_with(2);
        let first = ch(&course, 1);
        course.set_chapter_completed(&first, true, fixed_now()).unwrap();
        course.set_status(CourseStatus::Completed, fixed_now());
        assert_eq!(course.status(), CourseStatus::Completed);
        assert_eq!(course.progress(), 50);
    }

    #[test]
    fn blank_title_patch_leaves_course_untouched() {
        let mut course = course_with(1);
        let later = fixed_now() + chrono::Duration::hours(1);
        assert!(course.apply_patch(CoursePatch::default().title("  "), later).is_err());
        assert_eq!(course.title(), "Rust");
        assert_eq!(course.updated_at(), fixed_now());

        course
            .apply_patch(CoursePatch::default().description("new"), later)
            .unwrap();
        assert_eq!(course.description(), "new");
        assert_eq!(course.updated_at(), later);
    }

    #[test]
    fn syllabus_course_numbers_chapters() {
        let syllabus = vec![
            SyllabusChapter::new("Ownership", "Moves and borrows"),
            SyllabusChapter::new("Traits", "Shared behaviour"),
        ];
        let course = Course::from_syllabus(
            CourseId::new("rust"),
            " Rust ",
            &syllabus,
            CourseStatus::Planned,
            fixed_now(),
        )
        .unwrap();
        assert_eq!(course.title(), "Rust");
        assert_eq!(course.description(), "A comprehensive course about Rust.");
        assert_eq!(course.chapters()[1].id().as_str(), "rust-2");
        assert_eq!(course.chapters()[1].summary(), "Shared behaviour");
        assert!(!course.chapters()[0].has_content());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Ongoing".parse::<CourseStatus>().unwrap(), CourseStatus::Ongoing);
        assert!("paused".parse::<CourseStatus>().is_err());
    }
}
