use campus_core::model::{
    Chapter, ChapterId, Course, CourseError, CourseId, CoursePatch, CourseStatus,
};
use storage::repository::OwnerScope;

use crate::Clock;
use crate::error::StoreError;

/// Client-side view of the signed-in user's courses.
///
/// Every mutation takes `&mut self`, so there is exactly one writer at a
/// time. Progress is never stored here; it is derived from the chapters.
#[derive(Debug, Clone, Default)]
pub struct CourseStore {
    clock: Clock,
    owner: Option<OwnerScope>,
    courses: Vec<Course>,
}

impl CourseStore {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            owner: None,
            courses: Vec::new(),
        }
    }

    #[must_use]
    pub fn owner(&self) -> Option<&OwnerScope> {
        self.owner.as_ref()
    }

    pub fn set_owner(&mut self, owner: Option<OwnerScope>) {
        self.owner = owner;
    }

    /// Courses in display order (newest first).
    #[must_use]
    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    #[must_use]
    pub fn course(&self, id: &CourseId) -> Option<&Course> {
        self.courses.iter().find(|c| c.id() == id)
    }

    /// Adds a course at the front of the list.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateCourse` if a course with the same id is
    /// already held.
    pub fn add_course(&mut self, course: Course) -> Result<&Course, StoreError> {
        if self.course(course.id()).is_some() {
            return Err(StoreError::DuplicateCourse(course.id().clone()));
        }
        self.courses.insert(0, course);
        Ok(&self.courses[0])
    }

    /// Merges `patch` into the course and stamps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CourseNotFound` for an unknown id, or
    /// `StoreError::Course` if the patch is invalid. State is untouched on error.
    pub fn update_course(
        &mut self,
        id: &CourseId,
        patch: CoursePatch,
    ) -> Result<&Course, StoreError> {
        let now = self.clock.now();
        let course = self.course_mut(id)?;
        course.apply_patch(patch, now)?;
        Ok(course)
    }

    /// # Errors
    ///
    /// Returns `StoreError::CourseNotFound` or `StoreError::ChapterNotFound`.
    pub fn mark_chapter_completed(
        &mut self,
        course_id: &CourseId,
        chapter_id: &ChapterId,
        completed: bool,
    ) -> Result<&Course, StoreError> {
        let now = self.clock.now();
        let course = self.course_mut(course_id)?;
        course
            .set_chapter_completed(chapter_id, completed, now)
            .map_err(|e| chapter_err(course_id, e))?;
        Ok(course)
    }

    /// Replaces the prose of a chapter. Completion and progress stay as they are.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CourseNotFound` or `StoreError::ChapterNotFound`.
    pub fn update_chapter_content(
        &mut self,
        course_id: &CourseId,
        chapter_id: &ChapterId,
        content: String,
    ) -> Result<&Course, StoreError> {
        let now = self.clock.now();
        let course = self.course_mut(course_id)?;
        course
            .set_chapter_content(chapter_id, content, now)
            .map_err(|e| chapter_err(course_id, e))?;
        Ok(course)
    }

    /// # Errors
    ///
    /// Returns `StoreError::CourseNotFound` for an unknown id.
    pub fn update_course_status(
        &mut self,
        course_id: &CourseId,
        status: CourseStatus,
    ) -> Result<&Course, StoreError> {
        let now = self.clock.now();
        let course = self.course_mut(course_id)?;
        course.set_status(status, now);
        Ok(course)
    }

    /// `None` at the last chapter or when either id is unknown.
    #[must_use]
    pub fn next_chapter(&self, course_id: &CourseId, chapter_id: &ChapterId) -> Option<&Chapter> {
        self.course(course_id)?.next_chapter(chapter_id)
    }

    /// `None` at the first chapter or when either id is unknown.
    #[must_use]
    pub fn previous_chapter(
        &self,
        course_id: &CourseId,
        chapter_id: &ChapterId,
    ) -> Option<&Chapter> {
        self.course(course_id)?.previous_chapter(chapter_id)
    }

    /// # Errors
    ///
    /// Returns `StoreError::CourseNotFound` for an unknown id.
    pub fn remove_course(&mut self, id: &CourseId) -> Result<Course, StoreError> {
        let idx = self
            .courses
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| StoreError::CourseNotFound(id.clone()))?;
        Ok(self.courses.remove(idx))
    }

    /// Swaps in a freshly fetched list, e.g. after a backend write.
    pub fn replace_all(&mut self, courses: Vec<Course>) {
        self.courses = courses;
    }

    /// Drops every course and the owner.
    pub fn clear(&mut self) {
        self.courses.clear();
        self.owner = None;
    }

    fn course_mut(&mut self, id: &CourseId) -> Result<&mut Course, StoreError> {
        self.courses
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| StoreError::CourseNotFound(id.clone()))
    }
}

fn chapter_err(course: &CourseId, err: CourseError) -> StoreError {
    match err {
        CourseError::ChapterNotFound(chapter) => StoreError::ChapterNotFound {
            course: course.clone(),
            chapter,
        },
        other => StoreError::Course(other),
    }
}
