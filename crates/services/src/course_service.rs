use std::sync::Arc;

use campus_core::model::{
    AuthTransition, Chapter, ChapterId, Course, CourseId, CoursePatch, CourseStatus,
    LearnerPreferences, SyllabusChapter,
};
use storage::repository::{CourseRepository, OwnerScope};
use tokio::sync::Mutex;

use crate::Clock;
use crate::course_store::CourseStore;
use crate::error::{CourseServiceError, StoreError};
use crate::generator::ContentGenerator;
use crate::requests::RequestTracker;

type ChapterKey = (CourseId, ChapterId);

/// Outcome of asking for a chapter's prose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentUpdate {
    /// The chapter already had content; nothing was generated.
    Existing(Chapter),
    /// Fresh content was generated and stored.
    Applied(Chapter),
    /// A newer request for the same chapter was issued meanwhile; this
    /// response was dropped.
    Stale,
}

impl ContentUpdate {
    #[must_use]
    pub fn chapter(&self) -> Option<&Chapter> {
        match self {
            ContentUpdate::Existing(chapter) | ContentUpdate::Applied(chapter) => Some(chapter),
            ContentUpdate::Stale => None,
        }
    }
}

/// Backend write that follows an optimistic local change.
enum Write {
    Insert(Course),
    Course(Course),
    Chapter(Course, Chapter),
    Delete(CourseId),
}

struct State {
    store: CourseStore,
    requests: RequestTracker<ChapterKey>,
}

/// Serialises every course mutation: local change, backend write, then
/// reconcile, all under one lock.
///
/// A failed backend write is returned to the caller and logged once; the
/// local change is kept.
pub struct CourseService {
    clock: Clock,
    state: Mutex<State>,
    courses: Arc<dyn CourseRepository>,
    generator: ContentGenerator,
}

impl CourseService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        generator: ContentGenerator,
    ) -> Self {
        Self {
            clock,
            state: Mutex::new(State {
                store: CourseStore::new(clock),
                requests: RequestTracker::new(),
            }),
            courses,
            generator,
        }
    }

    #[must_use]
    pub fn generator(&self) -> &ContentGenerator {
        &self.generator
    }

    pub async fn owner(&self) -> Option<OwnerScope> {
        self.state.lock().await.store.owner().cloned()
    }

    /// Snapshot of the held courses, newest first.
    pub async fn courses(&self) -> Vec<Course> {
        self.state.lock().await.store.courses().to_vec()
    }

    pub async fn course(&self, id: &CourseId) -> Option<Course> {
        self.state.lock().await.store.course(id).cloned()
    }

    pub async fn next_chapter(&self, course: &CourseId, chapter: &ChapterId) -> Option<Chapter> {
        self.state
            .lock()
            .await
            .store
            .next_chapter(course, chapter)
            .cloned()
    }

    pub async fn previous_chapter(
        &self,
        course: &CourseId,
        chapter: &ChapterId,
    ) -> Option<Chapter> {
        self.state
            .lock()
            .await
            .store
            .previous_chapter(course, chapter)
            .cloned()
    }

    //
    // ─── OWNER ─────────────────────────────────────────────────────────────────
    //

    /// Switches the store to `owner`: drops whatever was held, then loads
    /// the owner's courses.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` if the courses cannot be
    /// fetched; the store is left empty but owned.
    pub async fn attach_owner(&self, owner: OwnerScope) -> Result<(), CourseServiceError> {
        let mut state = self.state.lock().await;
        state.store.clear();
        state.requests.reset();
        state.store.set_owner(Some(owner.clone()));
        let courses = self.courses.list_courses(&owner).await?;
        tracing::info!(user = %owner.user_id(), count = courses.len(), "loaded courses");
        state.store.replace_all(courses);
        Ok(())
    }

    /// Drops every course and the owner.
    pub async fn detach(&self) {
        let mut state = self.state.lock().await;
        state.store.clear();
        state.requests.reset();
        tracing::info!("cleared courses");
    }

    /// Reacts to a session change.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` if a new user's courses cannot
    /// be fetched.
    pub async fn apply_transition(
        &self,
        transition: AuthTransition,
    ) -> Result<(), CourseServiceError> {
        match transition {
            AuthTransition::Unchanged => Ok(()),
            AuthTransition::UserChanged(session) => {
                self.attach_owner(
                    OwnerScope::new(session.user_id).with_access_token(session.access_token),
                )
                .await
            }
            AuthTransition::Refreshed(session) => {
                let mut state = self.state.lock().await;
                let refreshed =
                    OwnerScope::new(session.user_id).with_access_token(session.access_token);
                state.store.set_owner(Some(refreshed));
                tracing::debug!("owner token refreshed");
                Ok(())
            }
            AuthTransition::SignedOut => {
                self.detach().await;
                Ok(())
            }
        }
    }

    /// Refetches the owner's courses.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::NotSignedIn` without an owner, or
    /// `CourseServiceError::Storage` if the fetch fails.
    pub async fn refresh(&self) -> Result<(), CourseServiceError> {
        let mut state = self.state.lock().await;
        let owner = owner_of(&state.store)?;
        let courses = self.courses.list_courses(&owner).await?;
        state.store.replace_all(courses);
        Ok(())
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Adds a course and inserts it in the backend.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::NotSignedIn`, `Store(DuplicateCourse)`,
    /// or `Storage` if the insert fails (the course stays in the store).
    pub async fn add_course(&self, course: Course) -> Result<Course, CourseServiceError> {
        let mut state = self.state.lock().await;
        let owner = owner_of(&state.store)?;
        let added = state.store.add_course(course)?.clone();
        tracing::info!(course = %added.id(), title = added.title(), "course created");
        self.write(&mut state.store, &owner, Write::Insert(added.clone()))
            .await?;
        Ok(current(&state.store, added))
    }

    /// Accepts a generated syllabus as a new course: `Ongoing` for "start
    /// now", `Planned` for "plan for later".
    ///
    /// # Errors
    ///
    /// See [`CourseService::add_course`]; also `Store(Course)` if the topic or
    /// a chapter title is blank.
    pub async fn create_from_syllabus(
        &self,
        topic: &str,
        syllabus: &[SyllabusChapter],
        status: CourseStatus,
    ) -> Result<Course, CourseServiceError> {
        let course = Course::from_syllabus(
            CourseId::generate(),
            topic,
            syllabus,
            status,
            self.clock.now(),
        )?;
        self.add_course(course).await
    }

    /// # Errors
    ///
    /// Returns `NotSignedIn`, `Store` for unknown ids or an invalid patch, or
    /// `Storage` if the backend write fails.
    pub async fn update_course(
        &self,
        id: &CourseId,
        patch: CoursePatch,
    ) -> Result<Course, CourseServiceError> {
        let mut state = self.state.lock().await;
        let owner = owner_of(&state.store)?;
        let course = state.store.update_course(id, patch)?.clone();
        self.write(&mut state.store, &owner, Write::Course(course.clone()))
            .await?;
        Ok(current(&state.store, course))
    }

    /// # Errors
    ///
    /// Returns `NotSignedIn`, `Store` for unknown ids, or `Storage` if the
    /// backend write fails.
    pub async fn update_course_status(
        &self,
        id: &CourseId,
        status: CourseStatus,
    ) -> Result<Course, CourseServiceError> {
        let mut state = self.state.lock().await;
        let owner = owner_of(&state.store)?;
        let course = state.store.update_course_status(id, status)?.clone();
        self.write(&mut state.store, &owner, Write::Course(course.clone()))
            .await?;
        Ok(current(&state.store, course))
    }

    /// # Errors
    ///
    /// Returns `NotSignedIn`, `Store` for unknown ids, or `Storage` if the
    /// backend write fails.
    pub async fn mark_chapter_completed(
        &self,
        course_id: &CourseId,
        chapter_id: &ChapterId,
        completed: bool,
    ) -> Result<Course, CourseServiceError> {
        let mut state = self.state.lock().await;
        let owner = owner_of(&state.store)?;
        let course = state
            .store
            .mark_chapter_completed(course_id, chapter_id, completed)?
            .clone();
        let chapter = chapter_of(&course, chapter_id)?;
        tracing::debug!(course = %course_id, chapter = %chapter_id, completed, progress = course.progress(), "chapter completion changed");
        self.write(&mut state.store, &owner, Write::Chapter(course.clone(), chapter))
            .await?;
        Ok(current(&state.store, course))
    }

    /// # Errors
    ///
    /// Returns `NotSignedIn`, `Store` for unknown ids, or `Storage` if the
    /// backend write fails.
    pub async fn update_chapter_content(
        &self,
        course_id: &CourseId,
        chapter_id: &ChapterId,
        content: String,
    ) -> Result<Course, CourseServiceError> {
        let mut state = self.state.lock().await;
        self.store_content(&mut state, course_id, chapter_id, content)
            .await
    }

    /// # Errors
    ///
    /// Returns `NotSignedIn`, `Store(CourseNotFound)`, or `Storage` if the
    /// backend delete fails (the course is already gone locally).
    pub async fn remove_course(&self, id: &CourseId) -> Result<(), CourseServiceError> {
        let mut state = self.state.lock().await;
        let owner = owner_of(&state.store)?;
        state.store.remove_course(id)?;
        tracing::info!(course = %id, "course removed");
        self.write(&mut state.store, &owner, Write::Delete(id.clone()))
            .await
    }

    //
    // ─── CONTENT GENERATION ────────────────────────────────────────────────────
    //

    /// Returns the chapter, generating its prose first if it has none.
    ///
    /// The lock is not held while the generator runs. If another request for
    /// the same chapter is issued before this one returns, this response is
    /// dropped and `ContentUpdate::Stale` is returned.
    ///
    /// # Errors
    ///
    /// Returns `Store` for unknown ids, `Generator` if generation fails, or
    /// `Storage` if saving the content fails (the content stays in the store).
    pub async fn open_chapter(
        &self,
        course_id: &CourseId,
        chapter_id: &ChapterId,
        preferences: Option<&LearnerPreferences>,
    ) -> Result<ContentUpdate, CourseServiceError> {
        let chapter = self.lookup_chapter(course_id, chapter_id).await?;
        if chapter.has_content() {
            return Ok(ContentUpdate::Existing(chapter));
        }
        self.generate_content(course_id, chapter, preferences).await
    }

    /// Generates new prose for a chapter even if it already has some.
    ///
    /// # Errors
    ///
    /// See [`CourseService::open_chapter`].
    pub async fn regenerate_chapter(
        &self,
        course_id: &CourseId,
        chapter_id: &ChapterId,
        preferences: Option<&LearnerPreferences>,
    ) -> Result<ContentUpdate, CourseServiceError> {
        let chapter = self.lookup_chapter(course_id, chapter_id).await?;
        self.generate_content(course_id, chapter, preferences).await
    }

    async fn lookup_chapter(
        &self,
        course_id: &CourseId,
        chapter_id: &ChapterId,
    ) -> Result<Chapter, CourseServiceError> {
        let state = self.state.lock().await;
        let course = state
            .store
            .course(course_id)
            .ok_or_else(|| StoreError::CourseNotFound(course_id.clone()))?;
        Ok(chapter_of(course, chapter_id)?)
    }

    async fn generate_content(
        &self,
        course_id: &CourseId,
        chapter: Chapter,
        preferences: Option<&LearnerPreferences>,
    ) -> Result<ContentUpdate, CourseServiceError> {
        let key = (course_id.clone(), chapter.id().clone());
        let request = self.state.lock().await.requests.begin(key.clone());

        let generated = self
            .generator
            .generate_chapter_content(chapter.title(), chapter.summary(), preferences)
            .await;

        let mut state = self.state.lock().await;
        if !state.requests.finish(&key, request) {
            tracing::warn!(course = %course_id, chapter = %chapter.id(), request = request.get(), "discarding stale chapter content");
            return Ok(ContentUpdate::Stale);
        }
        let content = generated?;
        let course = self
            .store_content(&mut state, course_id, chapter.id(), content)
            .await?;
        Ok(ContentUpdate::Applied(chapter_of(&course, chapter.id())?))
    }

    async fn store_content(
        &self,
        state: &mut State,
        course_id: &CourseId,
        chapter_id: &ChapterId,
        content: String,
    ) -> Result<Course, CourseServiceError> {
        let owner = owner_of(&state.store)?;
        let course = state
            .store
            .update_chapter_content(course_id, chapter_id, content)?
            .clone();
        let chapter = chapter_of(&course, chapter_id)?;
        self.write(&mut state.store, &owner, Write::Chapter(course.clone(), chapter))
            .await?;
        Ok(current(&state.store, course))
    }

    //
    // ─── BACKEND ───────────────────────────────────────────────────────────────
    //

    /// Sends `write` and, on success, reconciles the store with the backend.
    async fn write(
        &self,
        store: &mut CourseStore,
        owner: &OwnerScope,
        write: Write,
    ) -> Result<(), CourseServiceError> {
        let result = match &write {
            Write::Insert(course) => self.courses.insert_course(owner, course).await,
            Write::Course(course) => self.courses.update_course(owner, course).await,
            Write::Chapter(course, chapter) => {
                match self
                    .courses
                    .update_chapter(owner, course.id(), chapter)
                    .await
                {
                    Ok(()) => self.courses.update_course(owner, course).await,
                    Err(err) => Err(err),
                }
            }
            Write::Delete(id) => self.courses.delete_course(owner, id).await,
        };

        if let Err(err) = result {
            tracing::warn!(error = %err, "backend write failed; keeping local change");
            return Err(err.into());
        }

        match self.courses.list_courses(owner).await {
            Ok(courses) => store.replace_all(courses),
            Err(err) => tracing::warn!(error = %err, "reconcile after write failed"),
        }
        Ok(())
    }
}

fn owner_of(store: &CourseStore) -> Result<OwnerScope, CourseServiceError> {
    store.owner().cloned().ok_or(CourseServiceError::NotSignedIn)
}

fn chapter_of(course: &Course, chapter_id: &ChapterId) -> Result<Chapter, StoreError> {
    course
        .chapter(chapter_id)
        .cloned()
        .ok_or_else(|| StoreError::ChapterNotFound {
            course: course.id().clone(),
            chapter: chapter_id.clone(),
        })
}

/// The stored version of `fallback`'s course after reconcile, if still held.
fn current(store: &CourseStore, fallback: Course) -> Course {
    store.course(fallback.id()).cloned().unwrap_or(fallback)
}
