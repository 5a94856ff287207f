use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use campus_core::model::{
    Chapter, ChapterId, Course, CourseId, CoursePatch, CourseStatus, SyllabusChapter, UserId,
};
use campus_core::time::fixed_now;
use services::{
    Clock, CompletionBackend, CompletionRequest, ContentGenerator, ContentUpdate,
    CourseService, CourseServiceError, GeneratorError,
};
use storage::repository::{
    CourseRepository, InMemoryRepository, OwnerScope, Storage, StorageError,
};
use tokio::sync::Notify;

fn syllabus(n: usize) -> Vec<SyllabusChapter> {
    (1..=n)
        .map(|i| SyllabusChapter::new(format!("Chapter {i}"), format!("Covers part {i}")))
        .collect()
}

struct Fixed(&'static str);

#[async_trait]
impl CompletionBackend for Fixed {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, GeneratorError> {
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn course_flow_on_sqlite() {
    let storage = Storage::sqlite("sqlite:file:memdb_course_flow?mode=memory&cache=shared")
        .await
        .expect("connect sqlite");
    let service = CourseService::new(
        Clock::fixed(fixed_now()),
        Arc::clone(&storage.courses),
        ContentGenerator::new(Arc::new(Fixed("# Generated\nProse.")), "s", "c"),
    );
    service
        .attach_owner(OwnerScope::new(UserId::new("alice")))
        .await
        .expect("attach");

    let course = service
        .create_from_syllabus("Linear Algebra", &syllabus(4), CourseStatus::Ongoing)
        .await
        .expect("create course");
    assert_eq!(course.title(), "Linear Algebra");
    assert_eq!(course.progress(), 0);

    let ids: Vec<ChapterId> = course.chapters().iter().map(|c| c.id().clone()).collect();
    service
        .mark_chapter_completed(course.id(), &ids[0], true)
        .await
        .expect("complete 1");
    let half = service
        .mark_chapter_completed(course.id(), &ids[1], true)
        .await
        .expect("complete 2");
    assert_eq!(half.progress(), 50);

    let opened = service
        .open_chapter(course.id(), &ids[2], None)
        .await
        .expect("open chapter");
    assert_eq!(
        opened.chapter().and_then(Chapter::content),
        Some("# Generated\nProse.")
    );

    service
        .update_course(course.id(), CoursePatch::default().title("Linear Algebra I"))
        .await
        .expect("rename");

    // A second service over the same database sees everything.
    let reader = CourseService::new(
        Clock::fixed(fixed_now()),
        Arc::clone(&storage.courses),
        ContentGenerator::new(Arc::new(Fixed("unused")), "s", "c"),
    );
    reader
        .attach_owner(OwnerScope::new(UserId::new("alice")))
        .await
        .expect("attach reader");
    let persisted = reader.course(course.id()).await.expect("persisted course");
    assert_eq!(persisted.title(), "Linear Algebra I");
    assert_eq!(persisted.progress(), 50);
    assert_eq!(
        persisted.chapters()[2].content(),
        Some("# Generated\nProse.")
    );
    assert!(!persisted.chapters()[2].completed());

    service
        .remove_course(course.id())
        .await
        .expect("remove course");
    reader.refresh().await.expect("refresh");
    assert!(reader.courses().await.is_empty());
}

/// Wraps the in-memory repository; writes fail while `failing` is set.
struct Flaky {
    inner: InMemoryRepository,
    failing: AtomicBool,
}

impl Flaky {
    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Connection("backend unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CourseRepository for Flaky {
    async fn list_courses(&self, owner: &OwnerScope) -> Result<Vec<Course>, StorageError> {
        self.inner.list_courses(owner).await
    }

    async fn get_course(
        &self,
        owner: &OwnerScope,
        id: &CourseId,
    ) -> Result<Option<Course>, StorageError> {
        self.inner.get_course(owner, id).await
    }

    async fn insert_course(&self, owner: &OwnerScope, course: &Course) -> Result<(), StorageError> {
        self.check()?;
        self.inner.insert_course(owner, course).await
    }

    async fn update_course(&self, owner: &OwnerScope, course: &Course) -> Result<(), StorageError> {
        self.check()?;
        self.inner.update_course(owner, course).await
    }

    async fn update_chapter(
        &self,
        owner: &OwnerScope,
        course_id: &CourseId,
        chapter: &Chapter,
    ) -> Result<(), StorageError> {
        self.check()?;
        self.inner.update_chapter(owner, course_id, chapter).await
    }

    async fn delete_course(&self, owner: &OwnerScope, id: &CourseId) -> Result<(), StorageError> {
        self.check()?;
        self.inner.delete_course(owner, id).await
    }
}

#[tokio::test]
async fn failed_backend_write_keeps_optimistic_change() {
    let repo = Arc::new(Flaky {
        inner: InMemoryRepository::new(),
        failing: AtomicBool::new(false),
    });
    let service = CourseService::new(
        Clock::fixed(fixed_now()),
        repo.clone(),
        ContentGenerator::new(Arc::new(Fixed("unused")), "s", "c"),
    );
    service
        .attach_owner(OwnerScope::new(UserId::new("alice")))
        .await
        .unwrap();
    let course = service
        .create_from_syllabus("Rust", &syllabus(4), CourseStatus::Ongoing)
        .await
        .unwrap();
    let first = course.chapters()[0].id().clone();

    repo.failing.store(true, Ordering::SeqCst);
    let err = service
        .mark_chapter_completed(course.id(), &first, true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CourseServiceError::Storage(StorageError::Connection(_))
    ));

    // Local state is not reverted.
    let local = service.course(course.id()).await.unwrap();
    assert!(local.chapters()[0].completed());
    assert_eq!(local.progress(), 25);

    // The backend never saw it.
    let stored = repo
        .inner
        .get_course(&OwnerScope::new(UserId::new("alice")), course.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.progress(), 0);
}

#[tokio::test]
async fn failed_insert_keeps_course_locally() {
    let repo = Arc::new(Flaky {
        inner: InMemoryRepository::new(),
        failing: AtomicBool::new(true),
    });
    let service = CourseService::new(
        Clock::fixed(fixed_now()),
        repo,
        ContentGenerator::new(Arc::new(Fixed("unused")), "s", "c"),
    );
    service
        .attach_owner(OwnerScope::new(UserId::new("alice")))
        .await
        .unwrap();
    assert!(
        service
            .create_from_syllabus("Rust", &syllabus(2), CourseStatus::Planned)
            .await
            .is_err()
    );
    assert_eq!(service.courses().await.len(), 1);
}

/// The first call blocks until released; later calls answer at once.
struct Gated {
    calls: AtomicUsize,
    first_started: Notify,
    release_first: Notify,
}

#[async_trait]
impl CompletionBackend for Gated {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, GeneratorError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.first_started.notify_one();
            self.release_first.notified().await;
            Ok("old answer".into())
        } else {
            Ok("new answer".into())
        }
    }
}

#[tokio::test]
async fn stale_generation_is_discarded() {
    let backend = Arc::new(Gated {
        calls: AtomicUsize::new(0),
        first_started: Notify::new(),
        release_first: Notify::new(),
    });
    let service = Arc::new(CourseService::new(
        Clock::fixed(fixed_now()),
        Arc::new(InMemoryRepository::new()),
        ContentGenerator::new(backend.clone(), "s", "c"),
    ));
    service
        .attach_owner(OwnerScope::new(UserId::new("alice")))
        .await
        .unwrap();
    let course = service
        .create_from_syllabus("Rust", &syllabus(2), CourseStatus::Ongoing)
        .await
        .unwrap();
    let course_id = course.id().clone();
    let chapter_id = course.chapters()[0].id().clone();

    let slow = {
        let service = Arc::clone(&service);
        let course_id = course_id.clone();
        let chapter_id = chapter_id.clone();
        tokio::spawn(async move { service.open_chapter(&course_id, &chapter_id, None).await })
    };
    backend.first_started.notified().await;

    let fast = service
        .open_chapter(&course_id, &chapter_id, None)
        .await
        .unwrap();
    assert!(matches!(fast, ContentUpdate::Applied(_)));

    backend.release_first.notify_one();
    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow, ContentUpdate::Stale);

    let chapter = service.course(&course_id).await.unwrap().chapters()[0].clone();
    assert_eq!(chapter.content(), Some("new answer"));
}
