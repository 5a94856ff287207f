use campus_core::model::{
    Chapter, ChapterId, Course, CourseId, CourseStatus, LearnerPreferences, UserId,
};
use campus_core::time::fixed_now;
use chrono::Duration;
use storage::repository::{CourseRepository, OwnerScope, PreferencesRepository, StorageError};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn owner(user: &str) -> OwnerScope {
    OwnerScope::new(UserId::new(user))
}

fn build_course(id: &str, chapters: u32) -> Course {
    let course_id = CourseId::new(id);
    let chapters = (1..=chapters)
        .map(|p| {
            Chapter::new(
                ChapterId::for_position(&course_id, p),
                format!("Chapter {p}"),
                format!("Summary {p}"),
                p,
            )
            .unwrap()
        })
        .collect();
    Course::new(
        course_id,
        format!("Course {id}"),
        "About things",
        CourseStatus::Ongoing,
        chapters,
        fixed_now(),
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_roundtrip_keeps_chapter_order_and_progress() {
    let repo = repo("memdb_course_roundtrip").await;
    let mut course = build_course("rust", 4);
    repo.insert_course(&owner("alice"), &course).await.unwrap();

    let second = ChapterId::for_position(course.id(), 2);
    let chapter = course
        .set_chapter_completed(&second, true, fixed_now())
        .unwrap()
        .clone();
    repo.update_chapter(&owner("alice"), course.id(), &chapter)
        .await
        .unwrap();
    repo.update_course(&owner("alice"), &course).await.unwrap();

    let fetched = repo
        .get_course(&owner("alice"), course.id())
        .await
        .unwrap()
        .expect("course exists");
    assert_eq!(fetched.chapters().len(), 4);
    assert_eq!(fetched.chapters()[0].position(), 1);
    assert_eq!(fetched.chapters()[1].summary(), "Summary 2");
    assert!(fetched.chapters()[1].completed());
    assert_eq!(fetched.progress(), 25);
}

#[tokio::test]
async fn sqlite_same_timestamp_lists_latest_insert_first() {
    let repo = repo("memdb_course_tie_order").await;
    for id in ["b", "a", "c"] {
        repo.insert_course(&owner("alice"), &build_course(id, 1))
            .await
            .unwrap();
    }
    let ids: Vec<String> = repo
        .list_courses(&owner("alice"))
        .await
        .unwrap()
        .iter()
        .map(|c| c.id().to_string())
        .collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn sqlite_content_update_persists_prose() {
    let repo = repo("memdb_course_content").await;
    let mut course = build_course("bio", 2);
    repo.insert_course(&owner("alice"), &course).await.unwrap();

    let first = ChapterId::for_position(course.id(), 1);
    let chapter = course
        .set_chapter_content(&first, "# Cells\nEverything is made of cells.".into(), fixed_now())
        .unwrap()
        .clone();
    repo.update_chapter(&owner("alice"), course.id(), &chapter)
        .await
        .unwrap();

    let fetched = repo
        .get_course(&owner("alice"), course.id())
        .await
        .unwrap()
        .unwrap();
    assert!(fetched.chapters()[0].content().unwrap().starts_with("# Cells"));
    assert!(fetched.chapters()[1].content().is_none());
}

#[tokio::test]
async fn sqlite_scopes_courses_by_user() {
    let repo = repo("memdb_course_scope").await;
    repo.insert_course(&owner("alice"), &build_course("a1", 1))
        .await
        .unwrap();
    let newer = Course::new(
        CourseId::new("a2"),
        "Later",
        "",
        CourseStatus::Planned,
        Vec::new(),
        fixed_now() + Duration::hours(1),
    )
    .unwrap();
    repo.insert_course(&owner("alice"), &newer).await.unwrap();
    repo.insert_course(&owner("bob"), &build_course("b1", 3))
        .await
        .unwrap();

    let alice = repo.list_courses(&owner("alice")).await.unwrap();
    assert_eq!(
        alice.iter().map(|c| c.id().as_str()).collect::<Vec<_>>(),
        vec!["a2", "a1"]
    );
    assert_eq!(alice[1].chapters().len(), 1);

    let bob = repo.list_courses(&owner("bob")).await.unwrap();
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].chapters().len(), 3);

    assert!(matches!(
        repo.update_course(&owner("bob"), &alice[0]).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_duplicate_insert_is_conflict() {
    let repo = repo("memdb_course_conflict").await;
    let course = build_course("dup", 1);
    repo.insert_course(&owner("alice"), &course).await.unwrap();
    assert!(matches!(
        repo.insert_course(&owner("alice"), &course).await,
        Err(StorageError::Conflict)
    ));
}

#[tokio::test]
async fn sqlite_delete_cascades_to_chapters() {
    let repo = repo("memdb_course_cascade").await;
    let course = build_course("gone", 3);
    repo.insert_course(&owner("alice"), &course).await.unwrap();
    repo.delete_course(&owner("alice"), course.id()).await.unwrap();

    let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chapters WHERE course_id = ?1")
        .bind("gone")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 0);
    assert!(matches!(
        repo.delete_course(&owner("alice"), course.id()).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_preferences_upsert_overwrites() {
    let repo = repo("memdb_preferences").await;
    assert!(repo.get_preferences(&owner("alice")).await.unwrap().is_none());

    let mut prefs = LearnerPreferences {
        education_level: Some("Graduate".into()),
        age: Some(29),
        interested_topics: vec!["Physics".into()],
        ..LearnerPreferences::default()
    };
    repo.upsert_preferences(&owner("alice"), &prefs).await.unwrap();
    prefs.content_tone = Some("Technical".into());
    repo.upsert_preferences(&owner("alice"), &prefs).await.unwrap();

    assert_eq!(
        repo.get_preferences(&owner("alice")).await.unwrap(),
        Some(prefs)
    );
}
