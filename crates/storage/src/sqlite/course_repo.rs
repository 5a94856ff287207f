use std::collections::HashMap;

use campus_core::model::{Chapter, Course, CourseId};

use super::SqliteRepository;
use super::mapping::{db_err, map_chapter_row, map_course_row, position_to_i64};
use crate::repository::{CourseRepository, OwnerScope, StorageError};

const COURSE_COLUMNS: &str =
    "id, title, description, status, progress, created_at, updated_at";

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn list_courses(&self, owner: &OwnerScope) -> Result<Vec<Course>, StorageError> {
        let course_rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(owner.user_id().as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let chapter_rows = sqlx::query(
            r"
            SELECT ch.id, ch.course_id, ch.title, ch.summary, ch.content, ch.completed, ch.position
            FROM chapters ch
            JOIN courses c ON c.id = ch.course_id
            WHERE c.user_id = ?1
            ORDER BY ch.course_id, ch.position
            ",
        )
        .bind(owner.user_id().as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut chapters: HashMap<String, Vec<Chapter>> = HashMap::new();
        for row in &chapter_rows {
            let course_id: String = sqlx::Row::try_get(row, "course_id")
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            chapters
                .entry(course_id)
                .or_default()
                .push(map_chapter_row(row)?);
        }

        let mut courses = Vec::with_capacity(course_rows.len());
        for row in &course_rows {
            let id: String = sqlx::Row::try_get(row, "id")
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            let own = chapters.remove(&id).unwrap_or_default();
            courses.push(map_course_row(row, own)?);
        }
        tracing::debug!(user = %owner.user_id(), count = courses.len(), "listed courses");
        Ok(courses)
    }

    async fn get_course(
        &self,
        owner: &OwnerScope,
        id: &CourseId,
    ) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1 AND user_id = ?2"
        ))
        .bind(id.as_str())
        .bind(owner.user_id().as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let chapter_rows = sqlx::query(
            r"
            SELECT id, title, summary, content, completed, position
            FROM chapters
            WHERE course_id = ?1
            ORDER BY position
            ",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut chapters = Vec::with_capacity(chapter_rows.len());
        for chapter_row in &chapter_rows {
            chapters.push(map_chapter_row(chapter_row)?);
        }
        map_course_row(&row, chapters).map(Some)
    }

    async fn insert_course(&self, owner: &OwnerScope, course: &Course) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r"
            INSERT INTO courses (id, user_id, title, description, status, progress, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(course.id().as_str())
        .bind(owner.user_id().as_str())
        .bind(course.title())
        .bind(course.description())
        .bind(course.status().as_str())
        .bind(i64::from(course.progress()))
        .bind(course.created_at())
        .bind(course.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for chapter in course.chapters() {
            sqlx::query(
                r"
                INSERT INTO chapters (id, course_id, title, summary, content, completed, position)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )
            .bind(chapter.id().as_str())
            .bind(course.id().as_str())
            .bind(chapter.title())
            .bind(chapter.summary())
            .bind(chapter.content())
            .bind(i64::from(chapter.completed()))
            .bind(position_to_i64(chapter.position()))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        tracing::debug!(course = %course.id(), chapters = course.chapters().len(), "inserted course");
        Ok(())
    }

    async fn update_course(&self, owner: &OwnerScope, course: &Course) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE courses
            SET title = ?1, description = ?2, status = ?3, progress = ?4, updated_at = ?5
            WHERE id = ?6 AND user_id = ?7
            ",
        )
        .bind(course.title())
        .bind(course.description())
        .bind(course.status().as_str())
        .bind(i64::from(course.progress()))
        .bind(course.updated_at())
        .bind(course.id().as_str())
        .bind(owner.user_id().as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn update_chapter(
        &self,
        owner: &OwnerScope,
        course_id: &CourseId,
        chapter: &Chapter,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE chapters
            SET completed = ?1, content = ?2
            WHERE course_id = ?3 AND id = ?4
              AND EXISTS (SELECT 1 FROM courses WHERE id = ?3 AND user_id = ?5)
            ",
        )
        .bind(i64::from(chapter.completed()))
        .bind(chapter.content())
        .bind(course_id.as_str())
        .bind(chapter.id().as_str())
        .bind(owner.user_id().as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_course(&self, owner: &OwnerScope, id: &CourseId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM courses WHERE id = ?1 AND user_id = ?2")
            .bind(id.as_str())
            .bind(owner.user_id().as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        tracing::debug!(course = %id, "deleted course");
        Ok(())
    }
}
