//! Chapter repository.
//!
//! All pipeline-driven status/content writes go through the
//! generation-guarded methods: a background job captures the chapter's
//! generation when it starts and its commits are ignored once a newer
//! cancel/reprocess has bumped the counter.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{ChapterContextRow, ChapterDbModel, ChapterStatus, CollectionDbModel};
use crate::{Error, Result};

const CONTEXT_SELECT: &str = r#"
    SELECT c.id, c.collection_id, c.title, c.video_key, c.stitched_video_key,
           c.content, c.status, c.generation, c.created_at,
           m.name AS module_name, m.context_prompt AS module_context,
           s.name AS system_name, s.context_prompt AS system_context
    FROM chapters c
    LEFT JOIN collections col ON col.id = c.collection_id
    LEFT JOIN modules m ON m.id = col.module_id
    LEFT JOIN systems s ON s.id = m.system_id
"#;

/// Chapter repository trait.
#[async_trait]
pub trait ChapterRepository: Send + Sync {
    async fn get(&self, id: i64) -> Result<ChapterDbModel>;
    async fn find(&self, id: i64) -> Result<Option<ChapterDbModel>>;
    /// Chapter plus its eager-loaded Collection -> Module -> System chain.
    async fn get_with_context(&self, id: i64) -> Result<ChapterContextRow>;
    async fn list_with_context(&self) -> Result<Vec<ChapterContextRow>>;
    /// Insert a collection and its first chapter together; returns
    /// (collection_id, chapter_id).
    async fn create_with_collection(
        &self,
        collection: &CollectionDbModel,
        chapter: &ChapterDbModel,
    ) -> Result<(i64, i64)>;
    async fn update_editables(
        &self,
        id: i64,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;

    /// Unconditional status write (job startup: PENDING -> PROCESSING).
    async fn set_status(&self, id: i64, status: ChapterStatus) -> Result<()>;
    /// Guarded status write; returns false when the generation moved on.
    async fn set_status_guarded(
        &self,
        id: i64,
        status: ChapterStatus,
        generation: i64,
    ) -> Result<bool>;
    /// Guarded content + status commit (the Drafted transition).
    async fn commit_content_guarded(
        &self,
        id: i64,
        content: &str,
        status: ChapterStatus,
        generation: i64,
    ) -> Result<bool>;
    /// Guarded publish commit: stitched key, served video key, COMPLETED.
    async fn commit_publish_guarded(
        &self,
        id: i64,
        video_key: &str,
        stitched_key: Option<&str>,
        generation: i64,
    ) -> Result<bool>;
    /// Overwrite content only (step-level audio regeneration).
    async fn set_content(&self, id: i64, content: &str) -> Result<()>;
    /// Bump the generation and force a status; returns the new generation.
    /// Used by reprocess and cancel to invalidate in-flight jobs.
    async fn bump_generation(
        &self,
        id: i64,
        status: ChapterStatus,
        content: Option<&str>,
    ) -> Result<i64>;

    async fn count_by_status(&self, status: ChapterStatus) -> Result<i64>;
}

/// SQLx implementation of ChapterRepository.
pub struct SqlxChapterRepository {
    pool: SqlitePool,
}

impl SqlxChapterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChapterRepository for SqlxChapterRepository {
    async fn get(&self, id: i64) -> Result<ChapterDbModel> {
        self.find(id)
            .await?
            .ok_or_else(|| Error::not_found("Chapter", id))
    }

    async fn find(&self, id: i64) -> Result<Option<ChapterDbModel>> {
        let chapter = sqlx::query_as::<_, ChapterDbModel>("SELECT * FROM chapters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chapter)
    }

    async fn get_with_context(&self, id: i64) -> Result<ChapterContextRow> {
        let query = format!("{CONTEXT_SELECT} WHERE c.id = ?");
        sqlx::query_as::<_, ChapterContextRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Chapter", id))
    }

    async fn list_with_context(&self) -> Result<Vec<ChapterContextRow>> {
        let query = format!("{CONTEXT_SELECT} ORDER BY c.created_at DESC");
        let rows = sqlx::query_as::<_, ChapterContextRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn create_with_collection(
        &self,
        collection: &CollectionDbModel,
        chapter: &ChapterDbModel,
    ) -> Result<(i64, i64)> {
        let mut tx = self.pool.begin().await?;

        let collection_id = sqlx::query(
            "INSERT INTO collections (module_id, title, description, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(collection.module_id)
        .bind(&collection.title)
        .bind(&collection.description)
        .bind(&collection.created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let chapter_id = sqlx::query(
            r#"
            INSERT INTO chapters (collection_id, title, video_key, status, generation, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(collection_id)
        .bind(&chapter.title)
        .bind(&chapter.video_key)
        .bind(&chapter.status)
        .bind(&chapter.created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;
        Ok((collection_id, chapter_id))
    }

    async fn update_editables(
        &self,
        id: i64,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<()> {
        if title.is_none() && content.is_none() {
            return Ok(());
        }
        let result = sqlx::query(
            r#"
            UPDATE chapters
            SET title = COALESCE(?, title),
                content = COALESCE(?, content)
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Chapter", id));
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM chapters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Chapter", id));
        }
        Ok(())
    }

    async fn set_status(&self, id: i64, status: ChapterStatus) -> Result<()> {
        sqlx::query("UPDATE chapters SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_status_guarded(
        &self,
        id: i64,
        status: ChapterStatus,
        generation: i64,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE chapters SET status = ? WHERE id = ? AND generation = ?")
            .bind(status.as_str())
            .bind(id)
            .bind(generation)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit_content_guarded(
        &self,
        id: i64,
        content: &str,
        status: ChapterStatus,
        generation: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE chapters SET content = ?, status = ? WHERE id = ? AND generation = ?",
        )
        .bind(content)
        .bind(status.as_str())
        .bind(id)
        .bind(generation)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit_publish_guarded(
        &self,
        id: i64,
        video_key: &str,
        stitched_key: Option<&str>,
        generation: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE chapters
            SET video_key = ?,
                stitched_video_key = COALESCE(?, stitched_video_key),
                status = ?
            WHERE id = ? AND generation = ?
            "#,
        )
        .bind(video_key)
        .bind(stitched_key)
        .bind(ChapterStatus::Completed.as_str())
        .bind(id)
        .bind(generation)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_content(&self, id: i64, content: &str) -> Result<()> {
        let result = sqlx::query("UPDATE chapters SET content = ? WHERE id = ?")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Chapter", id));
        }
        Ok(())
    }

    async fn bump_generation(
        &self,
        id: i64,
        status: ChapterStatus,
        content: Option<&str>,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE chapters
            SET generation = generation + 1,
                status = ?,
                content = COALESCE(?, content)
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(content)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Chapter", id));
        }

        let (generation,): (i64,) =
            sqlx::query_as("SELECT generation FROM chapters WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(generation)
    }

    async fn count_by_status(&self, status: ChapterStatus) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chapters WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
