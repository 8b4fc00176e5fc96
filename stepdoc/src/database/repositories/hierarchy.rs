//! Context hierarchy repository: systems and modules.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{ModuleDbModel, SystemDbModel};
use crate::{Error, Result};

/// Hierarchy repository trait.
#[async_trait]
pub trait HierarchyRepository: Send + Sync {
    async fn list_systems(&self) -> Result<Vec<SystemDbModel>>;
    async fn get_system(&self, id: i64) -> Result<SystemDbModel>;
    async fn create_system(&self, system: &SystemDbModel) -> Result<i64>;
    async fn update_system(
        &self,
        id: i64,
        name: Option<&str>,
        context_prompt: Option<&str>,
    ) -> Result<()>;
    async fn delete_system(&self, id: i64) -> Result<()>;

    async fn list_modules(&self, system_id: i64) -> Result<Vec<ModuleDbModel>>;
    async fn get_module(&self, id: i64) -> Result<ModuleDbModel>;
    async fn create_module(&self, module: &ModuleDbModel) -> Result<i64>;
    async fn update_module(
        &self,
        id: i64,
        name: Option<&str>,
        context_prompt: Option<&str>,
    ) -> Result<()>;
    async fn delete_module(&self, id: i64) -> Result<()>;
}

/// SQLx implementation of HierarchyRepository.
pub struct SqlxHierarchyRepository {
    pool: SqlitePool,
}

impl SqlxHierarchyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HierarchyRepository for SqlxHierarchyRepository {
    async fn list_systems(&self) -> Result<Vec<SystemDbModel>> {
        let systems = sqlx::query_as::<_, SystemDbModel>("SELECT * FROM systems ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(systems)
    }

    async fn get_system(&self, id: i64) -> Result<SystemDbModel> {
        sqlx::query_as::<_, SystemDbModel>("SELECT * FROM systems WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("System", id))
    }

    async fn create_system(&self, system: &SystemDbModel) -> Result<i64> {
        let id = sqlx::query("INSERT INTO systems (name, context_prompt) VALUES (?, ?)")
            .bind(&system.name)
            .bind(&system.context_prompt)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    async fn update_system(
        &self,
        id: i64,
        name: Option<&str>,
        context_prompt: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE systems
            SET name = COALESCE(?, name),
                context_prompt = COALESCE(?, context_prompt)
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(context_prompt)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("System", id));
        }
        Ok(())
    }

    async fn delete_system(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM systems WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("System", id));
        }
        Ok(())
    }

    async fn list_modules(&self, system_id: i64) -> Result<Vec<ModuleDbModel>> {
        let modules = sqlx::query_as::<_, ModuleDbModel>(
            "SELECT * FROM modules WHERE system_id = ? ORDER BY id",
        )
        .bind(system_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(modules)
    }

    async fn get_module(&self, id: i64) -> Result<ModuleDbModel> {
        sqlx::query_as::<_, ModuleDbModel>("SELECT * FROM modules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Module", id))
    }

    async fn create_module(&self, module: &ModuleDbModel) -> Result<i64> {
        // Reject dangling system references up front for a clean client error.
        self.get_system(module.system_id).await?;

        let id = sqlx::query(
            "INSERT INTO modules (system_id, name, context_prompt) VALUES (?, ?, ?)",
        )
        .bind(module.system_id)
        .bind(&module.name)
        .bind(&module.context_prompt)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    async fn update_module(
        &self,
        id: i64,
        name: Option<&str>,
        context_prompt: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE modules
            SET name = COALESCE(?, name),
                context_prompt = COALESCE(?, context_prompt)
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(context_prompt)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Module", id));
        }
        Ok(())
    }

    async fn delete_module(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM modules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Module", id));
        }
        Ok(())
    }
}
