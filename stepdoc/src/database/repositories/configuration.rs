//! Global configuration repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::GlobalConfigDbModel;
use crate::database::models::configuration::GLOBAL_CONFIG_ID;
use crate::Result;

/// Which branding asset a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Intro,
    Outro,
    Logo,
}

impl AssetKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "intro" => Some(Self::Intro),
            "outro" => Some(Self::Outro),
            "logo" => Some(Self::Logo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Outro => "outro",
            Self::Logo => "logo",
        }
    }
}

/// Configuration repository trait.
#[async_trait]
pub trait ConfigurationRepository: Send + Sync {
    /// Load the singleton row, creating it with defaults when absent.
    async fn get_or_create(&self) -> Result<GlobalConfigDbModel>;
    /// Overwrite the editable fields (branding + recorder settings).
    /// Intro/outro keys are managed separately via [`set_asset_key`].
    async fn update(&self, config: &GlobalConfigDbModel) -> Result<GlobalConfigDbModel>;
    async fn set_asset_key(&self, kind: AssetKind, key: &str) -> Result<()>;
}

/// SQLx implementation of ConfigurationRepository.
pub struct SqlxConfigurationRepository {
    pool: SqlitePool,
}

impl SqlxConfigurationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_defaults_if_missing(&self) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO configurations (id) VALUES (?)")
            .bind(GLOBAL_CONFIG_ID)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigurationRepository for SqlxConfigurationRepository {
    async fn get_or_create(&self) -> Result<GlobalConfigDbModel> {
        self.insert_defaults_if_missing().await?;
        let config = sqlx::query_as::<_, GlobalConfigDbModel>(
            "SELECT * FROM configurations WHERE id = ?",
        )
        .bind(GLOBAL_CONFIG_ID)
        .fetch_one(&self.pool)
        .await?;
        Ok(config)
    }

    async fn update(&self, config: &GlobalConfigDbModel) -> Result<GlobalConfigDbModel> {
        self.insert_defaults_if_missing().await?;
        sqlx::query(
            r#"
            UPDATE configurations
            SET primary_color = ?,
                secondary_color = ?,
                logo_key = ?,
                blur_intensity = ?,
                mask_style = ?,
                privacy_default_enabled = ?,
                tooltips = ?
            WHERE id = ?
            "#,
        )
        .bind(&config.primary_color)
        .bind(&config.secondary_color)
        .bind(&config.logo_key)
        .bind(config.blur_intensity)
        .bind(&config.mask_style)
        .bind(config.privacy_default_enabled)
        .bind(&config.tooltips)
        .bind(GLOBAL_CONFIG_ID)
        .execute(&self.pool)
        .await?;
        self.get_or_create().await
    }

    async fn set_asset_key(&self, kind: AssetKind, key: &str) -> Result<()> {
        self.insert_defaults_if_missing().await?;
        let column = match kind {
            AssetKind::Intro => "intro_video_key",
            AssetKind::Outro => "outro_video_key",
            AssetKind::Logo => "logo_key",
        };
        // Column name comes from the enum above, never from user input.
        let query = format!("UPDATE configurations SET {column} = ? WHERE id = ?");
        sqlx::query(&query)
            .bind(key)
            .bind(GLOBAL_CONFIG_ID)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
