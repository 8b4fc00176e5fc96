//! Global configuration singleton model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Fixed identity of the singleton configuration row.
pub const GLOBAL_CONFIG_ID: i64 = 1;

/// Global configuration: branding plus optional intro/outro assets consulted
/// at publish time. Exactly one row (id = 1), created lazily with defaults.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GlobalConfigDbModel {
    pub id: i64,
    pub primary_color: String,
    pub secondary_color: String,
    pub logo_key: Option<String>,
    pub blur_intensity: i64,
    pub mask_style: String,
    pub privacy_default_enabled: bool,
    /// Free-form tooltip texts, serialized JSON object.
    pub tooltips: String,
    pub intro_video_key: Option<String>,
    pub outro_video_key: Option<String>,
}

impl Default for GlobalConfigDbModel {
    fn default() -> Self {
        Self {
            id: GLOBAL_CONFIG_ID,
            primary_color: "#0099ff".to_string(),
            secondary_color: "#2b8a3e".to_string(),
            logo_key: None,
            blur_intensity: 6,
            mask_style: "dots".to_string(),
            privacy_default_enabled: false,
            tooltips: "{}".to_string(),
            intro_video_key: None,
            outro_video_key: None,
        }
    }
}

impl GlobalConfigDbModel {
    /// Whether publishing requires a stitch pass.
    pub fn wants_stitch(&self) -> bool {
        self.intro_video_key.is_some() || self.outro_video_key.is_some()
    }
}
