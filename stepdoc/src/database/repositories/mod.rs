//! Repository traits and their sqlx implementations.

pub mod chapter;
pub mod configuration;
pub mod hierarchy;
pub mod observability;

pub use chapter::{ChapterRepository, SqlxChapterRepository};
pub use configuration::{AssetKind, ConfigurationRepository, SqlxConfigurationRepository};
pub use hierarchy::{HierarchyRepository, SqlxHierarchyRepository};
pub use observability::{DashboardStats, ObservabilityRepository, SqlxObservabilityRepository};
