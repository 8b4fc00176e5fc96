//! Database models.

pub mod chapter;
pub mod configuration;
pub mod hierarchy;
pub mod observability;

pub use chapter::{ChapterContextRow, ChapterDbModel, ChapterStatus};
pub use configuration::GlobalConfigDbModel;
pub use hierarchy::{CollectionDbModel, ModuleDbModel, SystemDbModel};
pub use observability::{AuditLogDbModel, FeedbackDbModel, ProcessingJobDbModel};
