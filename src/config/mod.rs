pub mod catalog;
pub mod settings;

pub use catalog::{Catalog, EventRule, FeedSource, KeywordSets};
pub use settings::Settings;
