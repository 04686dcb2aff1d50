//! Import archived feed articles (`.eml`) into a feed reader's database.

pub mod config;
pub mod entry;
pub mod feed;
pub mod importer;
pub mod message;
pub mod model;
pub mod storage;
pub mod sync;
