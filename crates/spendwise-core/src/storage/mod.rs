//! Storage layer for Spendwise Core.
//!
//! Skillbooks live in SQLite behind the [`SkillbookRepository`] trait. The
//! same database also holds the learning event log.

// SQL strings don't need hash-less raw strings
#![allow(clippy::needless_raw_string_hashes)]

pub mod database;
pub mod error;
pub mod events;
pub mod repositories;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use events::SqliteTelemetry;
pub use repositories::{SkillbookRepository, SqliteSkillbookRepository, StoredSkillbook};
