//! Job persistence: SQLite pool and the job repository.

mod db;
mod repository;

pub use db::{Database, DbError};
pub use repository::{JobRepository, StoreError};
