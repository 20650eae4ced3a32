pub mod batch;
pub mod database;
pub mod graph;
pub mod questions;

pub use batch::{normalize_content, UpsertOutcome, WriteBatch};
pub use database::{Database, NewPriority};
