pub mod stat_repository;

pub use stat_repository::{SqliteStatRepository, StatRepository};
