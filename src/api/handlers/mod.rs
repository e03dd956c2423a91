pub mod query;

pub use query::AppState;
