pub mod request;
pub mod response;
pub mod schema;
pub mod stat;
pub mod statement;

pub use request::*;
pub use response::*;
pub use schema::*;
pub use stat::*;
pub use statement::*;
