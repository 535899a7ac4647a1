// Core engine components
pub mod aggregate;
pub mod engine;
pub mod explain;
pub mod join_engine;
pub mod query_cache;
pub mod query_executor;
pub mod query_parser;
pub mod query_planner;

pub use aggregate::*;
pub use engine::*;
pub use explain::*;
pub use join_engine::*;
pub use query_cache::*;
pub use query_executor::*;
pub use query_parser::*;
pub use query_planner::*;
