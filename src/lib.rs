pub mod cli;
pub mod connectors;
pub mod engine;
pub mod utils;

pub use cli::*;
pub use connectors::*;
pub use engine::*;
pub use utils::*;
