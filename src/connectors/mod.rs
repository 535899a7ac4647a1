// Connector implementations
pub mod connector_trait;
pub mod csv_connector;
pub mod memory_connector;

pub use connector_trait::*;
pub use csv_connector::*;
pub use memory_connector::*;
