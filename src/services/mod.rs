pub mod datasource; // Named datasources, pools and the registry
pub mod dialect; // Dialect-aware ORDER BY / pagination rewriting
pub mod engine;
pub mod routing; // Datasource key selection
pub mod transaction;

pub use engine::{DynamicDataSource, PreparedStatement};
