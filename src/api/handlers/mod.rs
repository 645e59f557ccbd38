pub mod datasource;
pub mod route;
pub mod transform;

pub use datasource::AppState;
