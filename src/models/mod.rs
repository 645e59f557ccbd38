pub mod datasource;
pub mod invocation;
pub mod route;
pub mod transform;

pub use datasource::*;
pub use invocation::*;
pub use route::*;
pub use transform::*;
