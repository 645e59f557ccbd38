// Dialect-aware clause rewriting applied right before dispatch
pub mod orderby;
pub mod pagination;
pub mod pipeline;
pub mod transformer;
pub mod wrapper;

pub use orderby::OrderByTransformer;
pub use pagination::PaginationTransformer;
pub use pipeline::{TransformerPipeline, TransformerPipelineBuilder};
pub use transformer::ClauseTransformer;
pub use wrapper::{OrderByItem, PageRequest, SqlRequest, SqlStatementWrapper};
