// Datasource key resolution: explicit declarations, read/write split and load balancing
pub mod key_registry;
pub mod matcher;
pub mod router;
pub mod selector;

pub use key_registry::{AttributeKeyParser, DataSourceKeyParser, DeclaredKeyParser, MethodDataSourceKeyRegistry};
pub use matcher::WriteOperationMatcher;
pub use router::{
    DataSourceKeyRouter, RandomRouter, RoundRobinRouter, WeightedRandomRouter, RANDOM,
    ROUND_ROBIN, WEIGHTED_RANDOM,
};
pub use selector::{DataSourceKeySelector, RouterAllocationTable, SelectorBuilder};
