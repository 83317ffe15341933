pub mod bulk;
pub mod cacheability;
pub mod chain;
pub mod filter;
pub mod single;

pub use bulk::BulkEndpoint;
pub use cacheability::CacheabilityMiddleware;
pub use chain::{Chain, DispatchOutcome, Forwarder, Middleware, MiddlewareResponse};
pub use filter::{Filter, FilterRegistry};
pub use single::SingleEndpoint;
