pub mod cache;
pub mod resolver;
pub mod source;

pub use cache::{CacheKey, PriceCache};
pub use resolver::PricingResolver;
pub use source::{builtin_catalog, LivePriceSource, NoLiveSource};
