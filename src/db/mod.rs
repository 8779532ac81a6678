pub mod cache;
pub mod postgres;
pub mod store;

pub use cache::{create_redis_client, PoolCache, PoolCacheKey};
pub use postgres::create_pool;
pub use store::RecommendationStore;
