// Declare modules within the adapters directory
pub mod in_memory_cache;
pub mod in_memory_repository;
pub mod mercado_pago;
pub mod postgres_repository;
pub mod redis_cache;

pub use in_memory_cache::InMemoryCache;
pub use in_memory_repository::InMemoryStore;
pub use mercado_pago::MercadoPagoGateway;
pub use postgres_repository::PostgresStore;
pub use redis_cache::RedisCache;
