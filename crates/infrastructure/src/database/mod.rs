pub mod failover;
pub mod lease_repository;
pub mod pool;
pub mod postgres;
pub mod schema;
pub mod sqlite;

pub use failover::{DbHandle, DbInstance, DbManager, Side};
pub use lease_repository::DbLeaseRepository;
pub use pool::{DatabasePool, DatabaseType};
pub use postgres::PostgresLeaseRepository;
pub use schema::ensure_schema;
pub use sqlite::SqliteLeaseRepository;
