pub mod sqlite_lease_repository;

pub use sqlite_lease_repository::SqliteLeaseRepository;
