pub mod postgres_lease_repository;

pub use postgres_lease_repository::PostgresLeaseRepository;
