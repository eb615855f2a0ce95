pub mod address_repository;
pub mod error;
pub mod models;
pub mod pool;
pub mod site_repository;

pub use address_repository::AddressRepository;
pub use error::DbError;
pub use models::*;
pub use pool::{connect, migrate, ping};
pub use site_repository::SiteRepository;
