pub mod address_worker;

pub use address_worker::{AddressWorker, ResolveRequest};
