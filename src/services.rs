pub mod address_service;
pub mod site_service;

pub use address_service::{AddressService, ResolveOutcome};
pub use site_service::{SiteService, SiteUpsertRequest, SiteView};
