pub mod handlers;
pub mod reports;
pub mod routes;

pub use routes::{create_api_router, create_storefront_router};
