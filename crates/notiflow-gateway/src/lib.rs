//! # Notiflow Gateway
//! HTTP boundary: accepts notification requests and exposes their records.

pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, build_router, start};
