//! HTTP layer: router, guards and error responses

pub mod error;
pub mod middleware;
pub mod routes;

pub use error::AppError;
pub use routes::build_router;
