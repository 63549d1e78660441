//! HTTP boundary: server, routes, and the rate limiting middleware.

mod middleware;
mod server;

pub use middleware::{rate_limit, ErrorResponse, LIMIT_EXCEEDED_MESSAGE, TOKEN_HEADER};
pub use server::HttpServer;
