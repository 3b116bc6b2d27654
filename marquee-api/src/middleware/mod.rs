pub mod auth;
pub mod rate_limit;

pub use auth::{admin_auth_middleware, viewer_auth_middleware, Claims, JwtPrincipalResolver, PrincipalResolver};
pub use rate_limit::rate_limit_middleware;
