mod auth;

pub use auth::{auth_middleware, optional_auth_middleware, CurrentUser, OptionalUser};
