//! HTTP middleware

pub mod auth;

pub use auth::{
    auth_middleware, optional_auth, require_capability, AuthUser, CurrentUser, MaybeUser,
};
