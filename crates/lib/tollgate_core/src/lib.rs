//! # tollgate_core
//!
//! Token lifecycle and role-based access control for Tollgate.
//!
//! [`auth::tokens::TokenService`] issues, verifies, rotates and revokes JWTs;
//! [`auth::access::AccessControlService`] resolves role permissions on top of
//! it. Persistence is reached only through the traits in [`store`].

pub mod auth;
pub mod migrate;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
