//! Portal-plane command surface
//!
//! Thin CRUD boundary the request pipeline does not depend on. Every
//! endpoint (except signup/login) expects a portal bearer token; owner
//! role is enforced for mutations, any member may read.

pub mod agents;
pub mod api_keys;
pub mod auth;
pub mod conversations;
pub mod invites;
pub mod members;
pub mod tenants;
pub mod traces;
