//! Claimgate - role-based claim authorization
//!
//! A permission table keyed by role and action, route-permission maps for
//! API and page routes, and a request gate that combines them with a
//! verified session. The same pieces back the `claimgate` service binary.

pub mod authz;
pub mod errors;
pub mod session;
pub mod settings;
pub mod web;
