//! Role-based permission service for the estate management back office
//!
//! Decides whether a user may perform a function within an application
//! section by unioning the grants of every role the user holds, and lets
//! administrators manage roles, their permission matrices and memberships.

pub mod access_code;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod gate;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod validation;
