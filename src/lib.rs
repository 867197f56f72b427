//! Safety-weighted road routing.
//!
//! A road network is scored edge by edge ([`risk`]) and searched for the
//! route that minimises `risk * 1000 + length * 0.1` ([`path`]). The HTTP
//! layer in [`api`] wraps the current [`session::Session`].

pub mod api;
pub mod config;
pub mod error;
pub mod graph;
pub mod havens;
pub mod incidents;
pub mod path;
pub mod provider;
pub mod risk;
pub mod session;
pub mod spatial;
pub mod store;

pub use error::{RouteError, RouteResult};
