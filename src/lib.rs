#![forbid(unsafe_code)]

//! Caçadores de Falhas authentication: a token-issuing HTTP gateway and the
//! client that dashboards use to talk to it.

pub mod auth;
pub mod client;
pub mod config;
pub mod gateway;

pub use config::Config;
