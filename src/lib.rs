#[macro_use]
extern crate slog;

pub mod acl;
pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod leases;
pub mod message;
pub mod server;
pub mod snapshot;
pub mod web;
