#![recursion_limit = "256"]

pub mod cli;
pub mod application;
pub mod config;
pub mod domain;
pub mod data;
pub mod decoding;
pub mod ml;
pub mod infra;
pub mod error;

pub use config::NatConfig;
pub use error::{NatError, NatResult};
pub use ml::engine::NatEngine;
