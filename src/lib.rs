//! pkgindex - Private Package Index Library
//!
//! A distutils-compatible package index: upload protocol handler,
//! group-based authorization, metadata schema registry, artifact store and
//! offline import/verify tooling.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod formats;
pub mod metadata;
pub mod models;
pub mod services;
pub mod storage;

pub use config::Config;
pub use error::{AppError, Result};
