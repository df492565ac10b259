//! Bootstrap module for initializing the Nightfall server
//!
//! This module handles:
//! - Configuration loading
//! - Database initialization
//! - Service initialization and dependency injection

pub mod config;
pub mod database;
pub mod services;

pub use config::load_config;
pub use database::{init_database, init_database_lazy};
pub use services::{init_services, Services};
