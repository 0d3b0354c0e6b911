//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Units of work that open or join a transaction
//! - Query functions grouped by table family

pub mod migrations;
pub mod repo;
pub mod unit_of_work;

pub use migrations::{init_db, init_db_with};
pub use unit_of_work::UnitOfWork;
