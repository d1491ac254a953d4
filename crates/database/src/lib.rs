//! # MAG Database Crate
//!
//! Storage for daily records, analysis results and special nodes. It is the
//! only part of the system that knows how data is laid out at rest.
//!
//! ## Architectural Principles
//!
//! - **One Contract, Two Backends:** The analysis engine talks to the
//!   `RecordStore` trait only. `DbRepository` implements it on PostgreSQL and
//!   `MemoryStore` implements it in memory for tests and dry runs.
//! - **Date Order, Not Row Order:** Every "previous", "next" and "before"
//!   lookup follows calendar order, so gaps and out-of-order imports are safe.
//! - **Asynchronous & Pooled:** All operations are asynchronous, and the
//!   PostgreSQL backend uses a connection pool (`PgPool`).
//!
//! ## Public API
//!
//! - `RecordStore`: The storage contract used by the analyzer.
//! - `DbRepository` / `MemoryStore`: The two implementations.
//! - `connect` / `run_migrations`: Pool creation and schema setup.
//! - `scan_for_crossing`: The break-index crossing scan shared by both backends.
//! - `DbError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::MemoryStore;
pub use repository::DbRepository;
pub use store::{scan_for_crossing, RecordStore};
