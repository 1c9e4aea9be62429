//! Database initialization and row helpers

pub mod init;

pub use init::{init_database, init_schema, open_in_memory};
