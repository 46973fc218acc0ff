//! Database driver implementations.

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;
