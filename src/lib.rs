pub mod api;
pub mod config;
pub mod error;
pub mod kv_store;
pub mod store;

pub use store::{BackendRegistry, Store, StoreError};
