// Adapters layer: concrete implementations for external systems (http, notification channels, storage).

pub mod http;
pub mod notify;
pub mod storage;

pub use http::{HttpFetcher, HttpSettings};
pub use storage::LocalStorage;
