//! Offline support: a cache-first interceptor in front of the network.
//!
//! A [`ServiceWorker`] pre-caches the application's assets into a versioned
//! store when installed, removes stores of older versions when activated,
//! and answers every GET from the store before falling back to the network.
//! Bumping the store version is the only way to invalidate cached assets.

mod clients;
mod fetcher;
mod message;
mod registration;
mod request;
mod store;
mod worker;

pub use clients::{ClientId, Clients};
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use message::{ControlReply, ControlRequest, MessageEvent, ReplyPort};
pub use registration::{Registration, RegistrationError};
pub use request::{Request, RequestIdentity, Response, ResponseType};
pub use store::{CacheStorage, CacheStore};
pub use worker::{
    Event, EventKind, EventOutcome, FetchResponse, ResponseSource, ServiceWorker, WorkerError,
    WorkerState,
};

/// Logical name of the application's store.
pub const DEFAULT_CACHE_NAME: &str = "pwa-camara";

/// Current store version.
pub const DEFAULT_CACHE_VERSION: u32 = 1;

/// Assets fetched and stored on install.
pub const ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/app.js",
    "/manifest.json",
    "/assets/192.png",
    "/assets/512.png",
];

/// Versioned store name, e.g. `pwa-camara-v1`.
pub fn store_name(name: &str, version: u32) -> String {
    format!("{}-v{}", name, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_name() {
        assert_eq!(
            store_name(DEFAULT_CACHE_NAME, DEFAULT_CACHE_VERSION),
            "pwa-camara-v1"
        );
        assert_eq!(store_name("app", 12), "app-v12");
    }

    #[test]
    fn test_asset_manifest() {
        assert_eq!(ASSETS.len(), 6);
        assert_eq!(ASSETS[0], "/");
        assert!(ASSETS.contains(&"/manifest.json"));
    }
}
