//! pwa-camera library crate.
//!
//! Camera capture with status notifications, plus an offline cache-first
//! request interceptor backed by versioned on-disk stores.

pub mod app;
pub mod camera;
pub mod cli;
pub mod config;
pub mod offline;
pub mod status;
