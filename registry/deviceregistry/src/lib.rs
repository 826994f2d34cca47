//! Device registry service.
//!
//! Owns the device store and keeps it eventually consistent with the
//! legacy sensor store by reconciling inbound sensor lifecycle events,
//! and by emitting device lifecycle events (including the `device.deleted`
//! cascade) for downstream consumers.

pub mod api;
pub mod config;
pub mod models;
pub mod postgres;
pub mod reconciler;
pub mod service;
pub mod store;
pub mod typemap;
