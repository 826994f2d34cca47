//! Legacy smart-home sensor service.
//!
//! Owns the sensor store and its HTTP API. Every successful mutation
//! publishes a sensor lifecycle event so the device registry can mirror
//! the change; temperature readings are enriched from the external
//! temperature API on reads.

pub mod api;
pub mod config;
pub mod models;
pub mod store;
pub mod temperature;
