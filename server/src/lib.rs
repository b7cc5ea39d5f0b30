//! OBEX Alert Server - Security alert ingestion backend.
//!
//! This crate provides the backend of the OBEX alert system, responsible
//! for:
//! - Ingesting security alerts from edge devices over HTTP and MQTT
//! - Persisting every accepted alert exactly once in SQLite
//! - Broadcasting accepted alerts to connected WebSocket dashboards
//! - Serving cached analytics queries over the persisted history
//!
//! # Architecture
//!
//! Both ingest surfaces feed a single pipeline (validate, persist,
//! broadcast), so an alert behaves identically regardless of how it
//! arrived. Reads go through an analytics query service fronted by an
//! in-process TTL cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod mqtt;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod routes;
pub mod store;
pub mod types;
