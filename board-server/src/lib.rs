//! Live departure boards for Vienna public transport.
//!
//! Polls the Wiener Linien realtime monitor endpoint, publishes normalized
//! snapshots on a message bus, caches them and serves curated boards over
//! HTTP, as a live event stream and as Home Assistant sensors.

pub mod boards;
pub mod bus;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod hub;
pub mod ingest;
pub mod poller;
pub mod store;
pub mod web;
pub mod wien;
