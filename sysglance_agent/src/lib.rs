//! sysglance agent: samples system telemetry once per second, keeps a short
//! time-windowed history, streams snapshots over WebSocket and serves process
//! listing, control and AI analysis over HTTP.

pub mod analysis;
pub mod broadcast;
pub mod config;
pub mod control;
pub mod error;
pub mod history;
pub mod probe;
pub mod routes;
pub mod sampler;
pub mod state;
pub mod types;
pub mod ws;
