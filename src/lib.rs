//! cip-functions - reconciles sewage and waste telemetry into city entities
//!
//! This library exposes the core modules for testing and reuse.

pub mod common;
pub mod config;
pub mod entity;
pub mod error;
pub mod functions;
pub mod messaging;
pub mod reconciler;
pub mod routes;
pub mod senml;
pub mod storage;
pub mod things;
