//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, WebSockets, metrics servers).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: Polymarket data API client, pagination DTOs and auth
//! - `feeds`: Live market stream over WebSocket
//! - `metrics`: Prometheus metrics export and health checks

pub mod api;
pub mod feeds;
pub mod metrics;
