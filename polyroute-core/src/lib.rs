//! Core routing and forwarding engine for poly-route.
//!
//! poly-route is a region-aware reverse proxy: inbound HTTP and gRPC
//! requests are matched against per-protocol destination tables and
//! forwarded to the backend configured for the region the request belongs
//! to. The region is taken from request metadata and optionally translated
//! through an HTTP lookup service before the destination is chosen.
//!
//! The crate exposes two handlers that an outer process mounts on its
//! listeners: [`forwarder::HttpForwarder`] (an axum handler) and
//! [`forwarder::GrpcForwarder`] (a catch-all tower service speaking raw
//! gRPC frames). Everything else - the entrypoint matcher, the region
//! resolver and the pass-through codec - exists in support of those two.

pub mod codec;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod resolver;
pub mod routing;

pub use config::ServiceConfig;
pub use error::{PolyRouteError, Result};
