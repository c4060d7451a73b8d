//! Protocol frontends: one forwarder per protocol, each constructed from
//! a destination table and a shared region resolver.

pub mod grpc;
pub mod http;

pub use grpc::GrpcForwarder;
pub use http::HttpForwarder;
