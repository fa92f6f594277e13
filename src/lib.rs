//! Mapping-driven HTTP gateway library.

pub mod cache;
pub mod config;
pub mod http;
pub mod mapping;
pub mod observability;
pub mod proxy;
pub mod routing;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use mapping::MappingRegistry;
