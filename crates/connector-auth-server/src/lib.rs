pub mod config;
pub mod observability;
pub mod server;

pub use config::{AppConfig, LoggingConfig, ServerConfig, StorageConfig};
pub use observability::init_tracing;
pub use server::{AuthServices, ConnectorAuthServer, ServerBuilder, build_app};
