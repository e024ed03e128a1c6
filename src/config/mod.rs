pub mod schema;

pub use schema::{
    expand_path, Config, FirehoseConfig, ServerConfig, ServerTransport, SessionsConfig, StoreConfig,
    TransportConfig,
};
