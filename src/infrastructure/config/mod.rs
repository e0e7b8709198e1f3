mod settings;

pub use settings::{
    DatabaseConfig, JwtConfig, OtelConfig, RelayConfig, ServerConfig, Settings, WebSocketConfig,
};
