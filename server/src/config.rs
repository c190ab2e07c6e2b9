/// Relay server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Capacity of the command channel feeding the session task.
    pub command_capacity: usize,
    /// Capacity of the broadcast channel fanning out to connections.
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8081".to_string(),
            command_capacity: 256,
            broadcast_capacity: 64,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden from the environment. `dotenvy` has already been
    /// given a chance to populate it by the time this runs.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("HELI_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        if self.command_capacity == 0 {
            return Err("command_capacity must be positive".to_string());
        }
        if self.broadcast_capacity == 0 {
            return Err("broadcast_capacity must be positive".to_string());
        }
        Ok(())
    }
}
