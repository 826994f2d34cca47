use eventbus::BrokerConfig;

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

/// Service configuration sourced from the environment.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub bind_addr: String,
    pub pg_url: String,
    pub broker: BrokerConfig,
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        let bind_addr = format!("0.0.0.0:{}", env_or("DEVICE_REGISTRY_PORT", "8082"));

        let pg_url = format!(
            "host={} port={} user={} password={} dbname={}",
            env_or("DEVICE_REGISTRY_DB_HOST", "localhost"),
            env_or("DEVICE_REGISTRY_DB_PORT", "5433"),
            env_or("DEVICE_REGISTRY_DB_USER", "device_registry"),
            env_or("DEVICE_REGISTRY_DB_PASSWORD", "device123"),
            env_or("DEVICE_REGISTRY_DB_NAME", "device_registry"),
        );

        Self {
            bind_addr,
            pg_url,
            broker: BrokerConfig::from_env(),
        }
    }
}
