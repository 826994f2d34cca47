use eventbus::BrokerConfig;

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

/// Service configuration sourced from the environment.
#[derive(Debug, Clone)]
pub struct HomeConfig {
    pub bind_addr: String,
    pub pg_url: String,
    pub temperature_api_url: String,
    pub broker: BrokerConfig,
}

impl HomeConfig {
    pub fn from_env() -> Self {
        let bind_addr = format!("0.0.0.0:{}", env_or("SMART_HOME_PORT", "8080"));

        let pg_url = format!(
            "host={} port={} user={} password={} dbname={}",
            env_or("SMART_HOME_DB_HOST", "localhost"),
            env_or("SMART_HOME_DB_PORT", "5432"),
            env_or("SMART_HOME_DB_USER", "smarthome"),
            env_or("SMART_HOME_DB_PASSWORD", "smarthome123"),
            env_or("SMART_HOME_DB_NAME", "smarthome"),
        );

        Self {
            bind_addr,
            pg_url,
            temperature_api_url: env_or("TEMPERATURE_API_URL", "http://temperature-api:8081"),
            broker: BrokerConfig::from_env(),
        }
    }
}
