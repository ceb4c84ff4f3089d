/// Realtime service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origin of the main application API (e.g. `http://localhost:3000`),
    /// used for identity resolution and authorization checks.
    pub api_url: String,
    /// Services active in this process, from the comma-separated `SERVICES`
    /// variable.
    pub services: Vec<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
}

/// Known service names for the `SERVICES` list.
pub mod service {
    pub const WEBSOCKETS: &str = "websockets";
    pub const COLLABORATION: &str = "collaboration";
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            api_url: required_var("API_URL"),
            services: parse_services(
                &std::env::var("SERVICES").unwrap_or_else(|_| service::WEBSOCKETS.to_string()),
            ),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        }
    }

    /// Whether the collaborative-editing service shares this process.
    pub fn collaboration_enabled(&self) -> bool {
        self.services.iter().any(|s| s == service::COLLABORATION)
    }
}

fn parse_services(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
