//! Process configuration, read once from the environment at startup.

use std::env;
use std::time::Duration;

const DEFAULT_PORT: &str = "8083";
const DEFAULT_ORDER_PREFIX: &str = "WTF";
const DEFAULT_PAYMENT_API_URL: &str = "https://payments.zoho.in/api/v1";
const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.zoho.in";
const DEFAULT_WEBSITE_URL: &str = "http://localhost:3000";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 15;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: String,
    pub environment: Environment,
    pub order_prefix: String,
    pub jwt_secret: String,
    pub webhook_secret: Option<String>,
    pub gateway: GatewayConfig,
}

/// Payment gateway settings. Credentials stay optional so development runs
/// can work without them.
#[derive(Clone)]
pub struct GatewayConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub org_id: Option<String>,
    pub api_url: String,
    pub accounts_url: String,
    pub website_url: String,
    pub backend_url: String,
    pub timeout: Duration,
}

/// Usable OAuth client credentials.
#[derive(Clone)]
pub struct GatewayCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
        let backend_url = optional("BACKEND_URL").unwrap_or_else(|| format!("http://localhost:{port}"));
        let timeout_secs = optional("GATEWAY_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_SECS);

        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            environment: optional("APP_ENV").map(|v| Environment::parse(&v)).unwrap_or_default(),
            order_prefix: optional("ORDER_ID_PREFIX").unwrap_or_else(|| DEFAULT_ORDER_PREFIX.to_string()),
            jwt_secret: env::var("JWT_SECRET")?,
            webhook_secret: optional("PAYMENT_WEBHOOK_SECRET"),
            gateway: GatewayConfig {
                client_id: optional("ZOHO_CLIENT_ID"),
                client_secret: optional("ZOHO_CLIENT_SECRET"),
                refresh_token: optional("ZOHO_REFRESH_TOKEN"),
                org_id: optional("ZOHO_ORG_ID"),
                api_url: optional("ZOHO_PAYMENT_API_URL").unwrap_or_else(|| DEFAULT_PAYMENT_API_URL.to_string()),
                accounts_url: optional("ZOHO_ACCOUNTS_URL").unwrap_or_else(|| DEFAULT_ACCOUNTS_URL.to_string()),
                website_url: optional("WEBSITE_URL").unwrap_or_else(|| DEFAULT_WEBSITE_URL.to_string()),
                backend_url,
                timeout: Duration::from_secs(timeout_secs),
            },
            port,
        })
    }
}

impl GatewayConfig {
    /// Gateway settings with no credentials, pointing at the given base urls.
    pub fn unconfigured(api_url: impl Into<String>, accounts_url: impl Into<String>) -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_token: None,
            org_id: None,
            api_url: api_url.into(),
            accounts_url: accounts_url.into(),
            website_url: DEFAULT_WEBSITE_URL.to_string(),
            backend_url: format!("http://localhost:{DEFAULT_PORT}"),
            timeout: Duration::from_secs(DEFAULT_GATEWAY_TIMEOUT_SECS),
        }
    }

    /// Client credentials, or `None` when they are missing or still placeholders.
    pub fn credentials(&self) -> Option<GatewayCredentials> {
        let client_id = usable(self.client_id.as_deref())?;
        let client_secret = usable(self.client_secret.as_deref())?;
        Some(GatewayCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: usable(self.refresh_token.as_deref()).map(str::to_string),
        })
    }

    pub fn organization(&self) -> Option<&str> {
        usable(self.org_id.as_deref())
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Values left as `YOUR_...` in a sample env file count as unset.
fn usable(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && !v.starts_with("YOUR_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse(" PROD "), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Development);
    }

    #[test]
    fn test_placeholder_credentials_are_unset() {
        let mut gateway = GatewayConfig::unconfigured("http://api", "http://accounts");
        assert!(gateway.credentials().is_none());

        gateway.client_id = Some("YOUR_CLIENT_ID".into());
        gateway.client_secret = Some("secret".into());
        assert!(gateway.credentials().is_none());

        gateway.client_id = Some("1000.ABC".into());
        gateway.refresh_token = Some("YOUR_REFRESH_TOKEN".into());
        let creds = gateway.credentials().unwrap();
        assert_eq!(creds.client_id, "1000.ABC");
        assert!(creds.refresh_token.is_none());
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = GatewayCredentials { client_id: "id".into(), client_secret: "s3cr3t".into(), refresh_token: Some("r3fr3sh".into()) };
        let printed = format!("{creds:?}");
        assert!(!printed.contains("s3cr3t"));
        assert!(!printed.contains("r3fr3sh"));
    }
}
