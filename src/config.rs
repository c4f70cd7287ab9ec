//! Environment-driven configuration

use std::env;
use std::time::Duration;

use crate::domain::value_objects::Phone;

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_CURRENCY: &str = "ARS";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_LOGIN_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_LOGIN_LOCKOUT_SECS: u64 = 5 * 60;
const DEFAULT_FEED_TTL_SECS: u64 = 60;
const DEFAULT_IMAGE_CACHE_ENTRIES: usize = 512;
const DEFAULT_IMAGE_MAX_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub port: u16,
    pub currency: String,
    pub nats_url: Option<String>,
    /// Shop number that receives WhatsApp orders.
    pub whatsapp_phone: Phone,
    pub products_csv_url: String,
    pub flavors_csv_url: String,
    /// How long a fetched feed is served before the CSVs are pulled again.
    pub feed_ttl: Duration,
    pub auth: AuthSettings,
    pub images: ImageSettings,
    pub sheets: SheetsSettings,
}

#[derive(Clone, Debug)]
pub struct AuthSettings {
    /// HS256 secret the identity service signs access tokens with.
    pub jwt_secret: String,
    pub admin_username: String,
    pub admin_password: String,
    pub login_max_attempts: u32,
    pub login_lockout: Duration,
    pub secure_cookies: bool,
}

/// Limits for the `/images` proxy. Hosts seen in catalog image urls are
/// allowed on top of `allowed_hosts`.
#[derive(Clone, Debug)]
pub struct ImageSettings {
    pub allowed_hosts: Vec<String>,
    pub max_entries: usize,
    pub max_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct SheetsSettings {
    pub base_url: String,
    pub spreadsheet_id: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub clients_range: String,
    pub products_range: String,
    pub stock_range: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            port: parsed("PORT", DEFAULT_PORT)?,
            currency: env::var("CURRENCY").unwrap_or_else(|_| DEFAULT_CURRENCY.to_string()),
            nats_url: env::var("NATS_URL").ok(),
            whatsapp_phone: phone("WHATSAPP_PHONE")?,
            products_csv_url: required("PRODUCTS_CSV_URL")?,
            flavors_csv_url: required("FLAVORS_CSV_URL")?,
            feed_ttl: Duration::from_secs(parsed("FEED_TTL_SECS", DEFAULT_FEED_TTL_SECS)?),
            auth: AuthSettings {
                jwt_secret: required("AUTH_JWT_SECRET")?,
                admin_username: required("ADMIN_USERNAME")?,
                admin_password: required("ADMIN_PASSWORD")?,
                login_max_attempts: parsed("LOGIN_MAX_ATTEMPTS", DEFAULT_LOGIN_MAX_ATTEMPTS)?,
                login_lockout: Duration::from_secs(parsed("LOGIN_LOCKOUT_SECS", DEFAULT_LOGIN_LOCKOUT_SECS)?),
                secure_cookies: parsed("SECURE_COOKIES", true)?,
            },
            images: ImageSettings {
                allowed_hosts: env::var("IMAGE_ALLOWED_HOSTS").map(|v| host_list(&v)).unwrap_or_default(),
                max_entries: parsed("IMAGE_CACHE_MAX_ENTRIES", DEFAULT_IMAGE_CACHE_ENTRIES)?,
                max_bytes: parsed("IMAGE_MAX_BYTES", DEFAULT_IMAGE_MAX_BYTES)?,
            },
            sheets: SheetsSettings {
                base_url: env::var("SHEETS_BASE_URL").unwrap_or_else(|_| DEFAULT_SHEETS_BASE.to_string()),
                spreadsheet_id: env::var("SHEETS_SPREADSHEET_ID").unwrap_or_default(),
                api_key: env::var("SHEETS_API_KEY").ok(),
                access_token: env::var("SHEETS_ACCESS_TOKEN").ok(),
                clients_range: env::var("SHEETS_CLIENTS_RANGE").unwrap_or_else(|_| "Clientes!A2:C".to_string()),
                products_range: env::var("SHEETS_PRODUCTS_RANGE").unwrap_or_else(|_| "Productos!A2:H".to_string()),
                stock_range: env::var("SHEETS_STOCK_RANGE").unwrap_or_else(|_| "Stock!A2:F".to_string()),
            },
        })
    }

    pub fn bind_addr(&self) -> String { format!("0.0.0.0:{}", self.port) }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            admin_username: String::new(),
            admin_password: String::new(),
            login_max_attempts: DEFAULT_LOGIN_MAX_ATTEMPTS,
            login_lockout: Duration::from_secs(DEFAULT_LOGIN_LOCKOUT_SECS),
            secure_cookies: true,
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self { allowed_hosts: vec![], max_entries: DEFAULT_IMAGE_CACHE_ENTRIES, max_bytes: DEFAULT_IMAGE_MAX_BYTES }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).ok().filter(|v| !v.trim().is_empty()).ok_or(ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// The shop number is checked at startup, not on the first checkout.
fn phone(name: &'static str) -> Result<Phone, ConfigError> {
    let value = required(name)?;
    Phone::new(&value).map_err(|_| ConfigError::Invalid { name, value })
}

fn host_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|h| h.trim().to_lowercase()).filter(|h| !h.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_parsed_default_and_invalid() {
        assert_eq!(parsed("VAPE_TEST_UNSET_PORT", 8083u16).unwrap(), 8083);
        env::set_var("VAPE_TEST_BAD_PORT", "eighty");
        assert!(matches!(parsed::<u16>("VAPE_TEST_BAD_PORT", 1), Err(ConfigError::Invalid { name: "VAPE_TEST_BAD_PORT", .. })));
    }

    #[test]
    fn test_shop_phone_parsed_up_front() {
        env::set_var("VAPE_TEST_SHOP_PHONE", "+54 9 11 1234-5678");
        assert_eq!(phone("VAPE_TEST_SHOP_PHONE").unwrap().as_str(), "5491112345678");
        env::set_var("VAPE_TEST_BAD_SHOP_PHONE", "call me");
        assert!(matches!(phone("VAPE_TEST_BAD_SHOP_PHONE"), Err(ConfigError::Invalid { name: "VAPE_TEST_BAD_SHOP_PHONE", .. })));
        assert!(matches!(phone("VAPE_TEST_UNSET_SHOP_PHONE"), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_host_list() {
        assert_eq!(host_list(" CDN.example.com, ,i.imgur.com"), vec!["cdn.example.com".to_string(), "i.imgur.com".to_string()]);
    }
}
