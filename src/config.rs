use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

use crate::service::access::Feature;

pub const CONFIG_FILE: &str = "config.toml";
pub const ENV_PREFIX: &str = "WEBAUDIT_";

pub static CONFIG: LazyLock<Config> = LazyLock::new(|| match Config::load() {
    Ok(cfg) => cfg,
    Err(e) => {
        eprintln!("invalid configuration, falling back to defaults: {e}");
        Config::default()
    }
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub gemini: GeminiConfig,
    pub pagespeed: PageSpeedConfig,
    pub payments: PaymentsConfig,
    pub scraper: ScraperConfig,
    pub smtp: SmtpConfig,
    pub link_check: LinkCheckConfig,
    pub access: AccessConfig,
}

impl Config {
    /// Defaults, then `config.toml`, then `WEBAUDIT_*` environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_addr: String,
    pub loglevel: String,
    pub database_url: String,
    /// Superuser key for `/api/admin/*`. Empty disables key-based admin access.
    pub admin_key: String,
    pub proxy: Option<Url>,
    pub max_body_bytes: usize,
    /// Largest audited page read for link checks and URL content analysis.
    pub max_page_bytes: usize,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            loglevel: "info".to_string(),
            database_url: "sqlite://webaudit.sqlite".to_string(),
            admin_key: String::new(),
            proxy: None,
            max_body_bytes: 10 * 1024 * 1024,
            max_page_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: Url,
    pub model: String,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
    pub max_input_chars: usize,
    pub max_image_bytes: usize,
    pub progress_interval_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: Url::parse("https://generativelanguage.googleapis.com/")
                .expect("static url is valid"),
            model: "gemini-2.0-flash".to_string(),
            timeout_secs: 60,
            requests_per_minute: 60,
            max_input_chars: 30_000,
            max_image_bytes: 5 * 1024 * 1024,
            progress_interval_ms: 1_500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSpeedConfig {
    pub api_key: Option<String>,
    pub base_url: Url,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for PageSpeedConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Url::parse("https://www.googleapis.com/pagespeedonline/v5/runPagespeed")
                .expect("static url is valid"),
            timeout_secs: 90,
            cache_ttl_secs: 600,
            cache_capacity: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub base_url: Url,
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub timeout_secs: u64,
    /// Billing cycles requested for new subscriptions.
    pub subscription_total_count: u32,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://api.razorpay.com/").expect("static url is valid"),
            key_id: String::new(),
            key_secret: String::new(),
            webhook_secret: String::new(),
            timeout_secs: 20,
            subscription_total_count: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: Url,
    pub timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://127.0.0.1:5000/").expect("static url is valid"),
            timeout_secs: 45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// No host means email sending is disabled.
    pub host: Option<String>,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: String::new(),
            password: String::new(),
            from: "Web Audit <no-reply@localhost>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkCheckConfig {
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub max_links: usize,
}

impl Default for LinkCheckConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout_secs: 10,
            max_links: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub free_features: Vec<Feature>,
    pub free_audit_limit: i64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            free_features: vec![Feature::PageSpeed, Feature::LinkCheck],
            free_audit_limit: 10,
        }
    }
}
