//! Site configuration, loaded once from a YAML file at startup.
//!
//! ```yaml
//! sites:
//!   example:
//!     url: https://example.com
//!     title: Example
//!     description: Latest posts
//!     article_selector: article
//!     title_selector: h2
//!     link_selector: a
//!     link_attribute_name: href
//!     date_selector: time
//!     date_format: "%Y-%m-%dT%H:%M:%S%:z"
//!     content_selector: div.summary
//!   upstream:
//!     existing_rss_url: https://example.org/feed.xml
//! ```
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML in config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("site '{site}' has unknown timezone '{timezone}'")]
    InvalidTimezone { site: String, timezone: String },
}

/// One scraped (or passed-through) site.
///
/// Missing keys load as empty strings. When `existing_rss_url` is set the
/// selector fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub url: String,
    pub title: String,
    pub description: String,
    pub article_selector: String,
    pub title_selector: String,
    pub link_selector: String,
    pub date_selector: String,
    pub content_selector: String,
    /// strftime pattern for the `datetime` attribute of the date node.
    pub date_format: String,
    pub link_attribute_name: String,
    pub existing_rss_url: Option<String>,
    /// IANA zone for dates that carry no offset. UTC when unset.
    pub timezone: Option<String>,
}

impl SiteConfig {
    /// The upstream feed to pass through, if any. An empty string counts
    /// as unset.
    pub fn existing_feed(&self) -> Option<&str> {
        self.existing_rss_url
            .as_deref()
            .filter(|url| !url.is_empty())
    }

    pub fn tz(&self) -> Tz {
        self.timezone
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or(Tz::UTC)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sites: HashMap<String, SiteConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        tracing::info!(
            path = %path.display(),
            sites = config.sites.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;

        for (key, site) in &config.sites {
            if let Some(name) = site.timezone.as_deref() {
                if name.parse::<Tz>().is_err() {
                    return Err(ConfigError::InvalidTimezone {
                        site: key.clone(),
                        timezone: name.to_string(),
                    });
                }
            }
        }

        Ok(config)
    }

    pub fn site(&self, key: &str) -> Option<&SiteConfig> {
        self.sites.get(key)
    }
}
