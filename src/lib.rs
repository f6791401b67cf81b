use actix_web::{
    http::{header, Method},
    route, web, HttpRequest, HttpResponse, Responder,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info};

pub mod cache;
pub mod config;
pub mod custom_date;
pub mod extract;
pub mod feed;
pub mod fetcher;

use cache::FetchCache;
use config::{Config, SiteConfig};
use extract::{extract_items, ExtractError};
use feed::{Feed, FeedError};
use fetcher::{FetchError, Fetcher};

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Args {
    #[clap(short, long, default_value = "0.0.0.0")]
    pub ip: String,

    #[clap(short, long, default_value = "4000")]
    pub port: u16,

    #[clap(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    #[clap(long, default_value = "300")]
    pub cache_lifetime: u64,

    #[clap(long, default_value = "info")]
    pub log_level: String,

    #[clap(long)]
    pub strict_tls: bool,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("site '{0}' not found in configuration")]
    SiteNotFound(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ExtractError),

    #[error(transparent)]
    Serialize(#[from] FeedError),
}

pub struct AppState {
    pub config: Config,
    pub cache: FetchCache,
    pub fetcher: Fetcher,
    pub cache_lifetime: Duration,
}

impl AppState {
    pub fn new(config: Config, fetcher: Fetcher, cache_lifetime: Duration) -> Self {
        Self {
            config,
            cache: FetchCache::new(),
            fetcher,
            cache_lifetime,
        }
    }

    async fn fetch_cached(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let fetcher = &self.fetcher;
        self.cache
            .get_or_fetch(
                url,
                |url| async move { fetcher.fetch(&url).await },
                self.cache_lifetime,
            )
            .await
    }

    /// Feed body for `site_key`: the upstream feed verbatim when one is
    /// configured, otherwise a feed built from the site's page.
    pub async fn generate_feed(&self, site_key: &str) -> Result<Vec<u8>, GenerateError> {
        let site = self
            .config
            .site(site_key)
            .ok_or_else(|| GenerateError::SiteNotFound(site_key.to_string()))?;

        info!(site = %site_key, "RSS generation started");
        let started = Instant::now();

        let body = match site.existing_feed() {
            Some(url) => self.fetch_cached(url).await?,
            None => self.generate_from_page(site).await?.into_bytes(),
        };

        info!(
            site = %site_key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "RSS generation completed"
        );
        Ok(body)
    }

    async fn generate_from_page(&self, site: &SiteConfig) -> Result<String, GenerateError> {
        let content = self.fetch_cached(&site.url).await?;
        let html = String::from_utf8_lossy(&content);

        let items = extract_items(&html, site)?;
        let rss = Feed::new(site, items).to_rss()?;
        Ok(rss)
    }
}

#[route("/generate_rss", method = "GET", method = "HEAD")]
pub async fn generate_rss(
    query: web::Query<Vec<(String, String)>>,
    app_data: web::Data<AppState>,
    req: HttpRequest,
) -> impl Responder {
    // first `site` wins when repeated
    let site_key = query
        .iter()
        .find(|(key, _)| key == "site")
        .map(|(_, value)| value.as_str())
        .unwrap_or_default();

    match app_data.generate_feed(site_key).await {
        Ok(body) => create_response(&req, body),
        Err(GenerateError::SiteNotFound(_)) => HttpResponse::NotFound()
            .content_type("text/plain; charset=utf-8")
            .body("Site not found in configuration"),
        Err(e) => {
            error!(site = %site_key, error = %e, "failed to generate RSS");
            HttpResponse::InternalServerError()
                .content_type("text/plain; charset=utf-8")
                .body("Failed to generate RSS")
        }
    }
}

fn create_response(req: &HttpRequest, body: Vec<u8>) -> HttpResponse {
    let mut response = HttpResponse::Ok();
    response.insert_header((header::CONTENT_TYPE, "application/rss+xml; charset=utf-8"));

    if req.method() == Method::HEAD {
        response
            .insert_header((header::CONTENT_LENGTH, body.len()))
            .finish()
    } else {
        response.body(body)
    }
}
