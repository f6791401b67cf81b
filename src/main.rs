use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use scrape_rss_proxy::{config::Config, fetcher::Fetcher, generate_rss, AppState, Args};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    if !args.strict_tls {
        warn!("TLS certificate verification is disabled for upstream fetches");
    }
    let fetcher = Fetcher::new(args.strict_tls).context("failed to build HTTP client")?;

    let app_state = web::Data::new(AppState::new(
        config,
        fetcher,
        Duration::from_secs(args.cache_lifetime),
    ));

    let address = format!("{}:{}", args.ip, args.port);
    info!("Server starting on {address}");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .service(generate_rss)
    })
    .bind(&address)
    .with_context(|| format!("failed to bind {address}"))?
    .run()
    .await?;

    Ok(())
}
