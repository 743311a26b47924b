use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use reqwest::{Client, Url};
use token_relay::issuer::http::HttpIssuer;
use token_relay::pipeline::interception::InterceptionPipeline;
use token_relay::pipeline::transport::ReqwestTransport;
use token_relay::server::server::{self, AppState};
use token_relay::utils::config_loader;
use token_relay::utils::logging::{self, LogLevel};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-relay.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level.to_owned()).await?;

    // -------------------------------
    // 2. Build issuer and pipeline
    // -------------------------------

    let issuer = Arc::new(HttpIssuer::new(&service_config.issuer)?);
    let pipeline = InterceptionPipeline::new(&service_config.relay, issuer)?;
    info!(
        "relaying {} prefixes for {} trusted origins, batch window {:?}",
        service_config.relay.path_prefixes.len(),
        service_config.relay.trusted_origins.len(),
        service_config.relay.batch_window()
    );

    // -------------------------------
    // 3. Start relay server
    // -------------------------------

    let transport = ReqwestTransport::new(Client::new());
    let upstream = Url::parse(&service_config.upstream)?;
    let state = AppState::new(pipeline, transport, upstream).await;

    info!("Service starting...");
    server::start(&service_config.settings, state).await
}
