use std::path::PathBuf;

use clap::Parser;
use sas_client::config::{load_document, ConfigMap, Resolver};
use sas_client::{ApiClient, Auth, ClientOptions, Payload};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Health-check an API endpoint through the shared client stack.
#[derive(Parser, Debug)]
#[command(name = "sas-probe", version)]
struct Args {
    /// API base URL
    base_url: String,

    /// Health check or test endpoint
    #[arg(long, default_value = "/health")]
    endpoint: String,

    /// Configuration document, YAML or JSON (auth, timeouts, verify)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bearer token, overriding the configuration document
    #[arg(long, env = "SAS_PROBE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Log level for the client and this tool
    #[arg(long, env = "SAS_LOG", default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(format!("sas_client={level},sas_probe={level}"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let document = match &args.config {
        Some(path) => load_document(path)?,
        None => ConfigMap::new(),
    };
    let config = Resolver::new(ConfigMap::new())
        .with_document(document)
        .with_override("base_url", Some(args.base_url.as_str()))
        .with_override("token", args.token.clone())
        .with_override("verify", args.insecure.then_some(false))
        .resolve();

    let mut client = ApiClient::connect(ClientOptions::from_config(&config)?, Auth::from_config(&config)?).await?;
    tracing::info!(url = %client.resolve_url(&args.endpoint), "probing");

    match client.get(&args.endpoint).await {
        Ok(Payload::Json(json)) => println!("Success: {}", serde_json::to_string_pretty(&json)?),
        Ok(Payload::Text(text)) => println!("Success: {text}"),
        Ok(Payload::Empty) => println!("Success: (no content)"),
        Err(err) => {
            if let Some(last) = client.last_response() {
                tracing::error!(
                    status = last.status.as_u16(),
                    elapsed_ms = last.elapsed.as_millis() as u64,
                    "last response from {}",
                    last.url
                );
            }
            tracing::error!(code = %err.code(), "probe failed");
            return Err(err.into());
        }
    }
    Ok(())
}
