//! Demo Cat API server.
//!
//! ```bash
//! CRUDR_JWT_SECRET=change-me cargo run --bin cat-api -- --addr 127.0.0.1:8080
//! curl -H 'Authorization: Bearer <token>' http://127.0.0.1:8080/cats
//! curl http://127.0.0.1:8080/spec
//! ```
//!
//! Tokens are HS256 JWTs signed with the configured secret. They must carry an `exp`
//! claim and `"token_type": "access"`.

mod cats;

use anyhow::Context;
use clap::Parser;
use crudrouter::config::ApiConfig;
use crudrouter::logging::{init_logging_with_config, LogConfig, LogFormat};
use crudrouter::runtime_config::RuntimeConfig;
use crudrouter::server::{AppService, HttpServer};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cat-api", version, about = "Demo Cat API built on crudrouter")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "CRUDR_ADDR", default_value = "0.0.0.0:8080")]
    addr: String,

    /// YAML API configuration; defaults to a built-in "Cat API" config
    #[arg(long)]
    config: Option<PathBuf>,

    /// HMAC secret bearer tokens are signed with
    #[arg(long, env = "CRUDR_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Overrides CRUDR_LOG_FORMAT (`json` or `pretty`)
    #[arg(long)]
    log_format: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if let Some(format) = &cli.log_format {
        log_config.format = LogFormat::parse(format);
    }
    init_logging_with_config(&log_config)?;

    let runtime = RuntimeConfig::from_env();
    runtime.apply();
    info!(stack_size = runtime.stack_size, "Coroutine runtime configured");

    let config = match &cli.config {
        Some(path) => ApiConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ApiConfig::new("Cat API"),
    }
    .with_env_overrides();

    let db = Arc::new(Mutex::new(cats::Db::seeded()));
    let api = cats::build_api(config, &cli.jwt_secret, db)?;
    let app = Arc::new(api.build());
    info!(spec_path = %app.spec_path(), "Cat API ready");

    let handle = HttpServer(AppService::new(app))
        .start(cli.addr.as_str())
        .with_context(|| format!("Failed to bind {}", cli.addr))?;
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("server coroutine panicked"))?;
    Ok(())
}
