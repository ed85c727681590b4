use anyhow::Result;
use clap::Parser;

use catalog_cli::api::ApiResponse;
use catalog_cli::app::AppContext;
use catalog_cli::cli::{Cli, Output, commands};
use catalog_cli::config::Config;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let output = match run(cli).await {
        Ok(output) => output,
        Err(e) => {
            log::error!("{:#}", e);
            Output::Envelope(ApiResponse::server_error(format!("{:#}", e)))
        }
    };

    let success = output.is_success();
    match output {
        Output::Text(text) => print!("{}", text),
        Output::Envelope(response) => match response.to_pretty_json() {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{:#}", e),
        },
    }

    if !success {
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<Output> {
    let config = Config::load(cli.config.as_deref())?;
    log::debug!("Using database {}", config.database_url);

    let ctx = AppContext::open(config).await?;
    commands::execute(&ctx, cli.command).await
}
