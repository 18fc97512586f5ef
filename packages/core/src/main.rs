use clap::Parser;
use dotenvy::dotenv;

use email_suppression_service::cli::Cli;
use email_suppression_service::config::Config;
use email_suppression_service::error::AppError;
use email_suppression_service::logging::init_logging;
use email_suppression_service::server;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env().map_err(AppError::Config);
    let log_format = match (&config, cli.log_format) {
        (_, Some(format)) => format,
        (Ok(config), None) => config.log_format,
        (Err(_), None) => Default::default(),
    };
    init_logging(log_format);

    let mut config = config.unwrap_or_else(|err| {
        tracing::error!("{}", err);
        std::process::exit(1);
    });
    config.apply_cli(&cli);

    tracing::info!("Service starting with config: {:?}", config);

    if let Err(err) = server::run(config).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}
