use clap::Parser;

use crate::logging::LogFormat;

/// Email suppression service CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "email-suppression-service",
    version,
    about = "Check and remove addresses on the OCI Email Delivery suppression list"
)]
pub struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, short)]
    pub port: Option<u16>,

    /// OCI region hosting Email Delivery (e.g. ap-mumbai-1)
    #[arg(long)]
    pub region: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_flags() {
        let cli = Cli::parse_from([
            "email-suppression-service",
            "--host",
            "127.0.0.1",
            "-p",
            "9000",
            "--region",
            "us-phoenix-1",
            "--log-format",
            "json",
        ]);

        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.region.as_deref(), Some("us-phoenix-1"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn flags_are_optional() {
        let cli = Cli::parse_from(["email-suppression-service"]);
        assert!(cli.port.is_none());
        assert!(cli.log_format.is_none());
    }
}
