use clap::Parser;
use faultpost::delivery::{MockTransport, NoticeClient, RequestEnded, SendOutcome};
use faultpost::notice::KeyValuePair;
use faultpost::serialization;
use faultpost::NotifierConfig;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command-line arguments for the notifier test tool
#[derive(Parser)]
#[command(
    name = "faultpost",
    about = "Send a test notice to an error-tracking service",
    long_about = "Builds a notice from a synthetic error, optionally with CGI data, and POSTs it \
                  to the configured error-tracking service. Useful for checking an API key and \
                  server URI before wiring the notifier into an application."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Message of the test error
    #[arg(short, long, default_value = "Testing faultpost notifier")]
    message: String,

    /// CGI data entries, in order
    #[arg(long = "cgi", value_name = "KEY=VALUE", value_parser = parse_cgi_pair)]
    cgi: Vec<KeyValuePair>,

    /// Seconds to wait for the service to answer
    #[arg(long, default_value_t = 10)]
    wait: u64,

    /// Print the notice document instead of sending it
    #[arg(long)]
    print: bool,

    /// Send to an in-memory transport instead of the network
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in NotifierConfig::load
            if config_path.exists() && !config_path.is_file() {
                return Err(format!(
                    "Configuration path is not a file: {}",
                    config_path.display()
                ));
            }

            if let Some(extension) = config_path.extension() {
                if extension != "toml" {
                    warn!(
                        "Configuration file does not have .toml extension: {}",
                        config_path.display()
                    );
                }
            }
        }

        if self.wait == 0 && !self.print {
            return Err("--wait must be at least 1 second".to_string());
        }

        Ok(())
    }
}

/// Parse a `KEY=VALUE` argument; the value may itself contain `=`
fn parse_cgi_pair(argument: &str) -> Result<KeyValuePair, String> {
    match argument.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(KeyValuePair::new(key, value)),
        _ => Err(format!("expected KEY=VALUE, got '{}'", argument)),
    }
}

fn describe(event: &RequestEnded) -> String {
    match &event.response {
        Some(response) if response.is_success() => {
            format!("accepted ({}): {}", response.status, event.response_body)
        }
        Some(response) => format!("rejected ({}): {}", response.status, event.response_body),
        None => "no response received".to_string(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = NotifierConfig::load(cli.config.as_deref())?;
    if cli.dry_run && config.api_key.is_empty() {
        config.api_key = "dry-run".to_string();
    }

    let client = if cli.dry_run {
        NoticeClient::with_transport(
            config,
            Arc::new(MockTransport::with_response(200, "<notice><id>dry-run</id></notice>")),
        )
    } else {
        NoticeClient::new(config)?
    };

    let error = anyhow::Error::msg(cli.message.clone()).context("faultpost test notice");
    let notice = client.builder().build_notice(&error, Some(&cli.cgi), None);

    if cli.print {
        println!("{}", serialization::to_xml(&notice));
        return Ok(());
    }

    let mut events = client.subscribe();
    match client.send(notice) {
        SendOutcome::Dispatched => info!("Notice dispatched, waiting for response"),
        outcome => anyhow::bail!("notice was not sent: {:?}", outcome),
    }

    let event = tokio::time::timeout(Duration::from_secs(cli.wait), events.recv()).await??;
    println!("{}", describe(&event));

    match event.response {
        Some(response) if response.is_success() => Ok(()),
        _ => anyhow::bail!("{}", describe(&event)),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(2);
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
