//! mcp-bridge - stdio front end for a remote streaming MCP server
//!
//! Parses the configuration surface, assembles the resilient remote handle,
//! and republishes it over local stdio. Everything written by this process
//! other than protocol frames goes to stderr.

mod cli;
mod error;
mod logging;
mod stdio;

use bridge_core::mcp::HttpConnector;
use bridge_core::BridgeOptions;
use cli::Cli;
use colored::Colorize;
use error::Result;
use std::process;
use url::Url;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if let Err(e) = logging::init_logging(cli.log_level.as_deref()) {
        eprintln!("failed to initialize logging: {e}");
    }

    match run(cli).await {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let options = cli.into_options();

    // fail fast on a missing target before printing anything else
    let target = options.resolve_url()?;

    if options.show_banner {
        print_banner(&target, &options);
    }
    tracing::info!(
        version = bridge_core::VERSION,
        name = %options.name,
        target = %target,
        transport = %options.transport,
        "starting bridge"
    );

    let identity = stdio::ServerIdentity {
        name: options.name.clone(),
        instructions: options.instructions.clone(),
        version: bridge_core::VERSION.to_string(),
    };

    let connector = HttpConnector::new();
    let service = bridge_core::assemble(&options, &connector).await?;

    stdio::serve(service, identity).await
}

fn print_banner(target: &Url, options: &BridgeOptions) {
    eprintln!(
        "{}",
        format!("mcp-bridge v{}", bridge_core::VERSION).bold()
    );
    eprintln!("  {} {}", "name:".dimmed(), options.name);
    eprintln!("  {} {}", "remote:".dimmed(), target);
    eprintln!("  {} {}", "transport:".dimmed(), options.transport);
}
