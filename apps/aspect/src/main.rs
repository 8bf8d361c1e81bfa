//! # Aspect - Model Linker CLI
//!
//! ## Usage
//!
//! ```bash
//! # Instantiate a document and summarize it
//! aspect load -f Fleet.json
//!
//! # List the entities of a document
//! aspect elements -f Fleet.json --kind entity
//!
//! # Move a document to a new version
//! aspect rewrite -f Fleet.json --from org.acme:1.0.0 --to org.acme:2.0.0 -o Fleet2.json
//!
//! # Persist a document, then inspect the store
//! aspect import -f Fleet.json -B redb -D models.db
//! aspect status -B redb -D models.db
//! ```

use aspect::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // ASPECT_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("ASPECT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "aspect=debug,aspect_core=debug"
    } else {
        "aspect=info,aspect_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr so command output stays parseable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!("aspect v{} - statement-to-model linker\n", env!("CARGO_PKG_VERSION"));
}
