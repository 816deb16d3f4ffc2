//! # dealpipe - Deal Pipeline Server
//!
//! The main binary for the dealpipe pipeline service.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for inspecting and seeding the pipeline
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 apps/dealpipe (THE BINARY)               │
//! │                                                          │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐  │
//! │  │   CLI       │    │   HTTP API  │    │  Identity   │  │
//! │  │  (clap)     │    │   (axum)    │    │  Resolver   │  │
//! │  └──────┬──────┘    └──────┬──────┘    └──────┬──────┘  │
//! │         │                  │                  │          │
//! │         └──────────────────┼──────────────────┘          │
//! │                            ▼                             │
//! │                   ┌─────────────────┐                    │
//! │                   │  dealpipe-core  │                    │
//! │                   │  (THE LOGIC)    │                    │
//! │                   └─────────────────┘                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! dealpipe server --host 0.0.0.0 --port 8080 --sessions sessions.toml
//!
//! # CLI operations
//! dealpipe init
//! dealpipe stage-add -n "New"
//! dealpipe stages --all
//! dealpipe deals --orphaned
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // DEALPIPE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("DEALPIPE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dealpipe=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the dealpipe startup banner.
fn print_banner() {
    println!(
        r#"
     _            _       _
  __| | ___  __ _| |_ __ (_)_ __   ___
 / _` |/ _ \/ _` | | '_ \| | '_ \ / _ \
| (_| |  __/ (_| | | |_) | | |_) |  __/
 \__,_|\___|\__,_|_| .__/|_| .__/ \___|
                   |_|     |_|

  Deal Pipeline Server v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
