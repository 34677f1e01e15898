//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

//! duckdash PostgreSQL wire protocol server binary.
//!
//! Usage:
//!     duckdash-server [OPTIONS]
//!
//! Options:
//!     --host <HOST>       Listen address (default: 127.0.0.1)
//!     --port <PORT>       Listen port (default: 5433)
//!     --csv <PATH>        Load a CSV file as the dashboard dataset
//!     --init <FILE>       Execute a SQL init script at startup
//!     --config <FILE>     Session configuration (TOML)
//!     --verbose           Enable verbose logging

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use duckdash::server::handler::DashHandlerFactory;
use duckdash::{Session, SessionConfig};

#[derive(Parser)]
#[command(
    name = "duckdash-server",
    version,
    about = "PostgreSQL wire protocol server over a duckdash dashboard session"
)]
struct Args {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listen port
    #[arg(long, default_value_t = 5433)]
    port: u16,

    /// Load a CSV file as the dashboard dataset
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Execute a SQL init script at startup
    #[arg(long)]
    init: Option<PathBuf>,

    /// Session configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "duckdash=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => SessionConfig::from_file(path).unwrap_or_else(|e| fail(e)),
        None => SessionConfig::default(),
    };
    let session = Session::new(config).unwrap_or_else(|e| fail(e));

    if let Err(e) = session
        .initialize_with_progress(|p| debug!(progress = p, "engine start-up"))
        .await
    {
        fail(e);
    }

    if let Some(path) = &args.csv {
        match session.load_dataset_file(path).await {
            Ok(ds) => eprintln!("Loaded {} row(s) into {}", ds.row_count, ds.table),
            Err(e) => fail(format!("loading {}: {e}", path.display())),
        }
    }

    if let Some(path) = &args.init {
        info!(script = %path.display(), "executing init script");
        let script = std::fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("cannot read {}: {e}", path.display())));
        if let Err(e) = session.execute_script(&script).await {
            fail(format!("in init script {}: {e}", path.display()));
        }
    }

    let factory = Arc::new(DashHandlerFactory::new(session.clone()));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => fail(format!("failed to bind {addr}: {e}")),
    };
    eprintln!("duckdash server listening on {addr}");
    eprintln!("Connect with: psql -h {} -p {}", args.host, args.port);

    // Accept loop with graceful shutdown on Ctrl+C
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((socket, peer)) => {
                        debug!(%peer, "new connection");
                        let factory = factory.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                pgwire::tokio::process_socket(socket, None, factory).await
                            {
                                warn!(%peer, error = %e, "connection error");
                            }
                            debug!(%peer, "disconnected");
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
        }
    }

    session.terminate().await;
}
