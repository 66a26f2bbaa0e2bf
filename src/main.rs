// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Binary entry point: parses the CLI, initializes logging, and dispatches
//! to either the scan engine or the server-mode listener.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bulkdns::cli::{parse_listen_addr, Args, ScanConfig};
use bulkdns::error::BulkdnsError;
use bulkdns::server::{echo_nxdomain_hook, run_server, ServerConfig};

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level.to_string());

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("bulkdns: failed to start async runtime: {e}");
            return ExitCode::from(70);
        }
    };

    let result = if args.server {
        runtime.block_on(run_server_mode(args))
    } else {
        runtime.block_on(run_scan_mode(args))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bulkdns: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run_scan_mode(args: Args) -> Result<(), BulkdnsError> {
    let config = ScanConfig::try_from(args)?;
    bulkdns::scan::run_scan(config).await
}

async fn run_server_mode(args: Args) -> Result<(), BulkdnsError> {
    let listen_udp = parse_listen_addr(&args.listen)?;
    let listen_tcp = if args.tcp { Some(listen_udp) } else { None };

    if args.script.is_some() {
        tracing::warn!(
            "--script was provided but no scripting engine is wired in; using the built-in echo/NXDOMAIN hook"
        );
    }

    run_server(ServerConfig {
        listen_udp,
        listen_tcp,
        hook: echo_nxdomain_hook(),
    })
    .await
}
