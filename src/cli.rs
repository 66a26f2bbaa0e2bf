// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Command-line surface and the validated configuration it produces.
//!
//! A `clap::Parser` derive struct is parsed first, then turned into an
//! immutable, validated config type (`ScanConfig`) via a fallible
//! `TryFrom`. Validation failures become [`BulkdnsError::Config`] and
//! exit 1.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};
use hickory_proto::rr::{DNSClass, RecordType};

use crate::error::BulkdnsError;

/// Per-worker socket cap (`K`).
pub const SOCKETS_PER_WORKER: usize = 32;

#[derive(Parser, Debug)]
#[command(name = "bulkdns", version, about = "Concurrent bulk DNS scanner", long_about = None)]
pub struct Args {
    /// Input file of domain names, one per line. Defaults to stdin.
    pub file: Option<PathBuf>,

    /// RR type to query.
    #[arg(short = 't', long = "type", default_value = "A")]
    pub rr_type: String,

    /// RR class to query (IN or CH).
    #[arg(short = 'c', long = "class", default_value = "IN")]
    pub rr_class: String,

    /// Recursive resolver IPv4 address.
    #[arg(short = 'r', long = "resolver", default_value = "1.1.1.1")]
    pub resolver: Ipv4Addr,

    /// Recursive resolver port.
    #[arg(short = 'p', long = "port", default_value_t = 53)]
    pub port: u32,

    /// Local bind address for outgoing UDP/TCP sockets.
    #[arg(long = "bind", default_value = "0.0.0.0")]
    pub bind: Ipv4Addr,

    /// Number of simultaneously open UDP sockets.
    #[arg(long = "concurrency", default_value_t = 1000)]
    pub concurrency: usize,

    /// Per-socket/per-connection timeout, in seconds.
    #[arg(long = "timeout", default_value_t = 5)]
    pub timeout: u64,

    /// Skip the TCP fallback when a UDP reply is truncated.
    #[arg(long = "udp-only", default_value_t = false)]
    pub udp_only: bool,

    /// Set the DNSSEC OK bit in the EDNS0 OPT record.
    #[arg(long = "set-do", default_value_t = false)]
    pub set_do: bool,

    /// Attach an empty NSID EDNS0 option.
    #[arg(long = "set-nsid", default_value_t = false)]
    pub set_nsid: bool,

    /// Suppress EDNS0 entirely.
    #[arg(long = "noedns", default_value_t = false)]
    pub no_edns: bool,

    /// Redirect stdout to this path.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Redirect stderr to this path.
    #[arg(short = 'e', long = "error")]
    pub error: Option<PathBuf>,

    /// Run as a server instead of a scanner.
    #[arg(long = "server", default_value_t = false)]
    pub server: bool,

    /// Server-mode UDP (and default TCP) bind address.
    #[arg(long = "listen", default_value = "0.0.0.0:5300")]
    pub listen: String,

    /// Also listen on TCP in server mode.
    #[arg(long = "tcp", default_value_t = false)]
    pub tcp: bool,

    /// Server-mode script hook path (boundary only; see `bulkdns::server`).
    #[arg(long = "script")]
    pub script: Option<PathBuf>,

    /// Logging verbosity, overridable via `RUST_LOG`.
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(s)
    }
}

/// Immutable scan configuration, validated once at startup.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub resolver: Ipv4Addr,
    pub port: u16,
    pub bind: Ipv4Addr,
    pub rr_type: RecordType,
    pub rr_class: DNSClass,
    pub udp_only: bool,
    pub set_do: bool,
    pub set_nsid: bool,
    pub no_edns: bool,
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub output: Option<PathBuf>,
    pub error: Option<PathBuf>,
    pub input: Option<PathBuf>,
}

impl ScanConfig {
    /// Worker counts derived from `concurrency`: `W = ceil(N / K)`,
    /// `T = max(1, floor(0.1 * W))`.
    pub fn udp_worker_count(&self) -> usize {
        self.concurrency.div_ceil(SOCKETS_PER_WORKER)
    }

    pub fn tcp_worker_count(&self) -> usize {
        ((self.udp_worker_count() as f64) * 0.1).floor().max(1.0) as usize
    }
}

impl TryFrom<Args> for ScanConfig {
    type Error = BulkdnsError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.port == 0 || args.port > 65535 {
            return Err(BulkdnsError::Config(format!(
                "port must be in [1,65535], got {}",
                args.port
            )));
        }
        if args.timeout < 1 {
            return Err(BulkdnsError::Config("timeout must be >= 1".into()));
        }
        if args.concurrency == 0 {
            return Err(BulkdnsError::Config("concurrency must be > 0".into()));
        }

        let rr_type = parse_rr_type(&args.rr_type)?;
        let rr_class = parse_rr_class(&args.rr_class)?;

        let config = Self {
            resolver: args.resolver,
            port: args.port as u16,
            bind: args.bind,
            rr_type,
            rr_class,
            udp_only: args.udp_only,
            set_do: args.set_do,
            set_nsid: args.set_nsid,
            no_edns: args.no_edns,
            timeout_secs: args.timeout,
            concurrency: args.concurrency,
            output: args.output,
            error: args.error,
            input: args.file,
        };

        // Shutdown pushes one sentinel item per UDP worker; concurrency
        // must be able to hold that many in-flight items or the feeder
        // could deadlock against a full channel while workers are still
        // draining real domains.
        if config.concurrency < config.udp_worker_count() {
            return Err(BulkdnsError::Config(format!(
                "concurrency ({}) must be >= the derived UDP worker count ({})",
                config.concurrency,
                config.udp_worker_count()
            )));
        }

        Ok(config)
    }
}

/// Recognized RR type strings, per the CLI surface table.
fn parse_rr_type(s: &str) -> Result<RecordType, BulkdnsError> {
    let upper = s.to_ascii_uppercase();
    let code: u16 = match upper.as_str() {
        "A" => 1,
        "NS" => 2,
        "CNAME" => 5,
        "SOA" => 6,
        "PTR" => 12,
        "HINFO" => 13,
        "MX" => 15,
        "TXT" => 16,
        "AAAA" => 28,
        "SRV" => 33,
        "NID" => 104,
        "L32" => 105,
        "L64" => 106,
        "LP" => 107,
        "RRSIG" => 46,
        "URI" => 256,
        "CAA" => 257,
        other => {
            return Err(BulkdnsError::Config(format!(
                "unrecognized RR type: {other}"
            )))
        }
    };
    Ok(RecordType::from(code))
}

fn parse_rr_class(s: &str) -> Result<DNSClass, BulkdnsError> {
    match s.to_ascii_uppercase().as_str() {
        "IN" => Ok(DNSClass::IN),
        "CH" => Ok(DNSClass::CH),
        other => Err(BulkdnsError::Config(format!(
            "unrecognized RR class: {other} (expected IN or CH)"
        ))),
    }
}

/// Parsed `--listen` endpoint for server mode.
pub fn parse_listen_addr(s: &str) -> Result<std::net::SocketAddr, BulkdnsError> {
    std::net::SocketAddr::from_str(s)
        .map_err(|e| BulkdnsError::Config(format!("invalid --listen address {s:?}: {e}")))
}
