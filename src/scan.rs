// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Feeder and driver lifecycle: wires up queues, the socket pool,
//! every worker task, and the output writer, then streams stdin/a file
//! into `Q_in` until EOF, pushes shutdown sentinels, and joins everything.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::cli::ScanConfig;
use crate::error::BulkdnsError;
use crate::socket_pool::{build_socket_pool, partition};
use crate::tcp_worker::{run_tcp_worker, ShutdownTally};
use crate::udp_worker::run_udp_worker;
use crate::workitem::WorkItem;
use crate::writer::run_writer;

/// How long the feeder backs off before retrying a full `Q_in` enqueue.
const INGRESS_FULL_BACKOFF: std::time::Duration = std::time::Duration::from_secs(5);

/// Channel capacity used for `Q_in`/`Q_tcp`/the output channel, bounded by
/// `concurrency` so memory stays fixed regardless of input size.
fn queue_capacity(config: &ScanConfig) -> usize {
    config.concurrency.max(crate::cli::SOCKETS_PER_WORKER)
}

/// Runs a full scan: opens the configured sinks, spins up the worker
/// pools, feeds input, and blocks until everything has drained.
pub async fn run_scan(config: ScanConfig) -> Result<(), BulkdnsError> {
    let config = Arc::new(config);
    let capacity = queue_capacity(&config);

    let sockets = build_socket_pool(config.bind, config.concurrency)?;
    let worker_slices = partition(sockets, crate::cli::SOCKETS_PER_WORKER);
    let udp_worker_count = worker_slices.len();
    let tcp_worker_count = config.tcp_worker_count();

    info!(
        udp_worker_count,
        tcp_worker_count, concurrency = config.concurrency, "starting scan"
    );

    // Q_in is one logical bounded queue shared by every UDP worker, each of
    // which races to lock it non-blockingly in its own hot loop — the
    // same "single shared mutex" shape Q_tcp uses below.
    let (feed_tx, q_in_rx) = mpsc::channel::<WorkItem>(capacity);
    let q_in_rx = Arc::new(Mutex::new(q_in_rx));

    let (q_tcp_tx, q_tcp_rx) = mpsc::channel::<WorkItem>(capacity);
    let q_tcp_rx = Arc::new(Mutex::new(q_tcp_rx));
    let (out_tx, out_rx) = mpsc::channel::<String>(capacity);

    let mut join_handles = Vec::with_capacity(udp_worker_count);
    for (worker_id, slice) in worker_slices.into_iter().enumerate() {
        let config = Arc::clone(&config);
        let q_in_rx = Arc::clone(&q_in_rx);
        let q_tcp_tx = q_tcp_tx.clone();
        let out_tx = out_tx.clone();
        join_handles.push(tokio::spawn(async move {
            run_udp_worker(worker_id, slice, config, q_in_rx, q_tcp_tx, out_tx).await;
        }));
    }
    drop(q_tcp_tx);

    let tally = Arc::new(ShutdownTally::new(udp_worker_count));
    let mut tcp_join_handles = Vec::with_capacity(tcp_worker_count);
    for worker_id in 0..tcp_worker_count {
        let config = Arc::clone(&config);
        let q_tcp_rx = Arc::clone(&q_tcp_rx);
        let out_tx = out_tx.clone();
        let tally = Arc::clone(&tally);
        tcp_join_handles.push(tokio::spawn(async move {
            run_tcp_worker(worker_id, config, q_tcp_rx, out_tx, tally).await;
        }));
    }
    drop(out_tx);

    let output_path = config.output.clone();
    let writer_handle = tokio::spawn(async move {
        match open_output(&output_path).await {
            Ok(mut sink) => run_writer(out_rx, &mut sink).await,
            Err(e) => {
                tracing::error!(error = %e, "failed to open output sink");
            }
        }
    });

    feed_input(&config, feed_tx, udp_worker_count).await?;

    futures_util::future::join_all(join_handles).await;
    futures_util::future::join_all(tcp_join_handles).await;
    let _ = writer_handle.await;

    info!("scan complete");
    Ok(())
}

enum OutputSink {
    Stdout(tokio::io::Stdout),
    File(tokio::fs::File),
}

impl tokio::io::AsyncWrite for OutputSink {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            OutputSink::Stdout(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            OutputSink::File(f) => std::pin::Pin::new(f).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            OutputSink::Stdout(s) => std::pin::Pin::new(s).poll_flush(cx),
            OutputSink::File(f) => std::pin::Pin::new(f).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            OutputSink::Stdout(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            OutputSink::File(f) => std::pin::Pin::new(f).poll_shutdown(cx),
        }
    }
}

async fn open_output(path: &Option<std::path::PathBuf>) -> std::io::Result<OutputSink> {
    match path {
        Some(p) => Ok(OutputSink::File(tokio::fs::File::create(p).await?)),
        None => Ok(OutputSink::Stdout(tokio::io::stdout())),
    }
}

/// Reads the configured input source line by line, trimming ASCII
/// whitespace and dropping empty lines, and streams the result onto
/// `feed_tx`: a full channel is retried every 5 seconds, indefinitely.
/// Once input is exhausted, pushes `udp_worker_count` shutdown sentinels
/// onto the shared `Q_in` — one per worker racing to dequeue it.
async fn feed_input(
    config: &ScanConfig,
    feed_tx: mpsc::Sender<WorkItem>,
    udp_worker_count: usize,
) -> Result<(), BulkdnsError> {
    let mut lines = open_input(&config.input).await?;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| BulkdnsError::Fatal(format!("failed reading input: {e}")))?
    {
        let trimmed = trim_ascii_whitespace(&line);
        if trimmed.is_empty() {
            continue;
        }
        let mut item = WorkItem::Domain(trimmed.to_string());
        loop {
            match feed_tx.try_send(item) {
                Ok(()) => break,
                Err(mpsc::error::TrySendError::Full(returned)) => {
                    item = returned;
                    tokio::time::sleep(INGRESS_FULL_BACKOFF).await;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Ok(());
                }
            }
        }
    }

    for _ in 0..udp_worker_count {
        if feed_tx.send(WorkItem::Shutdown).await.is_err() {
            break;
        }
    }
    Ok(())
}

async fn open_input(
    path: &Option<std::path::PathBuf>,
) -> Result<tokio::io::Lines<BufReader<Box<dyn tokio::io::AsyncRead + Unpin + Send>>>, BulkdnsError>
{
    let reader: Box<dyn tokio::io::AsyncRead + Unpin + Send> = match path {
        Some(p) => Box::new(
            tokio::fs::File::open(p)
                .await
                .map_err(|e| BulkdnsError::Fatal(format!("cannot open input {p:?}: {e}")))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    Ok(BufReader::new(reader).lines())
}

/// Trims the exact C `isspace` set (`" \t\n\r\x0b\x0c"`), not Unicode
/// whitespace.
fn trim_ascii_whitespace(s: &str) -> &str {
    const SPACE_CHARS: [char; 6] = [' ', '\t', '\n', '\r', '\x0b', '\x0c'];
    s.trim_matches(|c| SPACE_CHARS.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_exact_c_whitespace_set_only() {
        assert_eq!(trim_ascii_whitespace("  example.com\t\n"), "example.com");
        assert_eq!(trim_ascii_whitespace("\x0c\x0bexample.com\r"), "example.com");
    }

    #[test]
    fn empty_after_trim_is_empty() {
        assert_eq!(trim_ascii_whitespace("   \t  "), "");
    }
}
