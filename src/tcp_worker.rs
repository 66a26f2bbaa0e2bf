// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! TCP worker: one-shot, sequential fallback transactions.
//!
//! TCP workers block natively on `Q_tcp`'s channel `recv` rather than
//! polling with a sleep-and-retry loop — Design Note 2 collapses that
//! sleep loop into the channel's own blocking semantics, since a TCP
//! worker has nothing else useful to interleave while the queue is empty.
//!
//! A TCP worker pool exits only once it has observed one shutdown
//! sentinel per UDP worker, so TCP retries enqueued by a UDP worker that
//! is still draining are not lost to a sibling worker's earlier exit.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::cli::ScanConfig;
use crate::dns_query::build_query;
use crate::response::handle_tcp_response;
use crate::socket_pool::MAX_DNS_MESSAGE_SIZE;
use crate::workitem::WorkItem;

/// Shared across all TCP workers: how many `Shutdown` sentinels (one per
/// UDP worker) have been observed so far.
pub struct ShutdownTally {
    seen: AtomicUsize,
    expected: usize,
}

impl ShutdownTally {
    pub fn new(expected_udp_workers: usize) -> Self {
        Self {
            seen: AtomicUsize::new(0),
            expected: expected_udp_workers,
        }
    }

    /// Returns true once every UDP worker's sentinel has been observed.
    fn record(&self) -> bool {
        self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.expected
    }
}

async fn perform_tcp_query(
    resolver: SocketAddr,
    query_bytes: &[u8],
    timeout: Duration,
) -> std::io::Result<Vec<u8>> {
    let mut stream =
        tokio::time::timeout(timeout, TcpStream::connect(resolver)).await??;

    let len_prefix = (query_bytes.len() as u16).to_be_bytes();
    tokio::time::timeout(timeout, async {
        stream.write_all(&len_prefix).await?;
        stream.write_all(query_bytes).await
    })
    .await??;

    let mut len_buf = [0u8; 2];
    tokio::time::timeout(timeout, stream.read_exact(&mut len_buf)).await??;
    let reply_len = u16::from_be_bytes(len_buf) as usize;

    let mut reply = vec![0u8; reply_len.min(MAX_DNS_MESSAGE_SIZE)];
    tokio::time::timeout(timeout, stream.read_exact(&mut reply)).await??;

    Ok(reply)
}

/// Runs one TCP worker to completion. `q_tcp` is shared by every TCP
/// worker in the pool behind a mutex: `tokio::sync::mpsc::Receiver` is a
/// single-consumer type, and wrapping it is simpler and just as correct as
/// introducing a multi-consumer channel crate for a handful of rarely-busy
/// TCP workers.
pub async fn run_tcp_worker(
    worker_id: usize,
    config: Arc<ScanConfig>,
    q_tcp: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    out_tx: mpsc::Sender<String>,
    tally: Arc<ShutdownTally>,
) {
    info!(worker_id, "TCP worker starting");
    let resolver = SocketAddr::from((config.resolver, config.port));
    let timeout = Duration::from_secs(config.timeout_secs);

    loop {
        let item = { q_tcp.lock().await.recv().await };
        let Some(item) = item else { break };
        let domain = match item {
            WorkItem::Domain(domain) => domain,
            WorkItem::Shutdown => {
                if tally.record() {
                    break;
                }
                continue;
            }
        };

        let (query_bytes, _id) = match build_query(&domain, &config) {
            Ok(built) => built,
            Err(e) => {
                debug!(error = %e, domain, "TCP query encode failed, dropping");
                continue;
            }
        };

        match perform_tcp_query(resolver, &query_bytes, timeout).await {
            Ok(reply) => handle_tcp_response(&reply, &out_tx).await,
            Err(e) => debug!(error = %e, domain, "TCP transaction failed, dropping"),
        }
    }

    info!(worker_id, "TCP worker exiting");
}
