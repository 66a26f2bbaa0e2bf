// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! UDP worker: sender and receiver coalesced into one task.
//!
//! Each worker owns a disjoint slice of the socket pool and alternates
//! between draining `Q_in` onto ready sockets and draining ready datagrams
//! off pending sockets. The whole-batch timeout-reset policy is preserved
//! by polling all pending sockets concurrently via `FuturesUnordered`
//! under one shared `timeout`, rather than giving each socket its own
//! independent timeout.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::FutureExt;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::cli::ScanConfig;
use crate::dns_query::build_query;
use crate::queue::BoundedQueue;
use crate::response::handle_udp_response;
use crate::socket_pool::SocketSlot;
use crate::workitem::WorkItem;

enum PollOutcome {
    TimedOut,
    Ready(Vec<(usize, std::io::Result<usize>)>),
}

/// Non-blockingly drains every socket that is *not* in `pending` — i.e.
/// sitting in the ready sub-queue with no outstanding request. A reply can
/// arrive after its query was already abandoned by a whole-batch timeout
/// reset; left undrained, that datagram would still be sitting in the
/// kernel receive buffer the next time this socket is handed a new query,
/// and the following `recv()` would return it instead of the genuine reply.
fn drain_stray_datagrams(sockets: &mut [SocketSlot], pending: &HashSet<usize>) {
    for (idx, slot) in sockets.iter_mut().enumerate() {
        if pending.contains(&idx) {
            continue;
        }
        loop {
            match slot.socket.try_recv(&mut slot.recv_buf) {
                Ok(n) => debug!(socket = idx, bytes = n, "dropped stray datagram on idle socket"),
                Err(_) => break,
            }
        }
    }
}

/// Awaits every socket index in `pending` concurrently, bounded by
/// `timeout`. Returns as soon as at least one resolves, having also
/// drained any others that were *already* ready at that point — this is
/// the async analogue of `poll()` returning with multiple `revents` set.
/// Sockets outside `pending` are swept separately by
/// [`drain_stray_datagrams`], so together the two cover the full pollfd
/// set each iteration.
async fn poll_pending(
    sockets: &mut [SocketSlot],
    pending: &HashSet<usize>,
    timeout: Duration,
) -> PollOutcome {
    let mut futs = FuturesUnordered::new();
    for (idx, slot) in sockets.iter_mut().enumerate() {
        if !pending.contains(&idx) {
            continue;
        }
        futs.push(async move {
            let SocketSlot { socket, recv_buf } = slot;
            let res = socket.recv(recv_buf).await;
            (idx, res)
        });
    }

    match tokio::time::timeout(timeout, futs.next()).await {
        Err(_) | Ok(None) => PollOutcome::TimedOut,
        Ok(Some(first)) => {
            let mut results = vec![first];
            while let Some(Some(next)) = futs.next().now_or_never() {
                results.push(next);
            }
            PollOutcome::Ready(results)
        }
    }
}

/// Runs one UDP worker to completion. `sockets` is this worker's disjoint
/// slice of the pool; `q_in` is shared by every UDP worker, each one racing
/// to lock it non-blockingly; `q_tcp`/`out_tx` are the TCP retry queue and
/// output channel.
pub async fn run_udp_worker(
    worker_id: usize,
    mut sockets: Vec<SocketSlot>,
    config: Arc<ScanConfig>,
    q_in: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    q_tcp: mpsc::Sender<WorkItem>,
    out_tx: mpsc::Sender<String>,
) {
    let k = sockets.len();
    info!(worker_id, sockets = k, "UDP worker starting");

    let ready = BoundedQueue::from_items(0..k);
    let mut pending: HashSet<usize> = HashSet::new();
    let mut item: Option<String> = None;
    let mut quit = false;
    let timeout = Duration::from_secs(config.timeout_secs);

    loop {
        // Step 1: pull one item from the shared Q_in without blocking other
        // work. A held lock (another worker mid-`try_recv`) is treated the
        // same as an empty queue for this iteration.
        if item.is_none() && !quit {
            if let Ok(mut guard) = q_in.try_lock() {
                match guard.try_recv() {
                    Ok(WorkItem::Domain(domain)) => item = Some(domain),
                    Ok(WorkItem::Shutdown) => quit = true,
                    Err(mpsc::error::TryRecvError::Empty) => {}
                    Err(mpsc::error::TryRecvError::Disconnected) => quit = true,
                }
            }
        }

        // Step 2: send on a ready socket if we have both an item and one.
        if let Some(domain) = item.take() {
            if let Some(sock_idx) = ready.get() {
                match build_query(&domain, &config) {
                    Ok((bytes, _id)) => {
                        let resolver_addr =
                            std::net::SocketAddr::from((config.resolver, config.port));
                        match sockets[sock_idx].socket.send_to(&bytes, resolver_addr).await {
                            Ok(_) => {
                                pending.insert(sock_idx);
                            }
                            Err(e) => {
                                debug!(error = %e, domain, "send_to failed, dropping query");
                                ready.put(sock_idx).expect("returning a freed index cannot overflow capacity");
                            }
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, domain, "query encode failed, dropping");
                        ready.put(sock_idx).expect("returning a freed index cannot overflow capacity");
                    }
                }
                continue;
            } else {
                // No ready socket: hold onto the item and fall through to
                // the poll step, which is the backpressure point.
                item = Some(domain);
            }
        }

        // Exit condition: nothing left to send, nothing outstanding, and
        // the shutdown sentinel has been observed.
        if quit && item.is_none() && pending.is_empty() {
            break;
        }

        // Sweep every ready socket for stray datagrams every iteration,
        // not just while something is pending: a late reply can land on a
        // socket well after its query was abandoned to the timeout reset.
        drain_stray_datagrams(&mut sockets, &pending);

        // If there is nothing pending and nothing to send, yield instead of
        // building an empty FuturesUnordered (which would resolve as
        // "timed out" immediately and just spin).
        if pending.is_empty() {
            tokio::task::yield_now().await;
            continue;
        }

        // Step 3: poll/receive.
        match poll_pending(&mut sockets, &pending, timeout).await {
            PollOutcome::TimedOut => {
                // Whole-batch reset: every outstanding socket is considered
                // lost and made available again. The lost query is not
                // retried (Non-goal: retries on loss).
                for idx in pending.drain() {
                    ready.put(idx).expect("socket count is fixed at worker capacity");
                }
            }
            PollOutcome::Ready(results) => {
                for (idx, result) in results {
                    pending.remove(&idx);
                    match result {
                        Ok(n) => {
                            let buf = sockets[idx].recv_buf[..n].to_vec();
                            handle_udp_response(&buf, &config, &q_tcp, &out_tx).await;
                        }
                        Err(e) => {
                            warn!(worker_id, socket = idx, error = %e, "recv failed, dropping in-flight query");
                        }
                    }
                    ready.put(idx).expect("socket count is fixed at worker capacity");
                }
            }
        }
    }

    // Termination: tell the TCP pool this UDP worker is done (Open
    // Question b: TCP workers count sentinels rather than exit on the
    // first one, so items enqueued by a sibling worker still in flight are
    // not lost).
    let _ = q_tcp.send(WorkItem::Shutdown).await;
    info!(worker_id, "UDP worker exiting");
}
