// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Response handling shared by the UDP and TCP workers.

use std::time::Duration;

use hickory_proto::op::Message;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cli::ScanConfig;
use crate::dns_json::message_to_json_line;
use crate::workitem::WorkItem;

/// How long a worker waits before retrying a full `Q_tcp` enqueue.
const TCP_QUEUE_FULL_BACKOFF: Duration = Duration::from_secs(1);

/// Handles one UDP response. Malformed messages are dropped silently. A
/// well-formed, non-truncated message (or any message when `udp_only` is
/// set) is rendered to JSON and handed to the output writer. A truncated
/// message is instead forwarded to `Q_tcp` for retry, backing off and
/// retrying indefinitely if that channel is momentarily full.
pub async fn handle_udp_response(
    bytes: &[u8],
    config: &ScanConfig,
    q_tcp: &mpsc::Sender<WorkItem>,
    out_tx: &mpsc::Sender<String>,
) {
    let message = match Message::from_vec(bytes) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "dropping malformed UDP response");
            return;
        }
    };

    if config.udp_only || !message.header().truncated() {
        emit(&message, out_tx).await;
        return;
    }

    let Some(query) = message.queries().first() else {
        debug!("truncated response carried no question section, dropping");
        return;
    };
    let qname = query.name().to_ascii();

    loop {
        match q_tcp.try_send(WorkItem::Domain(qname.clone())) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tokio::time::sleep(TCP_QUEUE_FULL_BACKOFF).await;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Q_tcp closed while forwarding truncated response, dropping");
                return;
            }
        }
    }
}

/// Handles one TCP response: decode and emit, never re-forwarded.
pub async fn handle_tcp_response(bytes: &[u8], out_tx: &mpsc::Sender<String>) {
    match Message::from_vec(bytes) {
        Ok(message) => emit(&message, out_tx).await,
        Err(e) => debug!(error = %e, "dropping malformed TCP response"),
    }
}

async fn emit(message: &Message, out_tx: &mpsc::Sender<String>) {
    let line = message_to_json_line(message);
    if out_tx.send(line).await.is_err() {
        debug!("output writer gone, dropping rendered line");
    }
}
