// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Single output-writer task.
//!
//! Every UDP/TCP worker sends its rendered JSON line over one channel
//! instead of writing to the output sink directly, so exactly one task
//! ever touches the sink and no interleaving is possible at any
//! granularity.

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::warn;

/// Drains `rx` until every sender has been dropped, writing each line to
/// `sink` as it arrives.
pub async fn run_writer<W: AsyncWriteExt + Unpin>(mut rx: mpsc::Receiver<String>, mut sink: W) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = sink.write_all(line.as_bytes()).await {
            warn!(error = %e, "failed writing output line");
        }
    }
    let _ = sink.flush().await;
}
