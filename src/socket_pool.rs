// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Socket pool allocation and worker-slice partitioning.
//!
//! Sockets are created via `socket2` so `SO_REUSEADDR` can be set before
//! binding to port 0 (letting the kernel assign a distinct ephemeral port
//! per socket), then handed to `tokio` for async I/O. Each socket carries
//! its own reusable receive buffer, homed per-socket rather than
//! per-worker so a worker's concurrent in-flight recvs never alias the
//! same buffer.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::BulkdnsError;

/// Max DNS message size over UDP with EDNS0; also the TCP scratch size.
pub const MAX_DNS_MESSAGE_SIZE: usize = 65_535;

/// One pre-bound UDP socket plus its dedicated receive buffer.
pub struct SocketSlot {
    pub socket: UdpSocket,
    pub recv_buf: Vec<u8>,
}

impl SocketSlot {
    fn bind(bind_addr: Ipv4Addr) -> Result<Self, BulkdnsError> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| BulkdnsError::Fatal(format!("socket create failed: {e}")))?;
        raw.set_reuse_address(true)
            .map_err(|e| BulkdnsError::Fatal(format!("SO_REUSEADDR failed: {e}")))?;
        let addr = SocketAddrV4::new(bind_addr, 0);
        raw.bind(&addr.into())
            .map_err(|e| BulkdnsError::Fatal(format!("bind failed: {e}")))?;
        raw.set_nonblocking(true)
            .map_err(|e| BulkdnsError::Fatal(format!("set_nonblocking failed: {e}")))?;

        let std_socket: std::net::UdpSocket = raw.into();
        let socket = UdpSocket::from_std(std_socket)
            .map_err(|e| BulkdnsError::Fatal(format!("tokio UdpSocket::from_std failed: {e}")))?;

        Ok(Self {
            socket,
            recv_buf: vec![0u8; MAX_DNS_MESSAGE_SIZE],
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// Allocates `concurrency` bound UDP sockets. On any failure every socket
/// created so far is dropped (closing the fds) and a fatal error is
/// returned — this is a startup invariant, not a recoverable runtime path.
pub fn build_socket_pool(
    bind_addr: Ipv4Addr,
    concurrency: usize,
) -> Result<Vec<SocketSlot>, BulkdnsError> {
    let mut slots = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        slots.push(SocketSlot::bind(bind_addr)?);
    }
    Ok(slots)
}

/// Splits a socket pool into `worker_count` disjoint, contiguous chunks of
/// at most `per_worker` sockets each (the last chunk may be smaller).
/// Worker `i` owns indices `[i*per_worker, (i+1)*per_worker)`.
pub fn partition(
    slots: Vec<SocketSlot>,
    per_worker: usize,
) -> Vec<Vec<SocketSlot>> {
    let mut chunks = Vec::new();
    let mut iter = slots.into_iter();
    loop {
        let chunk: Vec<SocketSlot> = (&mut iter).take(per_worker).collect();
        if chunk.is_empty() {
            break;
        }
        let is_last = chunk.len() < per_worker;
        chunks.push(chunk);
        if is_last {
            break;
        }
    }
    chunks
}
