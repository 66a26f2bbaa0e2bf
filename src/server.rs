// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Server mode: listens on UDP (and optionally TCP), hands every
//! received packet to a boxed hook, and writes back whatever bytes the
//! hook produces. The embedding technology for the hook itself (a real
//! scripting engine) is out of scope here — only the boundary is
//! specified.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, error, info, warn};

use crate::error::BulkdnsError;
use crate::socket_pool::MAX_DNS_MESSAGE_SIZE;

/// Transport a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    Udp,
    Tcp,
}

/// Information about the client a request hook is invoked for.
#[derive(Debug, Clone, Copy)]
pub struct ClientMeta {
    pub addr: SocketAddr,
    pub proto: Proto,
}

/// `hook(raw_bytes, client) -> (log_line?, reply_bytes?)`. Returning
/// `None` for the reply means "don't respond to this client".
pub type Hook = Arc<dyn Fn(&[u8], ClientMeta) -> (Option<String>, Option<Vec<u8>>) + Send + Sync>;

/// A built-in default hook so the listener is independently testable
/// without a real scripting engine wired in: it always answers with a
/// minimal NXDOMAIN reply carrying the same id and question as the query.
pub fn echo_nxdomain_hook() -> Hook {
    Arc::new(|raw, client| {
        let log_line = Some(format!("{:?} {} bytes from {}", client.proto, raw.len(), client.addr));
        let reply = hickory_proto::op::Message::from_vec(raw).ok().map(|mut m| {
            m.set_message_type(hickory_proto::op::MessageType::Response);
            m.set_response_code(hickory_proto::op::ResponseCode::NXDomain);
            m.to_vec().unwrap_or_default()
        });
        (log_line, reply)
    })
}

#[derive(Clone)]
pub struct ServerConfig {
    pub listen_udp: SocketAddr,
    pub listen_tcp: Option<SocketAddr>,
    pub hook: Hook,
}

/// Runs the server listener(s) until `Ctrl+C` is received.
pub async fn run_server(config: ServerConfig) -> Result<(), BulkdnsError> {
    let udp_socket = UdpSocket::bind(config.listen_udp)
        .await
        .map_err(|e| BulkdnsError::Fatal(format!("server UDP bind failed: {e}")))?;
    info!(addr = %config.listen_udp, "server UDP listener started");

    let udp_hook = Arc::clone(&config.hook);
    let udp_task = tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DNS_MESSAGE_SIZE];
        loop {
            let (n, src) = match udp_socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "server UDP recv failed");
                    continue;
                }
            };
            let client = ClientMeta { addr: src, proto: Proto::Udp };
            let (log_line, reply) = (udp_hook)(&buf[..n], client);
            if let Some(line) = log_line {
                debug!(%line, "server hook invoked");
            }
            if let Some(reply) = reply {
                if let Err(e) = udp_socket.send_to(&reply, src).await {
                    warn!(error = %e, "server UDP send failed");
                }
            }
        }
    });

    let tcp_task = if let Some(listen_tcp) = config.listen_tcp {
        let listener = TcpListener::bind(listen_tcp)
            .await
            .map_err(|e| BulkdnsError::Fatal(format!("server TCP bind failed: {e}")))?;
        info!(addr = %listen_tcp, "server TCP listener started");
        let hook = Arc::clone(&config.hook);
        Some(tokio::spawn(async move {
            loop {
                let (stream, src) = match listener.accept().await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "server TCP accept failed");
                        continue;
                    }
                };
                let hook = Arc::clone(&hook);
                tokio::spawn(handle_tcp_connection(stream, src, hook));
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| BulkdnsError::Fatal(format!("failed to install Ctrl+C handler: {e}")))?;
    info!("received Ctrl+C, shutting down server");
    udp_task.abort();
    if let Some(t) = tcp_task {
        t.abort();
    }
    Ok(())
}

async fn handle_tcp_connection(mut stream: tokio::net::TcpStream, src: SocketAddr, hook: Hook) {
    let mut len_buf = [0u8; 2];
    if stream.read_exact(&mut len_buf).await.is_err() {
        return;
    }
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len.min(MAX_DNS_MESSAGE_SIZE)];
    if stream.read_exact(&mut body).await.is_err() {
        return;
    }

    let client = ClientMeta { addr: src, proto: Proto::Tcp };
    let (log_line, reply) = (hook)(&body, client);
    if let Some(line) = log_line {
        debug!(%line, "server hook invoked");
    }
    if let Some(reply) = reply {
        let prefix = (reply.len() as u16).to_be_bytes();
        if let Err(e) = stream.write_all(&prefix).await {
            error!(error = %e, "server TCP write failed");
            return;
        }
        let _ = stream.write_all(&reply).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_hook_replies_with_nxdomain() {
        let mut message = hickory_proto::op::Message::new();
        message.set_id(99);
        message.set_message_type(hickory_proto::op::MessageType::Query);
        let raw = message.to_vec().unwrap();

        let hook = echo_nxdomain_hook();
        let client = ClientMeta {
            addr: "127.0.0.1:12345".parse().unwrap(),
            proto: Proto::Udp,
        };
        let (_log, reply) = hook(&raw, client);
        let reply = reply.expect("hook should have produced a reply");
        let decoded = hickory_proto::op::Message::from_vec(&reply).unwrap();
        assert_eq!(decoded.id(), 99);
        assert_eq!(
            decoded.response_code(),
            hickory_proto::op::ResponseCode::NXDomain
        );
    }
}
