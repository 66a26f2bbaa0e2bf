//! End-to-end scans driven against a loopback stub resolver rather than a
//! real one.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, RData, Record, RecordType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

use bulkdns::cli::{Args, ScanConfig};
use bulkdns::scan::run_scan;

fn base_config(resolver_port: u16, input: PathBuf, output: PathBuf) -> ScanConfig {
    ScanConfig {
        resolver: Ipv4Addr::LOCALHOST,
        port: resolver_port,
        bind: Ipv4Addr::UNSPECIFIED,
        rr_type: RecordType::A,
        rr_class: DNSClass::IN,
        udp_only: false,
        set_do: false,
        set_nsid: false,
        no_edns: false,
        timeout_secs: 2,
        concurrency: 32,
        output: Some(output),
        error: None,
        input: Some(input),
    }
}

async fn write_lines(path: &std::path::Path, lines: &[&str]) {
    tokio::fs::write(path, lines.join("\n") + "\n").await.unwrap();
}

async fn read_lines(path: &std::path::Path) -> Vec<String> {
    let contents = tokio::fs::read_to_string(path).await.unwrap_or_default();
    contents.lines().map(str::to_string).collect()
}

fn answer_for(query: &Query) -> Record {
    Record::from_rdata(
        query.name().clone(),
        300,
        RData::A(A(Ipv4Addr::new(93, 184, 216, 34))),
    )
}

/// Replies to every received datagram with a well-formed response copying
/// the query's id and question, with `truncated` set as directed.
async fn spawn_udp_stub(truncated: bool) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = socket.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let (n, src) = match socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(_) => break,
            };
            let Ok(query_msg) = Message::from_vec(&buf[..n]) else { continue };
            let mut response = Message::new();
            response.set_id(query_msg.id());
            response.set_message_type(MessageType::Response);
            response.set_op_code(OpCode::Query);
            response.set_truncated(truncated);
            if let Some(q) = query_msg.queries().first() {
                response.add_query(q.clone());
                if !truncated {
                    response.add_answer(answer_for(q));
                }
            }
            let bytes = response.to_vec().unwrap();
            let _ = socket.send_to(&bytes, src).await;
        }
    });
    (addr, handle)
}

/// A black hole: receives and never replies, for S5.
async fn spawn_silent_udp_stub() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = socket.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            if socket.recv_from(&mut buf).await.is_err() {
                break;
            }
        }
    });
    (addr, handle)
}

/// Accepts one length-prefixed TCP DNS connection and replies with a
/// well-formed, non-truncated answer.
async fn spawn_tcp_stub(port: u16) -> tokio::task::JoinHandle<()> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await.unwrap();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(v) => v,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut len_buf = [0u8; 2];
                if stream.read_exact(&mut len_buf).await.is_err() {
                    return;
                }
                let len = u16::from_be_bytes(len_buf) as usize;
                let mut body = vec![0u8; len];
                if stream.read_exact(&mut body).await.is_err() {
                    return;
                }
                let Ok(query_msg) = Message::from_vec(&body) else { return };
                let mut response = Message::new();
                response.set_id(query_msg.id());
                response.set_message_type(MessageType::Response);
                response.set_op_code(OpCode::Query);
                if let Some(q) = query_msg.queries().first() {
                    response.add_query(q.clone());
                    response.add_answer(answer_for(q));
                }
                let bytes = response.to_vec().unwrap();
                let prefix = (bytes.len() as u16).to_be_bytes();
                let _ = stream.write_all(&prefix).await;
                let _ = stream.write_all(&bytes).await;
            });
        }
    })
}

/// S1: a valid, non-truncated UDP response produces exactly one JSON line.
#[tokio::test]
async fn s1_single_non_truncated_response() {
    let dir = tempdir();
    let input = dir.join("input.txt");
    let output = dir.join("output.jsonl");
    write_lines(&input, &["example.com"]).await;

    let (resolver_addr, _udp_handle) = spawn_udp_stub(false).await;
    let config = base_config(resolver_addr.port(), input, output.clone());

    run_scan(config).await.unwrap();

    let lines = read_lines(&output).await;
    assert_eq!(lines.len(), 1);
    let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(value["question"][0]["name"], "example.com.");
    assert_eq!(value["flags"]["tc"], false);
}

/// S2: a truncated UDP response is retried over TCP; exactly one line,
/// from the TCP handler, with no duplicate from UDP.
#[tokio::test]
async fn s2_truncated_response_falls_back_to_tcp() {
    let dir = tempdir();
    let input = dir.join("input.txt");
    let output = dir.join("output.jsonl");
    write_lines(&input, &["example.com"]).await;

    let (resolver_addr, _udp_handle) = spawn_udp_stub(true).await;
    let _tcp_handle = spawn_tcp_stub(resolver_addr.port()).await;
    let config = base_config(resolver_addr.port(), input, output.clone());

    run_scan(config).await.unwrap();

    let lines = read_lines(&output).await;
    assert_eq!(lines.len(), 1);
    let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(value["flags"]["tc"], false);
}

/// S3: a bulk scan with every name answered produces exactly one line per
/// input name, with concurrency well below the input size.
#[tokio::test]
async fn s3_bulk_scan_covers_every_name_exactly_once() {
    let dir = tempdir();
    let input = dir.join("input.txt");
    let output = dir.join("output.jsonl");

    const COUNT: usize = 2_000;
    let names: Vec<String> = (0..COUNT).map(|i| format!("host{i}.example.com")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    write_lines(&input, &name_refs).await;

    let (resolver_addr, _udp_handle) = spawn_udp_stub(false).await;
    let mut config = base_config(resolver_addr.port(), input, output.clone());
    config.concurrency = 100;

    run_scan(config).await.unwrap();

    let lines = read_lines(&output).await;
    assert_eq!(lines.len(), COUNT);

    let mut seen: Vec<String> = lines
        .iter()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["question"][0]["name"].as_str().unwrap().to_string()
        })
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), COUNT);
}

/// S4: `--udp-only` emits the truncated response directly, no TCP attempt.
#[tokio::test]
async fn s4_udp_only_emits_truncated_response_as_is() {
    let dir = tempdir();
    let input = dir.join("input.txt");
    let output = dir.join("output.jsonl");
    write_lines(&input, &["example.com"]).await;

    let (resolver_addr, _udp_handle) = spawn_udp_stub(true).await;
    let mut config = base_config(resolver_addr.port(), input, output.clone());
    config.udp_only = true;

    run_scan(config).await.unwrap();

    let lines = read_lines(&output).await;
    assert_eq!(lines.len(), 1);
    let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(value["flags"]["tc"], true);
}

/// S5: a silent resolver still lets the scan finish cleanly with zero
/// output lines once the batch timeout and shutdown sequence play out.
#[tokio::test]
async fn s5_silent_resolver_exits_cleanly_with_no_output() {
    let dir = tempdir();
    let input = dir.join("input.txt");
    let output = dir.join("output.jsonl");
    write_lines(&input, &["example.com"]).await;

    let (resolver_addr, _udp_handle) = spawn_silent_udp_stub().await;
    let mut config = base_config(resolver_addr.port(), input, output.clone());
    config.timeout_secs = 1;

    run_scan(config).await.unwrap();

    let lines = read_lines(&output).await;
    assert!(lines.is_empty());
}

/// S6: an out-of-range port is rejected at config validation, before any
/// socket is ever opened.
#[test]
fn s6_invalid_port_is_rejected_before_scan_starts() {
    let args = Args {
        file: None,
        rr_type: "A".into(),
        rr_class: "IN".into(),
        resolver: Ipv4Addr::new(1, 1, 1, 1),
        port: 70_000,
        bind: Ipv4Addr::UNSPECIFIED,
        concurrency: 1000,
        timeout: 5,
        udp_only: false,
        set_do: false,
        set_nsid: false,
        no_edns: false,
        output: None,
        error: None,
        server: false,
        listen: "0.0.0.0:5300".into(),
        tcp: false,
        script: None,
        log_level: bulkdns::cli::LogLevel::Warn,
    };

    let err = ScanConfig::try_from(args).unwrap_err();
    assert_eq!(err.exit_code(), 1);
}

fn tempdir() -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let unique = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut dir = std::env::temp_dir();
    dir.push(format!("bulkdns-e2e-{}-{}-{}", std::process::id(), nanos, unique));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
