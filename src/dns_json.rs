// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! JSON rendering adapter for decoded DNS messages.
//!
//! `hickory-proto` owns wire decoding; this module owns turning a decoded
//! [`Message`] into the one JSON object per line the scan streams to its
//! output sink. Record data is rendered through each [`RData`]'s `Display`
//! impl rather than hand-rolled per-type field extraction: the wire codec
//! already knows how to print every rdata variant correctly.

use hickory_proto::op::Message;
use hickory_proto::rr::Record;
use serde_json::{json, Value};

fn record_to_json(record: &Record) -> Value {
    json!({
        "name": record.name().to_ascii(),
        "type": record.record_type().to_string(),
        "class": record.dns_class().to_string(),
        "ttl": record.ttl(),
        "rdata": record.data().map(|d| d.to_string()).unwrap_or_default(),
    })
}

/// Renders a decoded message as a single JSON value (one line of output,
/// once serialized and newline-terminated by the caller).
pub fn message_to_json(message: &Message) -> Value {
    let header = message.header();
    json!({
        "id": header.id(),
        "opcode": header.op_code().to_string(),
        "rcode": header.response_code().to_string(),
        "flags": {
            "qr": header.message_type() == hickory_proto::op::MessageType::Response,
            "aa": header.authoritative(),
            "tc": header.truncated(),
            "rd": header.recursion_desired(),
            "ra": header.recursion_available(),
        },
        "question": message.queries().iter().map(|q| json!({
            "name": q.name().to_ascii(),
            "type": q.query_type().to_string(),
            "class": q.query_class().to_string(),
        })).collect::<Vec<_>>(),
        "answer": message.answers().iter().map(record_to_json).collect::<Vec<_>>(),
        "authority": message.name_servers().iter().map(record_to_json).collect::<Vec<_>>(),
        "additional": message.additionals().iter().map(record_to_json).collect::<Vec<_>>(),
    })
}

/// Renders straight to a newline-terminated string, ready to hand to the
/// output writer task as a single write.
pub fn message_to_json_line(message: &Message) -> String {
    let mut s = serde_json::to_string(&message_to_json(message)).unwrap_or_default();
    s.push('\n');
    s
}
