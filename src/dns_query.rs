// Copyright 2026 bulkdns contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Query construction, delegated to `hickory-proto` for the actual wire
//! encoding. Everything below `Message::to_vec` is the external codec's
//! concern.

use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};
use hickory_proto::rr::Name;
use thiserror::Error;

use crate::cli::ScanConfig;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid domain name: {0}")]
    Name(#[from] hickory_proto::error::ProtoError),
    #[error("failed to encode query: {0}")]
    Encode(hickory_proto::error::ProtoError),
}

/// Builds and serializes a query for `domain` per `config`. Returns the
/// wire bytes and the random transaction id chosen for this query (TCP
/// workers reuse the same bytes verbatim; the id is surfaced for tests and
/// logging only — it is not matched against on receipt).
pub fn build_query(domain: &str, config: &ScanConfig) -> Result<(Vec<u8>, u16), QueryError> {
    let name = Name::from_ascii(domain)?;
    let mut query = Query::query(name, config.rr_type);
    query.set_query_class(config.rr_class);

    let id: u16 = rand::random();
    let mut message = Message::new();
    message.set_id(id);
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(query);

    if !config.no_edns {
        let mut edns = Edns::new();
        edns.set_max_payload(4096);
        edns.set_version(0);
        if config.set_do {
            edns.set_dnssec_ok(true);
        }
        if config.set_nsid {
            edns.options_mut()
                .insert(EdnsOption::Unknown(EdnsCode::NSID.into(), Vec::new()));
        }
        message.set_edns(edns);
    }

    let bytes = message.to_vec().map_err(QueryError::Encode)?;
    Ok((bytes, id))
}
