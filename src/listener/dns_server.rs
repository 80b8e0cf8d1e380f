//! DNS callback listener
//!
//! UDP responder speaking just enough RFC 1035 to capture out-of-band
//! lookups: parse the first question (compression pointers included),
//! extract the correlation token from the first label, and answer A queries
//! with a fixed `127.0.0.1` record. Every parseable query gets the same
//! deterministic answer; silent drops would multiply resolver retries and
//! leak listener policy through timing. Malformed packets are dropped
//! without a response.

use crate::listener::ShutdownRx;
use crate::store::Store;
use crate::token;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

const DNS_HEADER_SIZE: usize = 12;
const QTYPE_A: u16 = 1;
const QCLASS_IN: u16 = 1;
/// Response flags: QR=1, AA=1, RD=1, RA=1, RCODE=0
const RESPONSE_FLAGS: u16 = 0x8580;
/// Maximum pointer jumps tolerated while decompressing a name
const MAX_POINTER_JUMPS: usize = 8;

/// One parsed DNS question.
#[derive(Debug, PartialEq)]
pub struct DnsQuestion {
    pub txn_id: u16,
    pub qname: String,
    pub qtype: u16,
    /// Offset one past the question section (QNAME + QTYPE + QCLASS)
    pub question_end: usize,
}

/// Runs the DNS callback listener until the shutdown signal fires.
pub async fn run_dns_listener(
    host: &str,
    port: u16,
    store: Store,
    mut shutdown: ShutdownRx,
) -> crate::error::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| crate::error::RicochetError::Config(format!("bad listen address: {e}")))?;
    let socket = Arc::new(UdpSocket::bind(addr).await?);
    info!("DNS callback listener on {addr}");

    let mut buf = [0u8; 512];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, remote_addr) = match received {
                    Ok(pair) => pair,
                    Err(e) => {
                        debug!("DNS recv error: {e}");
                        continue;
                    }
                };
                let packet = buf[..len].to_vec();
                let socket = Arc::clone(&socket);
                let store = store.clone();
                tokio::spawn(async move {
                    handle_query(&packet, remote_addr, &socket, &store).await;
                });
            }
            _ = shutdown.changed() => {
                info!("DNS callback listener stopped");
                return Ok(());
            }
        }
    }
}

async fn handle_query(packet: &[u8], remote_addr: SocketAddr, socket: &UdpSocket, store: &Store) {
    let source_ip = remote_addr.ip().to_string();

    let Some(question) = parse_query(packet) else {
        debug!("malformed DNS packet from {source_ip}, dropped");
        return;
    };

    // First label, case-folded: DNS is case-insensitive on the wire and
    // some resolvers randomize label casing.
    let candidate = question
        .qname
        .split('.')
        .next()
        .unwrap_or("")
        .to_lowercase();

    if token::is_valid(&candidate) {
        let mut headers = BTreeMap::new();
        headers.insert("qtype".to_string(), question.qtype.to_string());
        let request_path = format!("DNS:{}", question.qname);

        match store
            .record_callback(&candidate, &source_ip, &request_path, &headers, None)
            .await
        {
            Ok(true) => {
                info!(
                    "DNS callback received: token={candidate} source={source_ip} qname={}",
                    question.qname
                );
            }
            Ok(false) => {
                warn!("unknown DNS token {candidate} from {source_ip}");
            }
            Err(e) => {
                warn!("failed to record DNS callback {candidate}: {e}");
            }
        }
    } else {
        debug!("DNS query without token from {source_ip}: {}", question.qname);
    }

    let response = build_response(packet, &question);
    if let Err(e) = socket.send_to(&response, remote_addr).await {
        debug!("DNS send error to {remote_addr}: {e}");
    }
}

/// Parses the header and first question of a DNS query packet.
pub fn parse_query(data: &[u8]) -> Option<DnsQuestion> {
    if data.len() < DNS_HEADER_SIZE {
        return None;
    }
    let txn_id = u16::from_be_bytes([data[0], data[1]]);
    let qdcount = u16::from_be_bytes([data[4], data[5]]);
    if qdcount == 0 {
        return None;
    }

    let (qname, name_end) = parse_name(data, DNS_HEADER_SIZE)?;
    if name_end + 4 > data.len() {
        return None;
    }
    let qtype = u16::from_be_bytes([data[name_end], data[name_end + 1]]);

    Some(DnsQuestion {
        txn_id,
        qname,
        qtype,
        question_end: name_end + 4,
    })
}

/// Decodes a (possibly compressed) domain name starting at `start`.
/// Returns the dotted name and the offset just past the name in the
/// top-level byte sequence.
fn parse_name(data: &[u8], start: usize) -> Option<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut end = None;
    let mut jumps = 0;

    loop {
        let len = *data.get(pos)? as usize;

        if len & 0xC0 == 0xC0 {
            // Compression pointer: top two bits set, 14-bit target offset.
            let low = *data.get(pos + 1)? as usize;
            if end.is_none() {
                end = Some(pos + 2);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return None;
            }
            pos = ((len & 0x3F) << 8) | low;
            continue;
        }

        if len == 0 {
            if end.is_none() {
                end = Some(pos + 1);
            }
            break;
        }

        if pos + 1 + len > data.len() {
            return None;
        }
        labels.push(String::from_utf8_lossy(&data[pos + 1..pos + 1 + len]).into_owned());
        pos += 1 + len;
    }

    if labels.is_empty() {
        return None;
    }
    Some((labels.join("."), end?))
}

/// Builds the response: transaction ID echoed, question copied verbatim,
/// one A answer for QTYPE=A, zero answers (NOERROR) otherwise.
pub fn build_response(query: &[u8], question: &DnsQuestion) -> Vec<u8> {
    let question_bytes =
        &query[DNS_HEADER_SIZE..question.question_end.min(query.len())];
    let ancount: u16 = if question.qtype == QTYPE_A { 1 } else { 0 };

    let mut response = Vec::with_capacity(DNS_HEADER_SIZE + question_bytes.len() + 16);
    response.extend_from_slice(&question.txn_id.to_be_bytes());
    response.extend_from_slice(&RESPONSE_FLAGS.to_be_bytes());
    response.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    response.extend_from_slice(&ancount.to_be_bytes());
    response.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    response.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT
    response.extend_from_slice(question_bytes);

    if question.qtype == QTYPE_A {
        response.extend_from_slice(&[0xC0, 0x0C]); // name pointer to offset 12
        response.extend_from_slice(&QTYPE_A.to_be_bytes());
        response.extend_from_slice(&QCLASS_IN.to_be_bytes());
        response.extend_from_slice(&60u32.to_be_bytes()); // TTL
        response.extend_from_slice(&4u16.to_be_bytes()); // RDLENGTH
        response.extend_from_slice(&[127, 0, 0, 1]);
    }

    response
}
