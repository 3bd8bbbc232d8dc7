//! The DNS query handler (spec §4.5): turns one decoded [`Message`] into
//! one encoded reply message.
//!
//! This is deliberately hand-rolled against `domain`'s message/record types
//! rather than its bundled `EdnsMiddlewareSvc`/`MandatoryMiddlewareSvc`
//! stack: the EDNS walk, the per-question RCODE selection, and the
//! truncation rule are this crate's own semantics (spec §4.5/§4.6), not
//! general-purpose middleware behaviour.

use std::net::IpAddr;

use domain::base::iana::{Class, OptRcode, Rcode};
use domain::base::message_builder::{AdditionalBuilder, MessageBuilder, PushError};
use domain::base::name::ToName;
use domain::base::{Message, Rtype};
use realm_zonedata::{RData, Rr, StoredName};

use crate::registry::Registry;
use crate::zone::Answer;

/// The EDNS(0) UDP payload size floor this responder enforces (spec §4.5
/// step 1): below this, a client's request is treated as if it asked for
/// the floor.
const MIN_PAYLOAD_SIZE: u16 = 512;

const SUPPORTED_QTYPES: [Rtype; 8] = [
    Rtype::A,
    Rtype::AAAA,
    Rtype::CNAME,
    Rtype::AXFR,
    Rtype::ANY,
    Rtype::SOA,
    Rtype::NS,
    Rtype::URI,
];

/// Answer one incoming DNS message, per spec §4.5. `max_payload_size` is
/// this server's own ceiling on the EDNS(0) payload size it will echo
/// (configured via `DnsConfig::max_payload_size`). Returns the wire-encoded
/// reply, or `None` if the query didn't even parse as a DNS message (no
/// sensible reply can be built).
pub async fn answer_message(
    registry: &Registry,
    raw: &[u8],
    peer: IpAddr,
    tcp: bool,
    max_payload_size: u16,
) -> Option<Vec<u8>> {
    let msg = match Message::from_octets(raw.to_vec()) {
        Ok(msg) => msg,
        Err(_) => return None,
    };

    let (payload_size, edns) = if tcp {
        (None, EdnsReply::None)
    } else {
        match parse_edns(&msg, max_payload_size) {
            EdnsOutcome::NoOpt => (Some(MIN_PAYLOAD_SIZE), EdnsReply::None),
            EdnsOutcome::BadVersion => {
                return Some(build_reply(&msg, Rcode::NOERROR, false, false, &[], &[], EdnsReply::BadVers))
            }
            EdnsOutcome::FormatError => {
                return Some(build_reply(&msg, Rcode::FORMERR, false, false, &[], &[], EdnsReply::None))
            }
            EdnsOutcome::Ok(size) => (Some(size), EdnsReply::Opt(size)),
        }
    };

    let questions = match msg.question() {
        Ok(q) => q,
        Err(_) => return Some(build_reply(&msg, Rcode::FORMERR, false, false, &[], &[], edns)),
    };

    let mut rcode = Rcode::NOERROR;
    let mut aa = false;
    let mut ra = false;
    let mut answers: Vec<Rr> = Vec::new();
    let mut authorities: Vec<Rr> = Vec::new();

    // §4.5 step 2: the per-question loop. This registry only ever serves a
    // single question per message in practice (the common DNS client
    // pattern); the loop still walks every question so an ANY/unsupported
    // question later in the list is classified correctly, but only the
    // first IN question this registry can usefully answer contributes
    // records, matching "terminating on the first protocol error".
    for question in questions {
        let question = match question {
            Ok(q) => q,
            Err(_) => {
                rcode = Rcode::FORMERR;
                break;
            }
        };

        if question.qclass() == Class::ANY {
            aa = false;
            continue;
        }
        if question.qclass() != Class::IN {
            rcode = Rcode::NOTIMP;
            break;
        }
        let qtype = question.qtype();
        if !SUPPORTED_QTYPES.contains(&qtype) {
            rcode = Rcode::NOTIMP;
            break;
        }

        let qname: StoredName = question.qname().to_name();

        let matched = registry.find_zone(&qname);
        let answer: Answer = registry.answer(matched, &qname, qtype, peer).await;
        rcode = answer.rcode;
        aa = answer.aa;
        ra = answer.ra;
        answers = answer.answers;
        authorities = answer.authorities;
        break;
    }

    let mut reply = build_reply(&msg, rcode, aa, ra, &answers, &authorities, edns);

    // §4.5 step 3: truncation, UDP only.
    if !tcp {
        if let Some(size) = payload_size {
            if reply.len() > size as usize {
                reply = build_reply(&msg, rcode, aa, ra, &[], &[], edns);
                set_tc(&mut reply);
            }
        }
    }

    Some(reply)
}

enum EdnsOutcome {
    NoOpt,
    Ok(u16),
    BadVersion,
    FormatError,
}

/// What OPT pseudo-record (if any) the reply should carry, per spec §4.5
/// step 1: a successful negotiation echoes the client's payload size back;
/// a version mismatch echoes BADVERS instead; anything else carries no OPT.
#[derive(Clone, Copy)]
enum EdnsReply {
    None,
    Opt(u16),
    BadVers,
}

fn parse_edns(msg: &Message<Vec<u8>>, our_max: u16) -> EdnsOutcome {
    let additionals = match msg.additional() {
        Ok(a) => a,
        Err(_) => return EdnsOutcome::FormatError,
    };

    let mut opt_count = 0usize;
    let mut payload_size: u16 = MIN_PAYLOAD_SIZE;
    let mut version: u8 = 0;

    for record in additionals {
        let record = match record {
            Ok(r) => r,
            Err(_) => return EdnsOutcome::FormatError,
        };
        if record.rtype() != Rtype::OPT {
            continue;
        }
        opt_count += 1;
        if opt_count > 1 {
            return EdnsOutcome::FormatError;
        }
        // The OPT pseudo-record smuggles payload size in its class and
        // (version, extended rcode, flags) in the top of its TTL field
        // (RFC 6891 §6.1.2). Both are readable straight off the parsed
        // record header, before any rdata parsing.
        payload_size = record.class().to_int();
        let ttl = u32::from(record.ttl().as_secs());
        version = ((ttl >> 16) & 0xff) as u8;
    }

    if opt_count == 0 {
        return EdnsOutcome::NoOpt;
    }
    if version > 0 {
        return EdnsOutcome::BadVersion;
    }
    EdnsOutcome::Ok(payload_size.clamp(MIN_PAYLOAD_SIZE, our_max))
}

fn push_rr(builder: &mut AdditionalBuilder<Vec<u8>>, rr: &Rr) -> Result<(), PushError> {
    match &rr.data {
        RData::A(a) => builder.push((&rr.owner, Class::IN, rr.ttl, *a)),
        RData::Aaaa(aaaa) => builder.push((&rr.owner, Class::IN, rr.ttl, *aaaa)),
        RData::Cname(cname) => builder.push((&rr.owner, Class::IN, rr.ttl, cname.clone())),
        RData::Uri(uri) => builder.push((&rr.owner, Class::IN, rr.ttl, uri.clone())),
        RData::Soa(soa) => builder.push((&rr.owner, Class::IN, rr.ttl, soa.clone())),
        RData::Ns(ns) => builder.push((&rr.owner, Class::IN, rr.ttl, ns.clone())),
    }
}

/// Build a full reply: question section echoed from `query`, then
/// `answers`/`authorities`, with the header fields spec §4.5 step 4 names
/// (id, flags mirrored, QR=1).
fn build_reply(
    query: &Message<Vec<u8>>,
    rcode: Rcode,
    aa: bool,
    ra: bool,
    answers: &[Rr],
    authorities: &[Rr],
    edns: EdnsReply,
) -> Vec<u8> {
    let target: Vec<u8> = Vec::with_capacity(raw_len_hint(query));
    let mut builder = MessageBuilder::from_target(target)
        .expect("empty buffer always fits a header")
        .question();

    if let Ok(questions) = query.question() {
        for question in questions.flatten() {
            let _ = builder.push(&question);
        }
    }

    let mut answer_builder = builder.answer();
    for rr in answers {
        let _ = push_rr(&mut answer_builder, rr);
    }
    let mut authority_builder = answer_builder.authority();
    for rr in authorities {
        let _ = push_rr(&mut authority_builder, rr);
    }
    let mut additional_builder = authority_builder.additional();

    match edns {
        EdnsReply::None => {}
        EdnsReply::Opt(payload_size) => {
            let _ = additional_builder.opt(|opt| {
                opt.set_udp_payload_size(payload_size);
                Ok(())
            });
        }
        EdnsReply::BadVers => {
            let _ = additional_builder.opt(|opt| {
                opt.set_udp_payload_size(MIN_PAYLOAD_SIZE);
                opt.set_rcode(OptRcode::BADVERS);
                Ok(())
            });
        }
    }

    let mut msg = additional_builder.into_message();
    {
        let header = msg.header_mut();
        header.set_id(query.header().id());
        header.set_qr(true);
        header.set_opcode(query.header().opcode());
        header.set_rd(query.header().rd());
        header.set_aa(aa);
        header.set_ra(ra);
        header.set_rcode(rcode);
    }
    msg.as_slice().to_vec()
}

fn raw_len_hint(query: &Message<Vec<u8>>) -> usize {
    query.as_slice().len().max(64)
}

/// Set the `TC` bit directly on an already-built wire image; the header
/// accessor used in [`build_reply`] is consumed by the time truncation is
/// decided (spec §4.5 step 3 rolls back the last question/answer and flips
/// `TC`, which this crate implements by re-building the reply without that
/// content and then flipping the bit in the wire bytes).
fn set_tc(reply: &mut [u8]) {
    if reply.len() > 2 {
        reply[2] |= 0b0000_0010;
    }
}
