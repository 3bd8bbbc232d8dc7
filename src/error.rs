//! Error taxonomy for the registry.
//!
//! [`RegistryError`] is the one error type produced by the zone engine and
//! the registry dispatcher. It is converted at the two boundaries the crate
//! exposes: to a DNS [`Rcode`] when answering a query, and to [`ApiError`]
//! when answering an HTTP request.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domain::base::iana::Rcode;
use serde::Serialize;

/// The kinds of failure the registry can produce, per spec §7.
#[derive(Debug)]
pub enum RegistryError {
    /// Malformed query or bad EDNS.
    Protocol,
    /// Unknown qtype/qclass.
    Unsupported,
    /// AXFR from a non-whitelisted peer, NS on a non-matching name, or a
    /// query outside the zones this registry serves.
    Refused,
    /// No such key in the zone.
    NameError,
    /// A write carried a `seq` not newer than the stored one.
    StaleWrite,
    /// The signature did not verify against `(public_key, seq, addresses)`.
    SignatureInvalid,
    /// An address failed to parse as a URI, or its host could not be
    /// classified.
    AddressMalformed,
    /// A flash node's channel did not validate against the ledger.
    ChannelInvalid,
    /// No stake UTXO could be found for a registering validator.
    NoStake,
    /// A SOA/AXFR/caching fetch against the upstream resolver failed.
    Upstream(String),
    /// The embedded store failed; fatal to the current operation only.
    Store(String),
    /// An internal invariant was violated (e.g. an unrecognised
    /// `TypedPayload.kind`); aborts the request, not the process.
    Internal(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Protocol => f.write_str("malformed query"),
            RegistryError::Unsupported => f.write_str("unsupported qtype or qclass"),
            RegistryError::Refused => f.write_str("refused"),
            RegistryError::NameError => f.write_str("no such name"),
            RegistryError::StaleWrite => f.write_str("sequence number is not newer than the stored one"),
            RegistryError::SignatureInvalid => f.write_str("signature does not verify"),
            RegistryError::AddressMalformed => f.write_str("address is malformed"),
            RegistryError::ChannelInvalid => f.write_str("channel does not validate against the ledger"),
            RegistryError::NoStake => f.write_str("no stake UTXO for this public key"),
            RegistryError::Upstream(msg) => write!(f, "upstream query failed: {msg}"),
            RegistryError::Store(msg) => write!(f, "store error: {msg}"),
            RegistryError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Store(err.to_string())
    }
}

impl RegistryError {
    /// The RCODE this error is rendered as when answering a DNS query.
    pub fn rcode(&self) -> Rcode {
        match self {
            RegistryError::Protocol => Rcode::FORMERR,
            RegistryError::Unsupported => Rcode::NOTIMP,
            RegistryError::Refused => Rcode::REFUSED,
            RegistryError::NameError => Rcode::NXDOMAIN,
            // These never arise on the DNS path; ServFail is the
            // conservative rendering if an API-only error leaks through.
            RegistryError::StaleWrite
            | RegistryError::SignatureInvalid
            | RegistryError::AddressMalformed
            | RegistryError::ChannelInvalid
            | RegistryError::NoStake
            | RegistryError::Upstream(_)
            | RegistryError::Store(_)
            | RegistryError::Internal(_) => Rcode::SERVFAIL,
        }
    }
}

/// The error body returned to an Application API caller.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError {
            error: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// Wraps a [`RegistryError`] with the HTTP status it should be reported as.
///
/// Kept distinct from [`ApiError`] itself so handlers can pick a status
/// (`404` for a miss, `409` for a stale write, `400` otherwise) while
/// reusing the same JSON body shape.
pub struct StatusError(pub StatusCode, pub RegistryError);

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        let body: ApiError = self.1.into();
        (self.0, Json(body)).into_response()
    }
}

impl RegistryError {
    /// The HTTP status this error is reported as at the Application API
    /// boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            RegistryError::NameError => StatusCode::NOT_FOUND,
            RegistryError::StaleWrite => StatusCode::CONFLICT,
            RegistryError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            RegistryError::Refused => StatusCode::FORBIDDEN,
            RegistryError::AddressMalformed
            | RegistryError::ChannelInvalid
            | RegistryError::Protocol
            | RegistryError::Unsupported => StatusCode::BAD_REQUEST,
            RegistryError::NoStake => StatusCode::UNPROCESSABLE_ENTITY,
            RegistryError::Upstream(_) | RegistryError::Store(_) | RegistryError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn into_response(self) -> Response {
        StatusError(self.status(), self).into_response()
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
