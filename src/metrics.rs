//! Maintaining and outputting metrics.
//!
//! Relevant sources for selecting metrics, metric names, and labels:
//! - https://prometheus.io/docs/practices/naming/
//! - https://prometheus.io/docs/instrumenting/writing_exporters/#labels
//! - https://prometheus.io/docs/practices/instrumentation/
//! - https://github.com/prometheus/OpenMetrics/blob/main/specification/OpenMetrics.md

use std::fmt;

use domain::base::iana::Rcode;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::info::Info;
use prometheus_client::registry::{Metric, Registry, Unit};

use crate::store::ZoneTag;

//------------ Module Configuration ------------------------------------------

/// The application prefix to use in the names of Prometheus metrics.
const PROMETHEUS_PREFIX: &str = "realmd";

//------------ MetricsCollection ---------------------------------------------

/// This registry's process-wide metrics. Every counter/gauge here is kept
/// live (incremented/set where the event happens) rather than assembled
/// from state at scrape time, since the registry's state — zone roles,
/// SOA serials — is already held behind async locks the scrape path has
/// no business contending for.
#[derive(Debug)]
pub struct MetricsCollection {
    registry: Registry,

    /// Answered queries, by zone and by the RCODE returned (spec §4.5/§4.6).
    queries: Family<QueryLabels, Counter>,

    /// AXFR transfers a secondary zone has attempted (spec §4.2).
    axfr_transfers: Family<AxfrLabels, Counter>,

    /// Registration writes accepted or rejected over the Application API
    /// (spec §4.8).
    registrations: Family<RegistrationLabels, Counter>,

    /// TTL-driven evictions performed by a caching zone's sweep (spec §4.2).
    ttl_evictions: Counter,

    /// Validator slashing sweeps that removed a stored payload (spec §4.3).
    slashing_sweeps: Counter,

    /// Current SOA serial per zone, refreshed whenever a zone bumps or
    /// adopts one.
    zone_serial: Family<ZoneLabel, Gauge>,
}

impl MetricsCollection {
    pub fn new() -> Self {
        let mut col = Self {
            registry: Registry::with_prefix(PROMETHEUS_PREFIX),
            queries: Default::default(),
            axfr_transfers: Default::default(),
            registrations: Default::default(),
            ttl_evictions: Default::default(),
            slashing_sweeps: Default::default(),
            zone_serial: Default::default(),
        };

        let build_info = Info::new(vec![("version", clap::crate_version!())]);
        col.registry.register("build", "realmd build information", build_info);

        col.registry.register(
            "queries",
            "DNS queries answered, by zone and result code",
            col.queries.clone(),
        );
        col.registry.register(
            "axfr_transfers",
            "AXFR transfers attempted by a secondary zone, by outcome",
            col.axfr_transfers.clone(),
        );
        col.registry.register(
            "registrations",
            "Registration writes submitted over the Application API",
            col.registrations.clone(),
        );
        col.registry.register(
            "ttl_evictions",
            "Addresses evicted by a caching zone's TTL sweep",
            col.ttl_evictions.clone(),
        );
        col.registry.register(
            "slashing_sweeps",
            "Validator payloads removed after their stake was slashed",
            col.slashing_sweeps.clone(),
        );
        col.registry.register_with_unit(
            "zone_serial",
            "Current SOA serial",
            Unit::Other("serial".into()),
            col.zone_serial.clone(),
        );

        col
    }

    /// Record one answered query.
    pub fn observe_query(&self, zone: ZoneTag, rcode: Rcode) {
        self.queries
            .get_or_create(&QueryLabels {
                zone: zone.into(),
                rcode: rcode.into(),
            })
            .inc();
    }

    /// Record one AXFR transfer attempt.
    pub fn observe_axfr(&self, zone: ZoneTag, outcome: TransferOutcome) {
        self.axfr_transfers
            .get_or_create(&AxfrLabels {
                zone: zone.into(),
                outcome,
            })
            .inc();
    }

    /// Record one registration write.
    pub fn observe_registration(&self, kind: RegistrationKind, outcome: TransferOutcome) {
        self.registrations
            .get_or_create(&RegistrationLabels { kind, outcome })
            .inc();
    }

    pub fn observe_ttl_eviction(&self) {
        self.ttl_evictions.inc();
    }

    pub fn observe_slashing_sweep(&self) {
        self.slashing_sweeps.inc();
    }

    /// Record a zone's current SOA serial after it changes.
    pub fn set_zone_serial(&self, zone: ZoneTag, serial: u32) {
        self.zone_serial
            .get_or_create(&ZoneLabel { zone: zone.into() })
            .set(serial as i64);
    }

    /// Render the current snapshot in OpenMetrics text format.
    pub fn render(&self) -> Result<String, fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }

    /// Register an additional metric with the underlying [`Registry`].
    pub fn register<N: Into<String>, H: Into<String>>(
        &mut self,
        name: N,
        help: H,
        metric: impl Metric,
    ) {
        self.registry.register(name, help, metric)
    }
}

impl Default for MetricsCollection {
    fn default() -> Self {
        Self::new()
    }
}

//------------ label types ----------------------------------------------------

/// The zone a metric pertains to. Mirrors [`ZoneTag`] rather than reusing it
/// directly so that the label encoding (and the set of valid label values)
/// is independent of the storage-layer enum's representation.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ZoneLabelValue {
    Realm,
    Validators,
    Flash,
}

impl From<ZoneTag> for ZoneLabelValue {
    fn from(tag: ZoneTag) -> Self {
        match tag {
            ZoneTag::Realm => ZoneLabelValue::Realm,
            ZoneTag::Validators => ZoneLabelValue::Validators,
            ZoneTag::Flash => ZoneLabelValue::Flash,
        }
    }
}

/// A DNS RCODE, reduced to the small set this registry actually returns
/// (spec §4.5/§4.6), for use as a label value.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum RcodeLabel {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other,
}

impl From<Rcode> for RcodeLabel {
    fn from(rcode: Rcode) -> Self {
        match rcode {
            Rcode::NOERROR => RcodeLabel::NoError,
            Rcode::FORMERR => RcodeLabel::FormErr,
            Rcode::SERVFAIL => RcodeLabel::ServFail,
            Rcode::NXDOMAIN => RcodeLabel::NxDomain,
            Rcode::NOTIMP => RcodeLabel::NotImp,
            Rcode::REFUSED => RcodeLabel::Refused,
            _ => RcodeLabel::Other,
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct QueryLabels {
    zone: ZoneLabelValue,
    rcode: RcodeLabel,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ZoneLabel {
    zone: ZoneLabelValue,
}

/// Whether an operation (an AXFR transfer or a registration write) ended
/// up succeeding or failing.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum TransferOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AxfrLabels {
    zone: ZoneLabelValue,
    outcome: TransferOutcome,
}

/// Which Application API endpoint a registration write came through (spec
/// §6).
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum RegistrationKind {
    Validator,
    FlashNode,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RegistrationLabels {
    kind: RegistrationKind,
    outcome: TransferOutcome,
}
