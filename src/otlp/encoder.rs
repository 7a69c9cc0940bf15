//! # Batch Encoder
//!
//! Drains samples from the FIFO and serializes them into an OTLP
//! `ExportMetricsServiceRequest` that never exceeds the payload ceiling.
//!
//! ## Message layout
//!
//! ```text
//! ExportMetricsServiceRequest
//! └─ resource_metrics (1)
//!    ├─ resource (1) ─ attributes (1): service.name, device.id
//!    └─ scope_metrics (2)
//!       ├─ scope (1): name, version
//!       └─ metrics (2), one per metric group
//!          ├─ name (1), description (2), unit (3)
//!          └─ gauge (5) ─ data_points (1)
//!             └─ time_unix_nano (3, fixed64), as_double (4) | as_int (6)
//! ```
//!
//! Every size is computed before anything is written, so the ceiling check
//! is exact rather than an estimate.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use super::wire::{
    fixed64_field_len, len_field_len, put_double, put_fixed64, put_len_prefix, put_sfixed64,
    put_str, str_field_len,
};
use crate::catalog::{MetricCatalog, MetricDescriptor};
use crate::error::{Result, TelemetryError};
use crate::fifo::{Drained, SampleFifo};
use crate::sample::{Sample, SampleValue};

/// Instrumentation scope reported with every payload
pub const SCOPE_NAME: &str = "field-telemetry";

/// Samples drained per batch unless configured otherwise
pub const DEFAULT_BATCH_LIMIT: usize = 40;

/// Hard protocol ceiling for one payload
pub const MAX_PROTOBUF_BYTES: usize = 65534;

// ExportMetricsServiceRequest / ResourceMetrics / ScopeMetrics
const REQUEST_RESOURCE_METRICS: u32 = 1;
const RESOURCE_METRICS_RESOURCE: u32 = 1;
const RESOURCE_METRICS_SCOPE_METRICS: u32 = 2;
const RESOURCE_ATTRIBUTES: u32 = 1;
const SCOPE_METRICS_SCOPE: u32 = 1;
const SCOPE_METRICS_METRICS: u32 = 2;
const SCOPE_NAME_FIELD: u32 = 1;
const SCOPE_VERSION_FIELD: u32 = 2;
// KeyValue / AnyValue
const KEY_VALUE_KEY: u32 = 1;
const KEY_VALUE_VALUE: u32 = 2;
const ANY_VALUE_STRING: u32 = 1;
// Metric / Gauge / NumberDataPoint
const METRIC_NAME: u32 = 1;
const METRIC_DESCRIPTION: u32 = 2;
const METRIC_UNIT: u32 = 3;
const METRIC_GAUGE: u32 = 5;
const GAUGE_DATA_POINTS: u32 = 1;
const POINT_TIME_UNIX_NANO: u32 = 3;
const POINT_AS_DOUBLE: u32 = 4;
const POINT_AS_INT: u32 = 6;

/// Every data point has a timestamp and one 8-byte value
const POINT_LEN: usize = fixed64_field_len(POINT_TIME_UNIX_NANO) + fixed64_field_len(POINT_AS_DOUBLE);

/// Encoder settings
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Payload ceiling in bytes
    pub max_payload_bytes: usize,

    /// Samples drained per batch
    pub batch_limit: usize,

    /// Wall-clock nanoseconds at device time zero
    pub time_base_unix_nanos: u64,

    /// `service.name` resource attribute
    pub service_name: String,

    /// `device.id` resource attribute
    pub device_id: String,
}

/// A finished payload and the samples it carries
///
/// The range must go back to the FIFO: committed once the collector
/// acknowledged, restored otherwise.
#[derive(Debug)]
#[must_use = "the payload's range must be committed or restored"]
pub struct Payload {
    bytes: Bytes,
    range: Drained,
    metrics: usize,
}

impl Payload {
    /// Serialized request
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Samples encoded in this payload, in FIFO order
    pub fn range(&self) -> &Drained {
        &self.range
    }

    /// Number of metric entries (groups) encoded
    pub fn metric_count(&self) -> usize {
        self.metrics
    }

    /// Number of data points encoded
    pub fn point_count(&self) -> usize {
        self.range.len()
    }

    /// Give up the bytes and keep the range for commit/restore
    pub fn into_range(self) -> Drained {
        self.range
    }
}

/// Samples of one metric within a batch
struct Group {
    descriptor: &'static MetricDescriptor,
    positions: Vec<usize>,
}

/// Groups drained samples and serializes them under the size ceiling
#[derive(Debug)]
pub struct BatchEncoder {
    catalog: MetricCatalog,
    config: EncoderConfig,
    scratch: BytesMut,
}

impl BatchEncoder {
    pub fn new(catalog: MetricCatalog, config: EncoderConfig) -> Self {
        let scratch = BytesMut::with_capacity(config.max_payload_bytes);
        Self {
            catalog,
            config,
            scratch,
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Drain one batch from `fifo` and encode it
    ///
    /// # Returns
    ///
    /// * `Ok(Some(payload))` - groups that fit under the ceiling; samples of
    ///   groups that did not fit are already restored to the FIFO head
    /// * `Ok(None)` - nothing was pending
    ///
    /// # Errors
    ///
    /// * [`TelemetryError::Catalog`] - a sample references an unknown metric
    ///   or carries the wrong value kind (fatal)
    /// * [`TelemetryError::PayloadTooLarge`] - not even one data point fits
    ///
    /// Every drained sample is restored before an error is returned.
    pub fn build_batch(&mut self, fifo: &mut SampleFifo) -> Result<Option<Payload>> {
        let drained = fifo.drain_up_to(self.config.batch_limit);
        if drained.is_empty() {
            fifo.commit(drained);
            return Ok(None);
        }

        let groups = match self.group(drained.samples()) {
            Ok(groups) => groups,
            Err(e) => {
                fifo.restore(drained);
                return Err(e);
            }
        };

        let mut included = vec![false; drained.len()];
        let mut metrics_len = 0usize;
        let mut metric_count = 0usize;
        self.scratch.clear();

        for (index, group) in groups.iter().enumerate() {
            let entry_len = metric_entry_len(group.descriptor, group.positions.len());
            if self.request_len(metrics_len + entry_len) <= self.config.max_payload_bytes {
                self.write_metric(group.descriptor, &group.positions, drained.samples());
                group.positions.iter().for_each(|&p| included[p] = true);
                metrics_len += entry_len;
                metric_count += 1;
                continue;
            }

            if index > 0 {
                debug!(
                    drain = drained.id(),
                    encoded = metric_count,
                    deferred = groups.len() - index,
                    "Payload ceiling reached, deferring remaining metric groups"
                );
                break;
            }

            // The first group alone is too big: keep as many leading points as fit
            let fitting = (1..group.positions.len())
                .rev()
                .find(|&n| {
                    let len = metric_entry_len(group.descriptor, n);
                    self.request_len(len) <= self.config.max_payload_bytes
                })
                .unwrap_or(0);

            if fitting == 0 {
                let needed = self.request_len(metric_entry_len(group.descriptor, 1));
                fifo.restore(drained);
                return Err(TelemetryError::PayloadTooLarge {
                    needed,
                    ceiling: self.config.max_payload_bytes,
                });
            }

            let positions = &group.positions[..fitting];
            self.write_metric(group.descriptor, positions, drained.samples());
            positions.iter().for_each(|&p| included[p] = true);
            metrics_len += metric_entry_len(group.descriptor, fitting);
            metric_count += 1;
            warn!(
                metric = group.descriptor.name,
                encoded = fitting,
                deferred = group.positions.len() - fitting,
                "Single metric group exceeds payload ceiling, splitting it"
            );
            break;
        }

        let (encoded, deferred) = drained.partition(|position, _| included[position]);
        if !deferred.is_empty() {
            fifo.restore(deferred);
        }

        let bytes = self.finish(metrics_len);
        debug!(
            drain = encoded.id(),
            bytes = bytes.len(),
            metrics = metric_count,
            points = encoded.len(),
            "Built metrics payload"
        );

        Ok(Some(Payload {
            bytes,
            range: encoded,
            metrics: metric_count,
        }))
    }

    /// Group sample positions by metric, ordered by first appearance
    fn group(&self, samples: &[Sample]) -> Result<Vec<Group>> {
        let mut groups: Vec<Group> = Vec::new();

        for (position, sample) in samples.iter().enumerate() {
            let descriptor = self.catalog.describe(sample.metric_index)?;
            if sample.value.kind() != descriptor.value_kind {
                return Err(TelemetryError::Catalog(format!(
                    "metric '{}' expects {:?} values, sample carries {:?}",
                    descriptor.name,
                    descriptor.value_kind,
                    sample.value.kind()
                )));
            }

            match groups
                .iter_mut()
                .find(|g| std::ptr::eq(g.descriptor, descriptor))
            {
                Some(group) => group.positions.push(position),
                None => groups.push(Group {
                    descriptor,
                    positions: vec![position],
                }),
            }
        }

        Ok(groups)
    }

    fn resource_len(&self) -> usize {
        key_value_field_len("service.name", &self.config.service_name)
            + key_value_field_len("device.id", &self.config.device_id)
    }

    fn scope_len() -> usize {
        str_field_len(SCOPE_NAME_FIELD, SCOPE_NAME)
            + str_field_len(SCOPE_VERSION_FIELD, env!("CARGO_PKG_VERSION"))
    }

    fn scope_metrics_len(metrics_len: usize) -> usize {
        len_field_len(SCOPE_METRICS_SCOPE, Self::scope_len()) + metrics_len
    }

    fn resource_metrics_len(&self, metrics_len: usize) -> usize {
        len_field_len(RESOURCE_METRICS_RESOURCE, self.resource_len())
            + len_field_len(
                RESOURCE_METRICS_SCOPE_METRICS,
                Self::scope_metrics_len(metrics_len),
            )
    }

    /// Exact size of a request whose metric entries total `metrics_len`
    pub fn request_len(&self, metrics_len: usize) -> usize {
        len_field_len(REQUEST_RESOURCE_METRICS, self.resource_metrics_len(metrics_len))
    }

    fn write_metric(&mut self, descriptor: &MetricDescriptor, positions: &[usize], samples: &[Sample]) {
        let buf = &mut self.scratch;
        put_len_prefix(buf, SCOPE_METRICS_METRICS, metric_len(descriptor, positions.len()));
        put_str(buf, METRIC_NAME, descriptor.name);
        put_str(buf, METRIC_DESCRIPTION, descriptor.description);
        put_str(buf, METRIC_UNIT, descriptor.unit);
        put_len_prefix(buf, METRIC_GAUGE, gauge_len(positions.len()));

        for &position in positions {
            let sample = &samples[position];
            put_len_prefix(buf, GAUGE_DATA_POINTS, POINT_LEN);
            put_fixed64(
                buf,
                POINT_TIME_UNIX_NANO,
                self.config
                    .time_base_unix_nanos
                    .saturating_add(sample.timestamp_us.saturating_mul(1_000)),
            );
            match sample.value {
                SampleValue::Double(v) => put_double(buf, POINT_AS_DOUBLE, round_to(v, descriptor.precision)),
                SampleValue::Int(v) => put_sfixed64(buf, POINT_AS_INT, v),
                SampleValue::Bool(v) => put_sfixed64(buf, POINT_AS_INT, i64::from(v)),
            }
        }
    }

    /// Wrap the accumulated metric entries in the request envelope
    fn finish(&mut self, metrics_len: usize) -> Bytes {
        let total = self.request_len(metrics_len);
        let mut out = BytesMut::with_capacity(total);

        put_len_prefix(&mut out, REQUEST_RESOURCE_METRICS, self.resource_metrics_len(metrics_len));

        put_len_prefix(&mut out, RESOURCE_METRICS_RESOURCE, self.resource_len());
        put_key_value(&mut out, "service.name", &self.config.service_name);
        put_key_value(&mut out, "device.id", &self.config.device_id);

        put_len_prefix(
            &mut out,
            RESOURCE_METRICS_SCOPE_METRICS,
            Self::scope_metrics_len(metrics_len),
        );
        put_len_prefix(&mut out, SCOPE_METRICS_SCOPE, Self::scope_len());
        put_str(&mut out, SCOPE_NAME_FIELD, SCOPE_NAME);
        put_str(&mut out, SCOPE_VERSION_FIELD, env!("CARGO_PKG_VERSION"));

        out.put_slice(&self.scratch);
        self.scratch.clear();

        debug_assert_eq!(out.len(), total);
        out.freeze()
    }
}

fn gauge_len(points: usize) -> usize {
    points * len_field_len(GAUGE_DATA_POINTS, POINT_LEN)
}

fn metric_len(descriptor: &MetricDescriptor, points: usize) -> usize {
    str_field_len(METRIC_NAME, descriptor.name)
        + str_field_len(METRIC_DESCRIPTION, descriptor.description)
        + str_field_len(METRIC_UNIT, descriptor.unit)
        + len_field_len(METRIC_GAUGE, gauge_len(points))
}

/// Size of one `metrics` entry inside ScopeMetrics
fn metric_entry_len(descriptor: &MetricDescriptor, points: usize) -> usize {
    len_field_len(SCOPE_METRICS_METRICS, metric_len(descriptor, points))
}

fn any_value_len(value: &str) -> usize {
    // AnyValue with an empty string still marks the oneof as set
    len_field_len(ANY_VALUE_STRING, value.len())
}

fn key_value_len(key: &str, value: &str) -> usize {
    str_field_len(KEY_VALUE_KEY, key) + len_field_len(KEY_VALUE_VALUE, any_value_len(value))
}

fn key_value_field_len(key: &str, value: &str) -> usize {
    len_field_len(RESOURCE_ATTRIBUTES, key_value_len(key, value))
}

fn put_key_value<B: BufMut>(buf: &mut B, key: &str, value: &str) {
    put_len_prefix(buf, RESOURCE_ATTRIBUTES, key_value_len(key, value));
    put_str(buf, KEY_VALUE_KEY, key);
    put_len_prefix(buf, KEY_VALUE_VALUE, any_value_len(value));
    put_len_prefix(buf, ANY_VALUE_STRING, value.len());
    buf.put_slice(value.as_bytes());
}

/// Round to `precision` decimal places; non-finite values pass through
fn round_to(value: f64, precision: u8) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(i32::from(precision));
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}
