//! Process-wide metric registry with duplicate detection and filtered snapshots.
//!
//! `prometheus-client` keeps no index of registered names, so this wrapper
//! tracks every family it hands to the underlying [`Registry`]. A snapshot is
//! a fresh `Registry` holding clones of the selected families; the clones share
//! their atomic state with the originals, so nothing is copied.

use parking_lot::RwLock;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::MetricType;
use prometheus_client::registry::{Metric, Registry};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Errors raised by the metric registry.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric family '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("invalid metric name '{0}'")]
    InvalidName(String),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] fmt::Error),
}

/// A metric that can be re-registered into a snapshot registry.
trait SnapshotMetric: Send + Sync {
    fn register_into(&self, registry: &mut Registry, name: &str, help: &str);
}

impl<M> SnapshotMetric for M
where
    M: Metric + Clone,
{
    fn register_into(&self, registry: &mut Registry, name: &str, help: &str) {
        registry.register(name, help, self.clone());
    }
}

struct RegisteredFamily {
    name: String,
    help: String,
    /// Names of the sample lines this family produces in the text format.
    sample_names: Vec<String>,
    metric: Box<dyn SnapshotMetric>,
}

impl RegisteredFamily {
    /// The family name followed by every sample name it emits.
    fn identifiers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.sample_names.iter().map(String::as_str))
    }

    fn matches(&self, names: &HashSet<String>) -> bool {
        names.is_empty()
            || names.contains(&self.name)
            || self.sample_names.iter().any(|n| names.contains(n))
    }
}

/// Shared registry of metric families.
///
/// Create one per process and hand it around behind an `Arc`.
#[derive(Default)]
pub struct MetricsRegistry {
    families: RwLock<Vec<RegisteredFamily>>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric family under `name`.
    ///
    /// Returns the metric back so callers can keep a handle to it. Counters
    /// are registered without the `_total` suffix; the text encoder appends it,
    /// so a trailing `_total` on a counter name is stripped.
    ///
    /// Registration fails with [`MetricsError::AlreadyRegistered`] when the
    /// family name or any of its sample names is already used by another
    /// family, e.g. counter `jobs` (emitting `jobs_total`) and gauge `jobs_total`.
    pub fn register<M>(&self, name: &str, help: &str, metric: M) -> Result<M, MetricsError>
    where
        M: Metric + Clone,
    {
        let metric_type = metric.metric_type();
        let family_name = match metric_type {
            MetricType::Counter => name.strip_suffix("_total").unwrap_or(name),
            _ => name,
        };
        if !is_valid_metric_name(family_name) {
            return Err(MetricsError::InvalidName(name.to_string()));
        }

        let family = RegisteredFamily {
            name: family_name.to_string(),
            help: help.to_string(),
            sample_names: sample_names(family_name, metric_type),
            metric: Box::new(metric.clone()),
        };

        let mut families = self.families.write();
        {
            let taken: HashSet<&str> = families.iter().flat_map(|f| f.identifiers()).collect();
            if let Some(clash) = family.identifiers().find(|id| taken.contains(id)) {
                return Err(MetricsError::AlreadyRegistered(clash.to_string()));
            }
        }
        families.push(family);

        Ok(metric)
    }

    /// Names of all registered families, in registration order.
    pub fn family_names(&self) -> Vec<String> {
        self.families.read().iter().map(|f| f.name.clone()).collect()
    }

    /// Build a snapshot of the families matching `names`.
    ///
    /// An empty set selects every family. A name matches a family when it is
    /// the family name or one of the sample names the family emits, so both
    /// `http_requests` and `http_requests_total` select the request counter.
    pub fn snapshot(&self, names: &HashSet<String>) -> Snapshot {
        let families = self.families.read();
        let mut registry = Registry::default();
        let mut included = Vec::new();

        for family in families.iter().filter(|f| f.matches(names)) {
            family
                .metric
                .register_into(&mut registry, &family.name, &family.help);
            included.push(family.name.clone());
        }

        Snapshot {
            registry,
            families: included,
        }
    }

    /// Snapshot and encode in one step.
    pub fn encode(&self, names: &HashSet<String>) -> Result<String, MetricsError> {
        self.snapshot(names).encode()
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("families", &self.family_names())
            .finish()
    }
}

/// Read-only view over a subset of registered families.
#[derive(Debug)]
pub struct Snapshot {
    registry: Registry,
    families: Vec<String>,
}

impl Snapshot {
    /// Families included in this snapshot.
    pub fn families(&self) -> &[String] {
        &self.families
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Encode the snapshot in the text exposition format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

fn sample_names(name: &str, metric_type: MetricType) -> Vec<String> {
    match metric_type {
        MetricType::Counter => vec![format!("{name}_total")],
        MetricType::Histogram => vec![
            format!("{name}_bucket"),
            format!("{name}_sum"),
            format!("{name}_count"),
        ],
        _ => vec![name.to_string()],
    }
}

/// Metric names follow `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
