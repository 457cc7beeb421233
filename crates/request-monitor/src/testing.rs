//! Test helpers for asserting on recorded metrics.
//!
//! Available to this crate's unit tests and, through the `test-utils`
//! feature, to downstream crates.
//!
//! ```ignore
//! let (capture, recorder) = MetricCapture::new();
//! let monitor = Monitor::with_recorder(MonitorConfig::new("v1"), recorder)?;
//! // ... drive requests ...
//! let snapshot = capture.snapshot();
//! assert_eq!(snapshot.gauge("application_info", &[("version", "v1")]), Some(1.0));
//! ```

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use metrics_util::MetricKind;

/// Owns the read side of a [`DebuggingRecorder`].
pub struct MetricCapture {
    snapshotter: Snapshotter,
}

impl MetricCapture {
    /// Returns the capture and the recorder to hand to the code under test.
    pub fn new() -> (Self, DebuggingRecorder) {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        (Self { snapshotter }, recorder)
    }

    /// Takes a snapshot of everything recorded so far.
    pub fn snapshot(&self) -> MetricSnapshot {
        let entries = self
            .snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(composite, _unit, _description, value)| {
                let (kind, key) = composite.into_parts();
                let labels = key
                    .labels()
                    .map(|l| (l.key().to_string(), l.value().to_string()))
                    .collect();
                Entry {
                    kind,
                    name: key.name().to_string(),
                    labels,
                    value,
                }
            })
            .collect();

        MetricSnapshot { entries }
    }
}

struct Entry {
    kind: MetricKind,
    name: String,
    labels: Vec<(String, String)>,
    value: DebugValue,
}

impl Entry {
    /// Exact label-set match, order-insensitive.
    fn matches(&self, kind: MetricKind, name: &str, labels: &[(&str, &str)]) -> bool {
        self.kind == kind
            && self.name == name
            && self.labels.len() == labels.len()
            && labels
                .iter()
                .all(|(k, v)| self.labels.iter().any(|(lk, lv)| lk == k && lv == v))
    }
}

/// Point-in-time view of recorded metrics.
pub struct MetricSnapshot {
    entries: Vec<Entry>,
}

impl MetricSnapshot {
    fn find(&self, kind: MetricKind, name: &str, labels: &[(&str, &str)]) -> Option<&DebugValue> {
        self.entries
            .iter()
            .find(|e| e.matches(kind, name, labels))
            .map(|e| &e.value)
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        match self.find(MetricKind::Counter, name, labels)? {
            DebugValue::Counter(value) => Some(*value),
            _ => None,
        }
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        match self.find(MetricKind::Gauge, name, labels)? {
            DebugValue::Gauge(value) => Some(value.into_inner()),
            _ => None,
        }
    }

    /// Histogram samples sorted ascending. `None` if the series was never
    /// registered or holds no samples.
    pub fn histogram(&self, name: &str, labels: &[(&str, &str)]) -> Option<Vec<f64>> {
        match self.find(MetricKind::Histogram, name, labels)? {
            DebugValue::Histogram(values) if !values.is_empty() => {
                let mut samples: Vec<f64> = values.iter().map(|v| v.into_inner()).collect();
                samples.sort_by(f64::total_cmp);
                Some(samples)
            }
            _ => None,
        }
    }

    /// All label sets recorded for `name`, for cardinality checks.
    pub fn label_sets(&self, name: &str) -> Vec<Vec<(String, String)>> {
        self.entries
            .iter()
            .filter(|e| e.name == name)
            .map(|e| e.labels.clone())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics::{Key, Label, Level, Metadata, Recorder};

    static METADATA: Metadata<'static> = Metadata::new("test", Level::INFO, None);

    #[test]
    fn test_lookup_requires_exact_label_set() {
        let (capture, recorder) = MetricCapture::new();
        let key = Key::from_parts(
            "hits",
            vec![Label::new("a", "1"), Label::new("b", "2")],
        );
        recorder.register_counter(&key, &METADATA).increment(3);

        let snapshot = capture.snapshot();
        assert_eq!(snapshot.counter("hits", &[("b", "2"), ("a", "1")]), Some(3));
        assert_eq!(snapshot.counter("hits", &[("a", "1")]), None);
        assert_eq!(snapshot.gauge("hits", &[("a", "1"), ("b", "2")]), None);
        assert_eq!(snapshot.label_sets("hits").len(), 1);
    }

    #[test]
    fn test_histogram_samples_are_sorted() {
        let (capture, recorder) = MetricCapture::new();
        let histogram = recorder.register_histogram(&Key::from_name("latency"), &METADATA);
        histogram.record(0.3);
        histogram.record(0.1);

        assert_eq!(
            capture.snapshot().histogram("latency", &[]),
            Some(vec![0.1, 0.3])
        );
    }
}
