use crate::error::MetricError;
use serde::{Deserialize, Serialize};

/// Name of the counter the agent increments once per poll.
pub const POLL_COUNT: &str = "PollCount";
/// Name of the gauge the agent refreshes with a random value on every report.
pub const RANDOM_VALUE: &str = "RandomValue";

/// Metric type. Fixed for a given record: the type is part of the record key,
/// so a counter and a gauge with the same name are two distinct records.
///
/// # Examples
///
/// ```
/// use tally_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            _ => Err(MetricError::WrongType(s.to_string())),
        }
    }
}

/// Builds the record key, `type:name`.
///
/// # Examples
///
/// ```
/// use tally_common::types::{metric_key, MetricKind};
///
/// assert_eq!(metric_key(MetricKind::Gauge, "Alloc"), "gauge:Alloc");
/// ```
pub fn metric_key(kind: MetricKind, name: &str) -> String {
    format!("{kind}:{name}")
}

/// The authoritative current value of one metric, as held by a repository and
/// written to snapshots.
///
/// Only `delta` is meaningful for counters and only `value` for gauges; the
/// other field is carried along but ignored by every reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub name: String,
    #[serde(default)]
    pub delta: i64,
    #[serde(default)]
    pub value: f64,
}

impl MetricRecord {
    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        let name = name.into();
        Self {
            key: metric_key(MetricKind::Counter, &name),
            kind: MetricKind::Counter,
            name,
            delta,
            value: 0.0,
        }
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        let name = name.into();
        Self {
            key: metric_key(MetricKind::Gauge, &name),
            kind: MetricKind::Gauge,
            name,
            delta: 0,
            value,
        }
    }

    /// Folds an incoming update for the same key into this record.
    ///
    /// Counters accumulate, gauges are replaced by the incoming reading.
    ///
    /// # Examples
    ///
    /// ```
    /// use tally_common::types::MetricRecord;
    ///
    /// let mut polls = MetricRecord::counter("PollCount", 5);
    /// polls.merge(&MetricRecord::counter("PollCount", 3));
    /// assert_eq!(polls.delta, 8);
    ///
    /// let mut alloc = MetricRecord::gauge("Alloc", 100.0);
    /// alloc.merge(&MetricRecord::gauge("Alloc", 250.5));
    /// assert_eq!(alloc.value, 250.5);
    /// ```
    pub fn merge(&mut self, incoming: &MetricRecord) {
        debug_assert_eq!(self.key, incoming.key);
        match self.kind {
            MetricKind::Counter => self.delta = self.delta.wrapping_add(incoming.delta),
            MetricKind::Gauge => self.value = incoming.value,
        }
    }

    /// Validates a wire DTO and turns it into a record.
    ///
    /// Fails with [`MetricError::WrongType`] for an unknown type and with
    /// [`MetricError::InvalidValueType`] when the only value supplied sits in
    /// the field the declared type does not use. A gauge reading that is NaN
    /// or infinite is [`MetricError::WrongValue`]. A DTO with no value at all
    /// is read as zero.
    pub fn from_metrics(m: &Metrics) -> Result<Self, MetricError> {
        let kind: MetricKind = m.kind.parse()?;
        match kind {
            MetricKind::Gauge if m.value.is_some_and(|v| !v.is_finite()) => {
                Err(MetricError::WrongValue(m.value_or_zero().to_string()))
            }
            MetricKind::Counter if m.delta.is_none() && m.value.is_some() => {
                Err(MetricError::InvalidValueType { kind })
            }
            MetricKind::Gauge if m.value.is_none() && m.delta.is_some() => {
                Err(MetricError::InvalidValueType { kind })
            }
            MetricKind::Counter => Ok(Self::counter(m.id.clone(), m.delta_or_zero())),
            MetricKind::Gauge => Ok(Self::gauge(m.id.clone(), m.value_or_zero())),
        }
    }

    /// Renders the record as a wire DTO carrying only the meaningful field.
    pub fn to_metrics(&self) -> Metrics {
        match self.kind {
            MetricKind::Counter => Metrics::counter(&self.name, self.delta),
            MetricKind::Gauge => Metrics::gauge(&self.name, self.value),
        }
    }

    /// The current value as plain text, as served by `GET /value/{type}/{name}`.
    pub fn value_text(&self) -> String {
        match self.kind {
            MetricKind::Counter => self.delta.to_string(),
            MetricKind::Gauge => self.value.to_string(),
        }
    }
}

/// Wire representation of a metric update or lookup, exchanged as JSON
/// between the agent and the server.
///
/// The type is kept as a raw string so that an unknown type can be reported
/// as [`MetricError::WrongType`] instead of failing JSON decoding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metrics {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter.to_string(),
            delta: Some(delta),
            value: None,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge.to_string(),
            delta: None,
            value: Some(value),
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }

    pub fn delta_or_zero(&self) -> i64 {
        self.delta.unwrap_or_default()
    }

    pub fn value_or_zero(&self) -> f64 {
        self.value.unwrap_or_default()
    }

    /// Text of the field that matters for the declared type.
    pub fn value_by_type(&self) -> Result<String, MetricError> {
        Ok(match self.kind.parse::<MetricKind>()? {
            MetricKind::Counter => self.delta_or_zero().to_string(),
            MetricKind::Gauge => self.value_or_zero().to_string(),
        })
    }

    /// Parses a textual value according to the declared type and stores it in
    /// the matching field. Gauges must be finite: `NaN` and `inf` are refused.
    ///
    /// # Examples
    ///
    /// ```
    /// use tally_common::error::MetricError;
    /// use tally_common::types::Metrics;
    ///
    /// let mut m = Metrics { id: "PollCount".into(), kind: "counter".into(), ..Default::default() };
    /// m.set_value_from_str("12").unwrap();
    /// assert_eq!(m.delta, Some(12));
    ///
    /// let mut bad = Metrics { id: "Alloc".into(), kind: "gauge".into(), ..Default::default() };
    /// assert!(matches!(bad.set_value_from_str("abc"), Err(MetricError::WrongValue(_))));
    /// ```
    pub fn set_value_from_str(&mut self, raw: &str) -> Result<(), MetricError> {
        match self.kind.parse::<MetricKind>()? {
            MetricKind::Counter => {
                let delta = raw
                    .parse::<i64>()
                    .map_err(|_| MetricError::WrongValue(raw.to_string()))?;
                self.delta = Some(delta);
            }
            MetricKind::Gauge => {
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| MetricError::WrongValue(raw.to_string()))?;
                self.value = Some(value);
            }
        }
        Ok(())
    }
}
