use crate::types::MetricKind;

/// Errors raised while interpreting or looking up a metric.
///
/// These are the "expected" failures of the metric pipeline: each one maps to
/// a specific 4xx response on the server, while everything else (disk, SQL,
/// network) is reported generically.
///
/// # Examples
///
/// ```
/// use tally_common::error::MetricError;
///
/// let err = MetricError::WrongType("histogram".to_string());
/// assert!(err.to_string().contains("histogram"));
/// assert!(err.is_client_error());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    /// The declared metric type is neither `counter` nor `gauge`.
    #[error("wrong metric type: {0}")]
    WrongType(String),

    /// A value was supplied but does not parse as the declared type.
    #[error("wrong metric value: {0}")]
    WrongValue(String),

    /// A value was supplied in a field the declared type cannot use, e.g. a
    /// counter carrying only a float `value`.
    #[error("invalid value type for {kind} metric")]
    InvalidValueType { kind: MetricKind },

    /// Lookup of a specific metric found nothing.
    #[error("metric {kind}:{name} not found")]
    ValueNotFound { kind: MetricKind, name: String },
}

impl MetricError {
    /// True for the malformed-input variants (as opposed to [`MetricError::ValueNotFound`]).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, MetricError::ValueNotFound { .. })
    }
}
