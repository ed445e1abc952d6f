// SPDX-License-Identifier: MIT
//! Error types for telemetry startup.
//!
//! Every variant is fatal: the host is expected to abort initialization rather
//! than run with a partially wired pipeline. Malformed resource-attribute
//! segments never surface here; the attribute parser drops them.

use std::fmt;
use thiserror::Error;

/// A specialised Result type for telemetry startup.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Which required piece of configuration was absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingConfiguration {
    /// The `OpenTelemetry` section itself.
    Section,
    /// `OTEL_SERVICE_NAME` was absent or blank.
    ServiceName,
    /// `OTEL_EXPORTER_OTLP_ENDPOINT` was absent or blank.
    Endpoint,
}

impl fmt::Display for MissingConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Section => f.write_str("OpenTelemetry configuration is missing"),
            Self::ServiceName => f.write_str("OpenTelemetry service name is not configured"),
            Self::Endpoint => f.write_str("OpenTelemetry OTLP endpoint is not configured"),
        }
    }
}

/// Signal a pipeline belongs to, used in exporter errors and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Logs,
    Traces,
    Metrics,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logs => f.write_str("log"),
            Self::Traces => f.write_str("trace"),
            Self::Metrics => f.write_str("metric"),
        }
    }
}

/// Errors raised while resolving settings or assembling pipelines.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A required section or field is absent.
    #[error("{0}")]
    ConfigurationMissing(MissingConfiguration),

    /// The sampler strategy name is not one we know.
    #[error("unknown sampler `{0}`")]
    UnknownSampler(String),

    /// A value is present but has the wrong shape.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    /// An OTLP exporter could not be constructed.
    #[error("failed to build {signal} exporter")]
    Exporter {
        signal: Signal,
        #[source]
        source: opentelemetry_otlp::ExporterBuildError,
    },

    /// A global `tracing` subscriber was already installed.
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

impl TelemetryError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns which configuration was missing, if this is a
    /// [`TelemetryError::ConfigurationMissing`].
    pub fn missing(&self) -> Option<MissingConfiguration> {
        match self {
            Self::ConfigurationMissing(which) => Some(*which),
            _ => None,
        }
    }
}
