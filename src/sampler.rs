// SPDX-License-Identifier: MIT
//! Sampler strategy selection.

use crate::error::{Result, TelemetryError};
use crate::settings::SamplerConfig;
use opentelemetry_sdk::trace::Sampler;

const DEFAULT_RATIO: f64 = 1.0;

/// Sampling policy installed on the trace pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum SamplingPolicy {
    #[default]
    AlwaysOn,
    AlwaysOff,
    TraceIdRatio(f64),
}

impl From<SamplingPolicy> for Sampler {
    fn from(policy: SamplingPolicy) -> Self {
        match policy {
            SamplingPolicy::AlwaysOn => Sampler::AlwaysOn,
            SamplingPolicy::AlwaysOff => Sampler::AlwaysOff,
            SamplingPolicy::TraceIdRatio(ratio) => Sampler::TraceIdRatioBased(ratio),
        }
    }
}

/// Maps the optional sampler section onto a [`SamplingPolicy`].
///
/// | name | policy |
/// |---|---|
/// | absent section, absent or blank name | always on |
/// | `AlwaysOn` / `always_on` | always on |
/// | `AlwaysOff` / `always_off` | never |
/// | `TraceIdRatioBased` / `traceidratio` | ratio, default 1.0 |
///
/// # Errors
/// [`TelemetryError::UnknownSampler`] for any other name.
pub fn select_sampler(config: Option<&SamplerConfig>) -> Result<SamplingPolicy> {
    let Some(config) = config else {
        return Ok(SamplingPolicy::default());
    };
    let name = config.name.as_deref().map(str::trim).unwrap_or_default();
    match name {
        "" | "AlwaysOn" | "always_on" => Ok(SamplingPolicy::AlwaysOn),
        "AlwaysOff" | "always_off" => Ok(SamplingPolicy::AlwaysOff),
        "TraceIdRatioBased" | "traceidratio" => Ok(SamplingPolicy::TraceIdRatio(
            config.ratio.unwrap_or(DEFAULT_RATIO),
        )),
        other => Err(TelemetryError::UnknownSampler(other.to_string())),
    }
}
