// SPDX-License-Identifier: MIT
//! Typed telemetry settings resolved from the `OpenTelemetry` configuration section.
//!
//! The configuration tree is a [`serde_json::Value`] produced by the host. Fields
//! are extracted one by one rather than through derive-based binding, so the
//! accepted keys are exactly the ones listed here:
//!
//! * `OTEL_EXPORTER_OTLP_ENDPOINT` (required)
//! * `OTEL_SERVICE_NAME` (required)
//! * `OTEL_EXPORTER_OTLP_HEADERS`, `OTEL_RESOURCE_ATTRIBUTES`
//! * `OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT`
//! * `OTEL_EXPORTER_OTLP_COMPRESSION`, `OTEL_EXPORTER_OTLP_PROTOCOL`
//! * `OTEL_EXPORTER_OTLP_METRICS_TEMPORALITY_PREFERENCE`
//! * `OTEL_SAMPLER` { `OTEL_SAMPLER_NAME`, `OTEL_SAMPLER_RATIO` }
//! * `OTEL_INSTRUMENTATION` { `HTTP_CLIENT`, `INBOUND_REQUESTS`, `RUNTIME` }
//!
//! Keys match case-insensitively. Scalars may be JSON strings, since environment
//! and command-line layers only ever produce strings.

use crate::error::{MissingConfiguration, Result, TelemetryError};
use opentelemetry_sdk::metrics::Temporality;
use serde_json::{Map, Value};
use std::str::FromStr;
use url::Url;

/// Name of the configuration section holding telemetry settings.
pub const SECTION_KEY: &str = "OpenTelemetry";

const ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";
const SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
const RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
const VALUE_LENGTH_LIMIT: &str = "OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT";
const COMPRESSION: &str = "OTEL_EXPORTER_OTLP_COMPRESSION";
const PROTOCOL: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
const TEMPORALITY: &str = "OTEL_EXPORTER_OTLP_METRICS_TEMPORALITY_PREFERENCE";
const SAMPLER: &str = "OTEL_SAMPLER";
const SAMPLER_NAME: &str = "OTEL_SAMPLER_NAME";
const SAMPLER_RATIO: &str = "OTEL_SAMPLER_RATIO";
const INSTRUMENTATION: &str = "OTEL_INSTRUMENTATION";
const HTTP_CLIENT: &str = "HTTP_CLIENT";
const INBOUND_REQUESTS: &str = "INBOUND_REQUESTS";
const RUNTIME: &str = "RUNTIME";

/// Settings for the three telemetry pipelines. Immutable once resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetrySettings {
    pub exporter_endpoint: String,
    /// Raw `k=v,k2=v2` header string, parsed at planning time.
    pub exporter_headers: Option<String>,
    pub service_name: String,
    /// Raw `k=v,k2=v2` resource attribute string.
    pub resource_attributes: Option<String>,
    pub attribute_value_length_limit: Option<u32>,
    pub compression: ExportCompression,
    /// Recorded for diagnostics; the exporter transport is always gRPC.
    pub protocol: ExportProtocol,
    pub metrics_temporality: Temporality,
    pub sampler: Option<SamplerConfig>,
    pub instrumentation: InstrumentationFlags,
}

/// Raw sampler section. The name is validated by [`crate::sampler::select_sampler`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SamplerConfig {
    pub name: Option<String>,
    /// Only consulted for the ratio-based strategy.
    pub ratio: Option<f64>,
}

/// Which automatic instrumentation the pipelines attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstrumentationFlags {
    pub http_client: bool,
    pub inbound_requests: bool,
    pub runtime: bool,
}

impl Default for InstrumentationFlags {
    fn default() -> Self {
        Self {
            http_client: true,
            inbound_requests: true,
            runtime: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportCompression {
    #[default]
    None,
    Gzip,
}

impl FromStr for ExportCompression {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            other => Err(format!("unsupported compression `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportProtocol {
    #[default]
    Grpc,
    HttpProtobuf,
    HttpJson,
}

impl FromStr for ExportProtocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grpc" => Ok(Self::Grpc),
            "http/protobuf" => Ok(Self::HttpProtobuf),
            "http/json" => Ok(Self::HttpJson),
            other => Err(format!("unsupported protocol `{other}`")),
        }
    }
}

fn parse_temporality(s: &str) -> std::result::Result<Temporality, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "cumulative" => Ok(Temporality::Cumulative),
        "delta" => Ok(Temporality::Delta),
        "lowmemory" => Ok(Temporality::LowMemory),
        other => Err(format!("unsupported temporality `{other}`")),
    }
}

/// Resolves the [`SECTION_KEY`] section of `tree`.
pub fn resolve_settings(tree: &Value) -> Result<TelemetrySettings> {
    resolve_section(tree, SECTION_KEY)
}

/// Resolves the named section of `tree` into [`TelemetrySettings`].
///
/// # Errors
/// * [`TelemetryError::ConfigurationMissing`] when the section, the service
///   name, or the endpoint is absent or blank.
/// * [`TelemetryError::InvalidValue`] when a present value has the wrong shape.
pub fn resolve_section(tree: &Value, section_key: &str) -> Result<TelemetrySettings> {
    let section = tree
        .as_object()
        .and_then(|root| lookup(root, section_key))
        .and_then(Value::as_object)
        .filter(|section| !section.is_empty())
        .ok_or(TelemetryError::ConfigurationMissing(
            MissingConfiguration::Section,
        ))?;

    let service_name = string_field(section, SERVICE_NAME)?.ok_or(
        TelemetryError::ConfigurationMissing(MissingConfiguration::ServiceName),
    )?;
    let exporter_endpoint = string_field(section, ENDPOINT)?.ok_or(
        TelemetryError::ConfigurationMissing(MissingConfiguration::Endpoint),
    )?;
    validate_endpoint(&exporter_endpoint)?;

    Ok(TelemetrySettings {
        exporter_endpoint,
        exporter_headers: string_field(section, HEADERS)?,
        service_name,
        resource_attributes: string_field(section, RESOURCE_ATTRIBUTES)?,
        attribute_value_length_limit: parsed_field(section, VALUE_LENGTH_LIMIT, |s| {
            s.parse::<u32>().map_err(|e| e.to_string())
        })?,
        compression: parsed_field(section, COMPRESSION, ExportCompression::from_str)?
            .unwrap_or_default(),
        protocol: parsed_field(section, PROTOCOL, ExportProtocol::from_str)?.unwrap_or_default(),
        metrics_temporality: parsed_field(section, TEMPORALITY, parse_temporality)?
            .unwrap_or_default(),
        sampler: sampler_section(section)?,
        instrumentation: instrumentation_section(section)?,
    })
}

/// The endpoint must be an absolute `http`/`https` URI naming a host.
fn validate_endpoint(endpoint: &str) -> Result<()> {
    let url = endpoint
        .trim()
        .parse::<Url>()
        .map_err(|e| TelemetryError::invalid(ENDPOINT, format!("not a valid URI: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TelemetryError::invalid(
            ENDPOINT,
            format!("unsupported scheme `{}`, expected http or https", url.scheme()),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(TelemetryError::invalid(ENDPOINT, "URI has no host"));
    }
    Ok(())
}

fn sampler_section(section: &Map<String, Value>) -> Result<Option<SamplerConfig>> {
    let Some(sampler) = object_field(section, SAMPLER)? else {
        return Ok(None);
    };
    let ratio = parsed_field(sampler, SAMPLER_RATIO, |s| {
        s.parse::<f64>().map_err(|e| e.to_string())
    })?;
    if let Some(ratio) = ratio {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(TelemetryError::invalid(
                SAMPLER_RATIO,
                format!("ratio {ratio} is outside [0, 1]"),
            ));
        }
    }
    Ok(Some(SamplerConfig {
        name: string_field(sampler, SAMPLER_NAME)?,
        ratio,
    }))
}

fn instrumentation_section(section: &Map<String, Value>) -> Result<InstrumentationFlags> {
    let defaults = InstrumentationFlags::default();
    let Some(flags) = object_field(section, INSTRUMENTATION)? else {
        return Ok(defaults);
    };
    Ok(InstrumentationFlags {
        http_client: bool_field(flags, HTTP_CLIENT)?.unwrap_or(defaults.http_client),
        inbound_requests: bool_field(flags, INBOUND_REQUESTS)?
            .unwrap_or(defaults.inbound_requests),
        runtime: bool_field(flags, RUNTIME)?.unwrap_or(defaults.runtime),
    })
}

fn lookup<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn object_field<'a>(
    object: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>> {
    match lookup(object, key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(inner)) => Ok(Some(inner)),
        Some(_) => Err(TelemetryError::invalid(key, "expected a section")),
    }
}

/// Reads a scalar as a string; blank strings count as unset.
fn string_field(object: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match lookup(object, key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(TelemetryError::invalid(key, "expected a scalar value")),
    }
}

fn parsed_field<T>(
    object: &Map<String, Value>,
    key: &str,
    parse: impl FnOnce(&str) -> std::result::Result<T, String>,
) -> Result<Option<T>> {
    string_field(object, key)?
        .map(|raw| parse(raw.trim()).map_err(|reason| TelemetryError::invalid(key, reason)))
        .transpose()
}

fn bool_field(object: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    parsed_field(object, key, |s| match s.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected true or false, got `{other}`")),
    })
}
