// SPDX-License-Identifier: MIT
//! Pipeline assembly: settings in, three resource-tagged signal pipelines out.
//!
//! Assembly runs in three steps, each of which either completes or leaves
//! nothing behind:
//!
//! * [`PipelinePlan::new`] – pure. Selects the sampler, parses resource
//!   attributes and headers, and produces one plain config per signal, all
//!   sharing a single [`ResourceTag`].
//! * [`assemble`] – builds the three OTLP/gRPC exporters (the only fallible part),
//!   then the logger, tracer, and meter providers.
//! * [`TelemetryHandle::install`] – installs the `tracing` subscriber, then
//!   registers the global tracer and meter providers.
//!
//! [`init_telemetry`] runs the whole chain from a configuration tree.
//!
//! # Example
//! ```no_run
//! use app_telemetry::telemetry::{init_telemetry, TelemetryOptions};
//! # async fn run(tree: serde_json::Value) -> anyhow::Result<()> {
//! let handle = init_telemetry(
//!     &tree,
//!     TelemetryOptions::new().service_version(app_telemetry::build_version!()),
//! )?;
//! // ... application logic ...
//! handle.shutdown()?; // ensure final batches exported
//! # Ok(()) }
//! ```
//!
//! # Threading Model
//! gRPC channels connect lazily and need a Tokio runtime at construction time,
//! so call [`assemble`] / [`init_telemetry`] from inside the runtime. Batch
//! processors and the periodic metric reader run on their own threads.
use crate::attributes::{parse_key_value_list, ResourceAttributes};
use crate::error::{Result, Signal, TelemetryError};
use crate::identity::ServiceIdentity;
use crate::sampler::{select_sampler, SamplingPolicy};
use crate::settings::{
    resolve_settings, ExportCompression, ExportProtocol, InstrumentationFlags, TelemetrySettings,
};
use anyhow::Result as AnyResult;
use opentelemetry::metrics::{Histogram, Meter, MeterProvider as _, ObservableGauge};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{
    Compression, LogExporter, MetricExporter, SpanExporter, WithExportConfig, WithTonicConfig,
};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{
    Aggregation, Instrument, InstrumentKind, MeterProviderBuilder, PeriodicReader,
    SdkMeterProvider, Stream, Temporality,
};
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tracing::{debug, info, warn};
use tracing_opentelemetry::OpenTelemetryLayer;
#[cfg(feature = "console-log")]
use tracing_subscriber::fmt;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Instrumentation scope used for this crate's tracer and meter.
const INSTRUMENTATION_SCOPE: &str = "app-telemetry";

/// `tracing` targets emitted by outbound HTTP client crates.
pub const HTTP_CLIENT_TARGETS: &[&str] = &["reqwest", "hyper_util::client"];
/// `tracing` targets emitted by inbound request middleware.
pub const INBOUND_REQUEST_TARGETS: &[&str] = &["tower_http", "axum"];
/// Exporter transport crates. Their events never reach the log pipeline,
/// otherwise every export would log about itself. Sibling crates such as
/// `tower_http` or `hyper_util` are not covered.
const EXPORT_TRANSPORT_TARGETS: &[&str] = &["h2", "hyper", "tonic", "tower"];

// OpenTelemetry SDK defaults for base-2 exponential histograms.
const EXP_HISTOGRAM_MAX_SIZE: u32 = 160;
const EXP_HISTOGRAM_MAX_SCALE: i8 = 20;

/// Caller-supplied extension invoked once while the meter provider is built.
pub type MeterProviderHook = Box<dyn FnOnce(MeterProviderBuilder) -> MeterProviderBuilder + Send>;

/// Identity plus parsed resource attributes; shared by all three pipelines.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceTag {
    pub identity: ServiceIdentity,
    pub attributes: ResourceAttributes,
}

impl ResourceTag {
    /// Builds the SDK resource. Identity keys override same-named attributes.
    pub fn to_resource(&self) -> Resource {
        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| KeyValue::new(k.to_string(), v.to_string()))
            .chain([
                KeyValue::new("service.namespace", self.identity.namespace.clone()),
                KeyValue::new("service.version", self.identity.version.clone()),
                KeyValue::new("service.instance.id", self.identity.instance_id.clone()),
            ]);
        Resource::builder()
            .with_attributes(attributes)
            .with_service_name(self.identity.name.clone())
            .build()
    }
}

/// Where a pipeline exports to. Transport is always OTLP/gRPC.
#[derive(Clone, Debug, PartialEq)]
pub struct ExporterTarget {
    pub endpoint: String,
    pub headers: BTreeMap<String, String>,
    pub compression: ExportCompression,
}

impl ExporterTarget {
    /// Headers as gRPC metadata; pairs that are not valid metadata are skipped.
    pub fn metadata(&self) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        for (key, value) in &self.headers {
            match (
                key.parse::<AsciiMetadataKey>(),
                value.parse::<AsciiMetadataValue>(),
            ) {
                (Ok(k), Ok(v)) => {
                    metadata.insert(k, v);
                }
                _ => debug!(header = %key, "dropping header that is not valid gRPC metadata"),
            }
        }
        metadata
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogPipelineConfig {
    pub resource: Arc<ResourceTag>,
    pub exporter: ExporterTarget,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TracePipelineConfig {
    pub resource: Arc<ResourceTag>,
    pub exporter: ExporterTarget,
    pub sampler: SamplingPolicy,
    pub instrumentation: InstrumentationFlags,
}

impl TracePipelineConfig {
    /// `tracing` targets kept out of the span layer because their
    /// instrumentation is switched off.
    pub fn silenced_targets(&self) -> Vec<&'static str> {
        let mut silenced = Vec::new();
        if !self.instrumentation.http_client {
            silenced.extend_from_slice(HTTP_CLIENT_TARGETS);
        }
        if !self.instrumentation.inbound_requests {
            silenced.extend_from_slice(INBOUND_REQUEST_TARGETS);
        }
        silenced
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricPipelineConfig {
    pub resource: Arc<ResourceTag>,
    pub exporter: ExporterTarget,
    pub temporality: Temporality,
    pub instrumentation: InstrumentationFlags,
}

/// Plain-data description of all three pipelines.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelinePlan {
    pub logs: LogPipelineConfig,
    pub traces: TracePipelineConfig,
    pub metrics: MetricPipelineConfig,
}

impl PipelinePlan {
    /// Derives every pipeline config from resolved settings. Performs no I/O.
    ///
    /// # Errors
    /// [`TelemetryError::UnknownSampler`] if the sampler name is not recognised.
    pub fn new(settings: &TelemetrySettings, identity: ServiceIdentity) -> Result<Self> {
        let sampler = select_sampler(settings.sampler.as_ref())?;

        if settings.protocol != ExportProtocol::Grpc {
            warn!(
                protocol = ?settings.protocol,
                "OTLP protocol is fixed to gRPC; ignoring configured protocol"
            );
        }
        if let Some(limit) = settings.attribute_value_length_limit {
            debug!(limit, "attribute value length limit is not enforced by the SDK");
        }

        let resource = Arc::new(ResourceTag {
            identity,
            attributes: ResourceAttributes::parse(settings.resource_attributes.as_deref()),
        });
        let exporter = ExporterTarget {
            endpoint: settings.exporter_endpoint.clone(),
            headers: parse_key_value_list(settings.exporter_headers.as_deref()),
            compression: settings.compression,
        };

        Ok(Self {
            logs: LogPipelineConfig {
                resource: Arc::clone(&resource),
                exporter: exporter.clone(),
            },
            traces: TracePipelineConfig {
                resource: Arc::clone(&resource),
                exporter: exporter.clone(),
                sampler,
                instrumentation: settings.instrumentation,
            },
            metrics: MetricPipelineConfig {
                resource,
                exporter,
                temporality: settings.metrics_temporality,
                instrumentation: settings.instrumentation,
            },
        })
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.logs.resource.identity
    }
}

/// HTTP duration histograms for host middleware to record into.
///
/// A histogram is `None` when its instrumentation flag is off.
#[derive(Clone, Default)]
pub struct HttpInstruments {
    pub client_duration: Option<Histogram<f64>>,
    pub server_duration: Option<Histogram<f64>>,
}

impl HttpInstruments {
    fn new(meter: &Meter, flags: InstrumentationFlags) -> Self {
        Self {
            client_duration: flags.http_client.then(|| {
                meter
                    .f64_histogram("http.client.request.duration")
                    .with_unit("s")
                    .with_description("Duration of outbound HTTP requests.")
                    .build()
            }),
            server_duration: flags.inbound_requests.then(|| {
                meter
                    .f64_histogram("http.server.request.duration")
                    .with_unit("s")
                    .with_description("Duration of inbound HTTP requests.")
                    .build()
            }),
        }
    }
}

/// Options accepted by [`init_telemetry`].
pub struct TelemetryOptions {
    /// Reported as `service.version`; `"unknown"` when `None`.
    pub service_version: Option<String>,
    pub metrics_hook: Option<MeterProviderHook>,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            service_version: option_env!("CARGO_PKG_VERSION").map(str::to_string),
            metrics_hook: None,
        }
    }
}

impl TelemetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Usually `build_version!()` expanded in the application crate.
    pub fn service_version(mut self, version: Option<&str>) -> Self {
        self.service_version = version.map(str::to_string);
        self
    }

    /// Registers a hook that may add views, readers, or anything else to the
    /// meter provider before it is built.
    pub fn with_metrics_hook<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(MeterProviderBuilder) -> MeterProviderBuilder + Send + 'static,
    {
        self.metrics_hook = Some(Box::new(hook));
        self
    }
}

/// Owns the three providers plus instruments registered at assembly.
///
/// Dropping the handle without calling [`TelemetryHandle::shutdown`] may lose
/// final batches once the providers are registered globally.
pub struct TelemetryHandle {
    identity: ServiceIdentity,
    silenced_span_targets: Vec<&'static str>,
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
    http: HttpInstruments,
    _uptime: Option<ObservableGauge<f64>>,
}

impl std::fmt::Debug for TelemetryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryHandle")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl TelemetryHandle {
    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn http(&self) -> &HttpInstruments {
        &self.http
    }

    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    pub fn logger_provider(&self) -> &SdkLoggerProvider {
        &self.logger_provider
    }

    /// Installs the `tracing` subscriber, then the global tracer and meter providers.
    ///
    /// The subscriber goes first: if one is already installed, nothing is
    /// registered globally.
    ///
    /// # Errors
    /// [`TelemetryError::Subscriber`] if a global subscriber already exists.
    pub fn install(&self) -> Result<()> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let bridge_layer = OpenTelemetryTracingBridge::new(&self.logger_provider).with_filter(
            filter_fn(|metadata| !is_silenced(metadata.target(), EXPORT_TRANSPORT_TARGETS)),
        );
        let span_targets = self.silenced_span_targets.clone();
        let otel_trace_layer =
            OpenTelemetryLayer::new(self.tracer_provider.tracer(INSTRUMENTATION_SCOPE))
                .with_filter(filter_fn(move |metadata| {
                    !is_silenced(metadata.target(), &span_targets)
                }));

        // Console formatting: plain compact single-line output.
        #[cfg(feature = "console-log")]
        let fmt_layer_plain = fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .compact();

        #[cfg(feature = "console-log")]
        Registry::default()
            .with(filter)
            .with(fmt_layer_plain)
            .with(bridge_layer)
            .with(otel_trace_layer)
            .try_init()?;

        #[cfg(not(feature = "console-log"))]
        Registry::default()
            .with(filter)
            .with(bridge_layer)
            .with(otel_trace_layer)
            .try_init()?;

        global::set_tracer_provider(self.tracer_provider.clone());
        global::set_meter_provider(self.meter_provider.clone());

        info!(
            service.name = %self.identity.name,
            service.namespace = %self.identity.namespace,
            service.version = %self.identity.version,
            service.instance.id = %self.identity.instance_id,
            "telemetry pipelines installed"
        );
        Ok(())
    }

    /// Flush and shutdown all three providers.
    ///
    /// Returns `Ok(())` if every provider shutdown cleanly. Otherwise returns a
    /// combined `anyhow::Error` naming each failing component.
    pub fn shutdown(self) -> AnyResult<()> {
        let mut errs = Vec::new();
        if let Err(e) = self.tracer_provider.shutdown() {
            errs.push(format!("tracer: {e}"));
        }
        if let Err(e) = self.meter_provider.shutdown() {
            errs.push(format!("meter: {e}"));
        }
        if let Err(e) = self.logger_provider.shutdown() {
            errs.push(format!("logger: {e}"));
        }
        if errs.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(errs.join(", "))
        }
    }
}

/// Builds the log, trace, and metric providers described by `plan`.
///
/// All three exporters are built before any provider, so an exporter failure
/// leaves nothing running. Nothing is registered globally; see
/// [`TelemetryHandle::install`].
///
/// # Errors
/// [`TelemetryError::Exporter`] if any exporter cannot be constructed.
pub fn assemble(
    plan: PipelinePlan,
    metrics_hook: Option<MeterProviderHook>,
) -> Result<TelemetryHandle> {
    let log_exporter = with_target(LogExporter::builder().with_tonic(), &plan.logs.exporter)
        .build()
        .map_err(|source| TelemetryError::Exporter {
            signal: Signal::Logs,
            source,
        })?;
    let span_exporter = with_target(SpanExporter::builder().with_tonic(), &plan.traces.exporter)
        .build()
        .map_err(|source| TelemetryError::Exporter {
            signal: Signal::Traces,
            source,
        })?;
    let metric_exporter = with_target(
        MetricExporter::builder().with_tonic(),
        &plan.metrics.exporter,
    )
    .with_temporality(plan.metrics.temporality)
    .build()
    .map_err(|source| TelemetryError::Exporter {
        signal: Signal::Metrics,
        source,
    })?;

    // One resource, cloned into every provider.
    let resource = plan.logs.resource.to_resource();

    let logger_provider = SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(resource.clone())
        .build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_sampler(Sampler::from(plan.traces.sampler))
        .with_resource(resource.clone())
        .build();

    let reader = PeriodicReader::builder(metric_exporter).build();
    let mut meter_builder = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .with_view(exponential_histograms);
    if let Some(hook) = metrics_hook {
        meter_builder = hook(meter_builder);
    }
    let meter_provider = meter_builder.build();

    let meter = meter_provider.meter(INSTRUMENTATION_SCOPE);
    let http = HttpInstruments::new(&meter, plan.metrics.instrumentation);
    let uptime = plan
        .metrics
        .instrumentation
        .runtime
        .then(|| process_uptime(&meter));

    Ok(TelemetryHandle {
        identity: plan.identity().clone(),
        silenced_span_targets: plan.traces.silenced_targets(),
        tracer_provider,
        meter_provider,
        logger_provider,
        http,
        _uptime: uptime,
    })
}

/// Resolves settings from `tree`, assembles all three pipelines, and installs them.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
/// Any [`TelemetryError`]; on error nothing is registered globally.
pub fn init_telemetry(tree: &Value, options: TelemetryOptions) -> Result<TelemetryHandle> {
    let settings = resolve_settings(tree)?;
    let identity = ServiceIdentity::from_host(&settings, options.service_version.as_deref());
    let plan = PipelinePlan::new(&settings, identity)?;
    let handle = assemble(plan, options.metrics_hook)?;
    handle.install()?;
    Ok(handle)
}

fn with_target<B>(builder: B, target: &ExporterTarget) -> B
where
    B: WithExportConfig + WithTonicConfig,
{
    let mut builder = builder.with_endpoint(target.endpoint.clone());
    if !target.headers.is_empty() {
        builder = builder.with_metadata(target.metadata());
    }
    if target.compression == ExportCompression::Gzip {
        builder = builder.with_compression(Compression::Gzip);
    }
    builder
}

/// View routing every histogram instrument to base-2 exponential buckets.
fn exponential_histograms(instrument: &Instrument) -> Option<Stream> {
    if !matches!(instrument.kind(), InstrumentKind::Histogram) {
        return None;
    }
    Stream::builder()
        .with_aggregation(Aggregation::Base2ExponentialHistogram {
            max_size: EXP_HISTOGRAM_MAX_SIZE,
            max_scale: EXP_HISTOGRAM_MAX_SCALE,
            record_min_max: true,
        })
        .build()
        .ok()
}

fn process_uptime(meter: &Meter) -> ObservableGauge<f64> {
    let started = Instant::now();
    meter
        .f64_observable_gauge("process.uptime")
        .with_unit("s")
        .with_description("Time since telemetry was assembled.")
        .with_callback(move |observer| observer.observe(started.elapsed().as_secs_f64(), &[]))
        .build()
}

/// True when `target` is one of `silenced` or a module below one of them.
/// `tower` covers `tower::buffer` but not `tower_http`.
fn is_silenced(target: &str, silenced: &[&str]) -> bool {
    silenced.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MissingConfiguration;
    use opentelemetry::{Key, Value as OtelValue};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn tree(extra: serde_json::Value) -> serde_json::Value {
        let mut section = json!({
            "OTEL_SERVICE_NAME": "Company.Product.Service",
            "OTEL_EXPORTER_OTLP_ENDPOINT": "http://localhost:4317"
        });
        if let (Some(section), Some(extra)) = (section.as_object_mut(), extra.as_object()) {
            section.extend(extra.clone());
        }
        json!({ "OpenTelemetry": section })
    }

    fn plan_for(extra: serde_json::Value) -> Result<PipelinePlan> {
        let settings = resolve_settings(&tree(extra))?;
        let identity = ServiceIdentity::derive(&settings, Some("2.0.0"), "host-a");
        PipelinePlan::new(&settings, identity)
    }

    fn attr(resource: &Resource, key: &'static str) -> Option<OtelValue> {
        resource.get(&Key::from_static_str(key))
    }

    #[test]
    fn all_pipelines_share_one_resource_tag() {
        let plan = assert_ok!(plan_for(json!({ "OTEL_RESOURCE_ATTRIBUTES": "team=core" })));
        assert!(Arc::ptr_eq(&plan.logs.resource, &plan.traces.resource));
        assert!(Arc::ptr_eq(&plan.traces.resource, &plan.metrics.resource));
        assert_eq!(plan.identity().namespace, "Product.Service");
        assert_eq!(plan.logs.resource.attributes.get("team"), Some("core"));
    }

    #[test]
    fn all_pipelines_share_one_exporter_target() {
        let plan = assert_ok!(plan_for(json!({
            "OTEL_EXPORTER_OTLP_HEADERS": "api-key=secret",
            "OTEL_EXPORTER_OTLP_COMPRESSION": "gzip"
        })));
        assert_eq!(plan.logs.exporter, plan.traces.exporter);
        assert_eq!(plan.traces.exporter, plan.metrics.exporter);
        assert_eq!(plan.logs.exporter.endpoint, "http://localhost:4317");
        assert_eq!(plan.logs.exporter.compression, ExportCompression::Gzip);
    }

    #[test]
    fn resource_carries_identity_and_attributes() {
        let plan = assert_ok!(plan_for(json!({
            "OTEL_RESOURCE_ATTRIBUTES": "deployment.environment=prod,service.namespace=spoofed"
        })));
        let resource = plan.logs.resource.to_resource();
        assert_eq!(
            attr(&resource, "service.name"),
            Some(OtelValue::from("Company.Product.Service"))
        );
        assert_eq!(
            attr(&resource, "service.namespace"),
            Some(OtelValue::from("Product.Service"))
        );
        assert_eq!(attr(&resource, "service.version"), Some(OtelValue::from("2.0.0")));
        assert_eq!(attr(&resource, "service.instance.id"), Some(OtelValue::from("host-a")));
        assert_eq!(
            attr(&resource, "deployment.environment"),
            Some(OtelValue::from("prod"))
        );
    }

    #[test]
    fn plan_selects_sampler_and_temporality() {
        let plan = assert_ok!(plan_for(json!({
            "OTEL_SAMPLER": { "OTEL_SAMPLER_NAME": "TraceIdRatioBased", "OTEL_SAMPLER_RATIO": 0.5 },
            "OTEL_EXPORTER_OTLP_METRICS_TEMPORALITY_PREFERENCE": "delta"
        })));
        assert_eq!(plan.traces.sampler, SamplingPolicy::TraceIdRatio(0.5));
        assert_eq!(plan.metrics.temporality, Temporality::Delta);
    }

    #[test]
    fn unknown_sampler_yields_no_plan() {
        let err = assert_err!(plan_for(json!({
            "OTEL_SAMPLER": { "OTEL_SAMPLER_NAME": "Bogus" }
        })));
        assert!(matches!(err, TelemetryError::UnknownSampler(ref name) if name == "Bogus"));
    }

    #[test]
    fn planning_is_repeatable() {
        assert_eq!(assert_ok!(plan_for(json!({}))), assert_ok!(plan_for(json!({}))));
    }

    #[test]
    fn invalid_headers_are_dropped_from_metadata() {
        let target = ExporterTarget {
            endpoint: "http://localhost:4317".into(),
            headers: parse_key_value_list(Some("Api-Key=secret,bad key=x,tenant=acme")),
            compression: ExportCompression::None,
        };
        let metadata = target.metadata();
        assert_eq!(metadata.len(), 2);
        assert_eq!(
            metadata.get("api-key").and_then(|v| v.to_str().ok()),
            Some("secret")
        );
        assert!(metadata.get("tenant").is_some());
    }

    #[test]
    fn silenced_span_targets_follow_instrumentation_flags() {
        let plan = assert_ok!(plan_for(json!({
            "OTEL_INSTRUMENTATION": { "HTTP_CLIENT": false }
        })));
        let silenced = plan.traces.silenced_targets();
        assert!(is_silenced("reqwest::connect", &silenced));
        assert!(is_silenced("hyper_util::client::legacy", &silenced));
        assert!(!is_silenced("reqwest_middleware", &silenced));
        assert!(!is_silenced("tower_http::trace", &silenced));
        assert!(!is_silenced("my_app::handler", &silenced));

        let enabled = assert_ok!(plan_for(json!({}))).traces.silenced_targets();
        assert!(enabled.is_empty());
        assert!(!is_silenced("reqwest::connect", &enabled));
    }

    #[test]
    fn transport_filter_keeps_sibling_crates() {
        for kept in [
            "tower_http::trace::on_request",
            "hyper_util::client::legacy",
            "tonic_health",
            "axum::serve",
            "app_telemetry::worker",
        ] {
            assert!(!is_silenced(kept, EXPORT_TRANSPORT_TARGETS), "{kept}");
        }
        for dropped in [
            "h2::codec",
            "hyper",
            "hyper::proto::h1",
            "tonic::transport",
            "tower::buffer",
        ] {
            assert!(is_silenced(dropped, EXPORT_TRANSPORT_TARGETS), "{dropped}");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn assemble_builds_all_pipelines_and_runs_hook_once() {
        let plan = assert_ok!(plan_for(json!({
            "OTEL_INSTRUMENTATION": { "INBOUND_REQUESTS": false, "RUNTIME": false }
        })));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let hook: MeterProviderHook = Box::new(move |builder: MeterProviderBuilder| {
            seen.fetch_add(1, Ordering::SeqCst);
            builder
        });

        let handle = assert_ok!(assemble(plan, Some(hook)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.identity().instance_id, "host-a");
        assert!(handle.http().client_duration.is_some());
        assert!(handle.http().server_duration.is_none());
        // Nothing was exported, but the collector is not running either.
        let _ = handle.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn init_fails_before_assembly_on_bad_config() {
        let err = assert_err!(init_telemetry(&json!({}), TelemetryOptions::new()));
        assert_eq!(err.missing(), Some(MissingConfiguration::Section));

        let bad_sampler = tree(json!({ "OTEL_SAMPLER": { "OTEL_SAMPLER_NAME": "Bogus" } }));
        let err = assert_err!(init_telemetry(&bad_sampler, TelemetryOptions::new()));
        assert!(matches!(err, TelemetryError::UnknownSampler(_)));
    }
}
