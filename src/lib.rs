// SPDX-License-Identifier: MIT
//! Turns an `OpenTelemetry` configuration section into installed log, trace,
//! and metric pipelines for a hosted service.
//!
//! Resolution and assembly are split into small steps so each can be tested on
//! its own:
//! * [`settings`] – hand-written extraction of [`settings::TelemetrySettings`]
//!   from a configuration tree, with required-field validation.
//! * [`attributes`] – lenient `key=value,key=value` parsing for resource
//!   attributes and exporter headers.
//! * [`identity`] – `service.name` / `namespace` / `version` / `instance.id`.
//! * [`sampler`] – named sampler strategy to a sampling policy.
//! * [`telemetry`] – plans, builds, and installs the three pipelines. The
//!   primary entry points are [`telemetry::init_telemetry`] and
//!   [`telemetry::TelemetryHandle`].
//!
//! [`host`] and [`worker`] back the demo binary: layered configuration loading
//! and a periodic log-emitting task.
//!
//! # Feature Flags
//! * `console-log` (default) – add a compact console formatter (file/line/thread id).
//!
//! # Quick Start
//! ```no_run
//! use app_telemetry::telemetry::{init_telemetry, TelemetryOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tree = json!({ "OpenTelemetry": {
//!         "OTEL_SERVICE_NAME": "Company.Product.Service",
//!         "OTEL_EXPORTER_OTLP_ENDPOINT": "http://localhost:4317"
//!     } });
//!     let handle = init_telemetry(
//!         &tree,
//!         TelemetryOptions::new().service_version(app_telemetry::build_version!()),
//!     )?;
//!     // business logic
//!     handle.shutdown()?;
//!     Ok(())
//! }
//! ```
pub mod attributes;
pub mod error;
pub mod host;
pub mod identity;
pub mod sampler;
pub mod settings;
pub mod telemetry;
pub mod worker;

pub use error::{MissingConfiguration, Result, Signal, TelemetryError};
