// SPDX-License-Identifier: MIT
//! Service identity shared by every pipeline's resource.

use crate::settings::TelemetrySettings;
use std::sync::OnceLock;
use sysinfo::System;

const UNKNOWN: &str = "unknown";

/// Captures the calling crate's `CARGO_PKG_VERSION` as an `Option<&'static str>`.
///
/// Expand it in the embedding application so the reported `service.version`
/// is the application's, not this library's.
#[macro_export]
macro_rules! build_version {
    () => {
        option_env!("CARGO_PKG_VERSION")
    };
}

/// `service.name`, `service.namespace`, `service.version`, `service.instance.id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub instance_id: String,
}

impl ServiceIdentity {
    /// Derives the identity from settings plus explicit build and host facts.
    pub fn derive(
        settings: &TelemetrySettings,
        version: Option<&str>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            name: settings.service_name.clone(),
            namespace: application_namespace(&settings.service_name),
            version: version
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(UNKNOWN)
                .to_string(),
            instance_id: instance_id.into(),
        }
    }

    /// Like [`ServiceIdentity::derive`], reading the instance id from the host.
    pub fn from_host(settings: &TelemetrySettings, version: Option<&str>) -> Self {
        Self::derive(settings, version, host_identifier())
    }
}

/// Drops the first `.`-separated segment; names with no `.` are their own namespace.
///
/// `Company.Product.Service` becomes `Product.Service`.
pub fn application_namespace(application_name: &str) -> String {
    match application_name.split_once('.') {
        Some((_, rest)) => rest.to_string(),
        None => application_name.to_string(),
    }
}

/// The machine's host name, read once per process.
pub fn host_identifier() -> &'static str {
    static HOST: OnceLock<String> = OnceLock::new();
    HOST.get_or_init(|| System::host_name().unwrap_or_else(|| UNKNOWN.to_string()))
}
