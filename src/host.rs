// SPDX-License-Identifier: MIT
//! Layered configuration tree for the host binary.
//!
//! Later layers override earlier ones:
//!
//! 1. base JSON file (required), e.g. `appsettings.json`
//! 2. `<stem>.<environment>.json` next to it, if an environment is given and the file exists
//! 3. the file named by a top-level `GlobalConfigPath` key, if present (required once named)
//! 4. environment variables whose names contain `__`, e.g. `OpenTelemetry__OTEL_SERVICE_NAME`
//! 5. command-line overrides `Section:Key=value` (a leading `--` or `/` is ignored)
//!
//! Layering is done by [`config::Config`]. Its environment source lowercases
//! keys while file keys keep their spelling, so the merged tree is folded
//! case-insensitively afterwards, with all-lowercase keys winning. Values from
//! environment and command-line layers are always strings.

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Separates nesting levels in environment variable names.
pub const ENV_SEPARATOR: &str = "__";
/// Separates nesting levels in command-line override keys.
pub const KEY_SEPARATOR: char = ':';
/// Top-level key naming an extra configuration file.
pub const GLOBAL_CONFIG_KEY: &str = "GlobalConfigPath";

/// Loads and merges every configuration layer into one tree.
pub fn load_config_tree<I>(
    base: &Path,
    environment: Option<&str>,
    env_vars: I,
    overrides: &[String],
) -> Result<Value>
where
    I: IntoIterator<Item = (String, String)>,
{
    let files: Value = file_layers(base, environment)
        .build()
        .and_then(Config::try_deserialize)
        .with_context(|| format!("Failed to load config file: {}", base.display()))?;
    let global = files
        .as_object()
        .and_then(|root| lookup(root, GLOBAL_CONFIG_KEY))
        .and_then(Value::as_str)
        .map(PathBuf::from);

    let mut builder = file_layers(base, environment);
    if let Some(path) = global {
        debug!(path = %path.display(), "adding global configuration file");
        builder = builder.add_source(File::from(path));
    }

    let vars: config::Map<String, String> = env_vars
        .into_iter()
        .filter(|(name, _)| name.contains(ENV_SEPARATOR))
        .collect();
    builder = builder.add_source(
        Environment::default()
            .separator(ENV_SEPARATOR)
            .source(Some(vars)),
    );

    for raw in overrides {
        let (key, value) = parse_override(raw)?;
        builder = builder
            .set_override(key.as_str(), value)
            .with_context(|| format!("invalid override `{raw}`"))?;
    }

    let tree: Value = builder
        .build()
        .and_then(Config::try_deserialize)
        .context("Failed to merge configuration layers")?;
    Ok(fold_key_case(tree))
}

fn file_layers(base: &Path, environment: Option<&str>) -> ConfigBuilder<DefaultState> {
    let mut builder = Config::builder().add_source(File::from(base));
    if let Some(path) = environment.and_then(|env| environment_file(base, env)) {
        builder = builder.add_source(File::from(path).required(false));
    }
    builder
}

fn environment_file(base: &Path, environment: &str) -> Option<PathBuf> {
    let stem = base.file_stem()?.to_str()?;
    Some(base.with_file_name(format!("{stem}.{environment}.json")))
}

/// `--Section:Key=value` to (`section.key`, `value`), keyed like the environment layer.
fn parse_override(raw: &str) -> Result<(String, String)> {
    let arg = raw.trim_start_matches("--").trim_start_matches('/');
    let (key, value) = arg
        .split_once('=')
        .with_context(|| format!("override `{raw}` is not of the form Key:Sub=value"))?;
    let path = key.replace(KEY_SEPARATOR, ".").to_ascii_lowercase();
    Ok((path, value.to_string()))
}

fn lookup<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// Merges keys that differ only in case. The first spelling is kept; values
/// under all-lowercase keys are applied last so they win.
fn fold_key_case(value: Value) -> Value {
    let Value::Object(object) = value else {
        return value;
    };
    let mut entries: Vec<(String, Value)> = object.into_iter().collect();
    entries.sort_by_key(|(key, _)| !key.bytes().any(|b| b.is_ascii_uppercase()));

    let mut folded = Map::new();
    for (key, value) in entries {
        let value = fold_key_case(value);
        insert_folded(&mut folded, key, value);
    }
    Value::Object(folded)
}

fn insert_folded(object: &mut Map<String, Value>, key: String, value: Value) {
    let existing = object
        .keys()
        .find(|k| k.eq_ignore_ascii_case(&key))
        .cloned()
        .unwrap_or(key);
    match object.get_mut(&existing) {
        Some(slot) => overlay(slot, value),
        None => {
            object.insert(existing, value);
        }
    }
}

/// Deep overlay: objects merge key by key, anything else replaces.
fn overlay(target: &mut Value, layer: Value) {
    match (target, layer) {
        (Value::Object(target), Value::Object(layer)) => {
            for (key, value) in layer {
                insert_folded(target, key, value);
            }
        }
        (target, layer) => *target = layer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::resolve_settings;
    use crate::settings::SamplerConfig;
    use serde_json::json;
    use std::fs;

    fn write(dir: &Path, name: &str, value: Value) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, value.to_string()).expect("write config");
        path
    }

    fn base_settings() -> Value {
        json!({
            "OpenTelemetry": {
                "OTEL_SERVICE_NAME": "base",
                "OTEL_EXPORTER_OTLP_ENDPOINT": "http://base:4317"
            }
        })
    }

    #[test]
    fn reads_base_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = write(dir.path(), "appsettings.json", base_settings());
        let tree = load_config_tree(&base, None, Vec::new(), &[]).expect("tree");
        let settings = resolve_settings(&tree).expect("settings");
        assert_eq!(settings.service_name, "base");
        assert_eq!(settings.exporter_endpoint, "http://base:4317");
    }

    #[test]
    fn missing_base_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config_tree(&dir.path().join("nope.json"), None, Vec::new(), &[])
            .expect_err("missing file");
        assert!(err.to_string().contains("Failed to load config file"));
    }

    #[test]
    fn layers_apply_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = write(dir.path(), "appsettings.json", base_settings());
        write(
            dir.path(),
            "appsettings.Production.json",
            json!({ "OpenTelemetry": {
                "OTEL_SERVICE_NAME": "prod",
                "OTEL_RESOURCE_ATTRIBUTES": "env=prod"
            } }),
        );
        let env = vec![
            ("OpenTelemetry__OTEL_SERVICE_NAME".to_string(), "from-env".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];
        let overrides =
            vec!["--OpenTelemetry:OTEL_SAMPLER:OTEL_SAMPLER_NAME=AlwaysOff".to_string()];

        let tree = load_config_tree(&base, Some("Production"), env, &overrides).expect("tree");
        let settings = resolve_settings(&tree).expect("settings");
        assert_eq!(settings.service_name, "from-env");
        assert_eq!(settings.exporter_endpoint, "http://base:4317");
        assert_eq!(settings.resource_attributes.as_deref(), Some("env=prod"));
        assert_eq!(
            settings.sampler,
            Some(SamplerConfig {
                name: Some("AlwaysOff".into()),
                ratio: None,
            })
        );
        let root = tree.as_object().expect("object");
        assert!(lookup(root, "PATH").is_none());
    }

    #[test]
    fn command_line_beats_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = write(dir.path(), "appsettings.json", base_settings());
        let env = vec![(
            "OPENTELEMETRY__OTEL_SERVICE_NAME".to_string(),
            "from-env".to_string(),
        )];
        let overrides = vec!["/OpenTelemetry:OTEL_SERVICE_NAME=from-cli".to_string()];

        let tree = load_config_tree(&base, None, env, &overrides).expect("tree");
        assert_eq!(resolve_settings(&tree).expect("settings").service_name, "from-cli");
    }

    #[test]
    fn missing_environment_file_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = write(dir.path(), "appsettings.json", base_settings());
        let tree = load_config_tree(&base, Some("Staging"), Vec::new(), &[]).expect("tree");
        assert_eq!(resolve_settings(&tree).expect("settings").service_name, "base");
    }

    #[test]
    fn global_config_path_is_merged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let global = write(
            dir.path(),
            "global.json",
            json!({ "OpenTelemetry": { "OTEL_EXPORTER_OTLP_ENDPOINT": "http://global:4317" } }),
        );
        let mut settings = base_settings();
        settings["GlobalConfigPath"] = json!(global.display().to_string());
        let base = write(dir.path(), "appsettings.json", settings);

        let tree = load_config_tree(&base, None, Vec::new(), &[]).expect("tree");
        let settings = resolve_settings(&tree).expect("settings");
        assert_eq!(settings.exporter_endpoint, "http://global:4317");
        assert_eq!(settings.service_name, "base");
    }

    #[test]
    fn named_global_file_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = base_settings();
        let absent = dir.path().join("absent.json");
        settings["GlobalConfigPath"] = json!(absent.display().to_string());
        let base = write(dir.path(), "appsettings.json", settings);
        assert!(load_config_tree(&base, None, Vec::new(), &[]).is_err());
    }

    #[test]
    fn malformed_override_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = write(dir.path(), "appsettings.json", base_settings());
        let overrides = vec!["OpenTelemetry:OTEL_SERVICE_NAME".to_string()];
        assert!(load_config_tree(&base, None, Vec::new(), &overrides).is_err());
    }

    #[test]
    fn override_keys_use_the_environment_spelling() {
        let (key, value) =
            parse_override("--OpenTelemetry:OTEL_SAMPLER:OTEL_SAMPLER_NAME=AlwaysOn")
                .expect("override");
        assert_eq!(key, "opentelemetry.otel_sampler.otel_sampler_name");
        assert_eq!(value, "AlwaysOn");
    }

    #[test]
    fn case_variants_fold_with_lowercase_winning() {
        let tree = json!({
            "OpenTelemetry": {
                "OTEL_SERVICE_NAME": "file",
                "OTEL_EXPORTER_OTLP_ENDPOINT": "http://f:1"
            },
            "opentelemetry": { "otel_service_name": "env" }
        });
        let folded = fold_key_case(tree);
        assert_eq!(
            folded,
            json!({ "OpenTelemetry": {
                "OTEL_SERVICE_NAME": "env",
                "OTEL_EXPORTER_OTLP_ENDPOINT": "http://f:1"
            } })
        );
    }
}
