//! Layered settings: compiled defaults, then the JSON file, then `WIRELINK_*`
//! environment variables. Later layers win.

use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{FrameMode, TraceTiming, TransportSettings};

/// Default settings file, `~/.wirelink/settings.json`.
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".wirelink")
        .join("settings.json")
}

/// Load settings from [`settings_path`].
pub fn load_settings() -> Result<TransportSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings with `path` as the file layer.
///
/// A missing file leaves the defaults in place; an unreadable or malformed
/// one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TransportSettings> {
    let json_error = |source: serde_json::Error| SettingsError::Json {
        path: path.to_path_buf(),
        source,
    };

    let mut tree = serde_json::to_value(TransportSettings::default()).map_err(json_error)?;
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let file: Value = serde_json::from_str(&text).map_err(json_error)?;
            overlay(&mut tree, file);
            debug!(path = %path.display(), "settings file applied");
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    let mut settings: TransportSettings = serde_json::from_value(tree).map_err(json_error)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Lay `file` over `base` in place.
///
/// Objects combine key by key. Any other value, arrays included, replaces
/// what was there. `null` keeps the base value.
pub fn overlay(base: &mut Value, file: Value) {
    match (base, file) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(file)) => {
            for (key, value) in file {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (base, file) => *base = file,
    }
}

/// Reject combinations the transport cannot run with.
pub fn validate(settings: &TransportSettings) -> Result<()> {
    let invalid = |key: &'static str, reason: &'static str| -> Result<()> {
        Err(SettingsError::InvalidValue { key, reason })
    };
    if settings.connect_timeout_ms == 0 {
        return invalid("connectTimeoutMs", "must be positive");
    }
    if settings.keepalive_ms == 1 {
        return invalid("keepaliveMs", "must be 0 (off) or at least 2");
    }
    if settings.tls.cert_path.is_some() != settings.tls.key_path.is_some() {
        return invalid("tls", "certPath and keyPath must be set together");
    }
    Ok(())
}

/// Apply `WIRELINK_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut TransportSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply `WIRELINK_*` overrides resolved through `lookup`.
///
/// A value that does not parse, or falls outside its range, is skipped with
/// a warning and the setting keeps its previous value.
pub fn apply_overrides(settings: &mut TransportSettings, lookup: impl Fn(&str) -> Option<String>) {
    let vars = Overrides { lookup };

    if let Some(on) = vars.flag("WIRELINK_LISTEN") {
        settings.listen = on;
    }
    if let Some(on) = vars.flag("WIRELINK_REGISTER_HTTP") {
        settings.register_http = on;
    }
    if let Some(on) = vars.flag("WIRELINK_REGISTER_HTTPS") {
        settings.register_https = on;
    }
    if let Some(host) = vars.text("WIRELINK_HOST") {
        settings.host = host;
    }
    if let Some(port) = vars.number("WIRELINK_HTTP_PORT", 0..=u16::MAX) {
        settings.http_port = port;
    }
    if let Some(port) = vars.number("WIRELINK_HTTPS_PORT", 0..=u16::MAX) {
        settings.https_port = port;
    }
    if let Some(ms) = vars.number("WIRELINK_CONNECT_TIMEOUT_MS", 1..=600_000) {
        settings.connect_timeout_ms = ms;
    }
    if let Some(ms) = vars.number("WIRELINK_KEEPALIVE_MS", 0..=3_600_000) {
        settings.keepalive_ms = ms;
    }
    if let Some(on) = vars.flag("WIRELINK_KEEPALIVE_INBOUND") {
        settings.keepalive_inbound = on;
    }
    if let Some(binary) = vars.flag("WIRELINK_BINARY_FRAMES") {
        settings.frame_mode = if binary {
            FrameMode::Binary
        } else {
            FrameMode::Text
        };
    }
    if let Some(mode) = vars.parsed("WIRELINK_TRACE_TIMING", TraceTiming::parse) {
        settings.trace_timing = mode;
    }
    if let Some(cert) = vars.text("WIRELINK_TLS_CERT") {
        settings.tls.cert_path = Some(cert.into());
    }
    if let Some(key) = vars.text("WIRELINK_TLS_KEY") {
        settings.tls.key_path = Some(key.into());
    }
}

struct Overrides<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Overrides<F> {
    /// Non-empty string value.
    fn text(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let raw = (self.lookup)(key)?;
        let value = parse(raw.trim());
        if value.is_none() {
            warn!(key, value = %raw, "ignoring unusable override");
        }
        value
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.parsed(key, parse_flag)
    }

    fn number<T: FromStr + PartialOrd>(&self, key: &str, range: RangeInclusive<T>) -> Option<T> {
        self.parsed(key, |raw| parse_in_range(raw, &range))
    }
}

/// `1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off`, any case.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and keep it only if `range` contains it.
pub fn parse_in_range<T: FromStr + PartialOrd>(raw: &str, range: &RangeInclusive<T>) -> Option<T> {
    raw.parse().ok().filter(|n| range.contains(n))
}
