//! # wirelink-settings
//!
//! Configuration for the wirelink WebSocket transport.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`TransportSettings::default()`]
//! 2. **Settings file** — JSON, overlaid key by key on the defaults
//! 3. **Environment variables** — `WIRELINK_*` overrides (highest priority)
//!
//! Settings are read once and handed to the transport as a value; nothing in
//! the transport consults global state.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, load_settings, load_settings_from_path, overlay,
    settings_path, validate,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let settings = TransportSettings::default();
        assert!(validate(&settings).is_ok());
        assert!(settings_path().ends_with("settings.json"));
    }
}
