// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./reverie.toml` > `~/.config/reverie/reverie.toml`
//! with environment variable overrides via `REVERIE_` prefix.

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ReverieConfig;

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `~/.config/reverie/reverie.toml` (user XDG config)
/// 3. `./reverie.toml` (local directory)
/// 4. `REVERIE_*` environment variables
pub fn load_config() -> Result<ReverieConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReverieConfig::default()))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("reverie/reverie.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("reverie.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no file lookup).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ReverieConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReverieConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ReverieConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ReverieConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Environment variable provider: `REVERIE_<SECTION>__<KEY>` maps to `section.key`.
///
/// Uses a double-underscore separator so underscore-containing key names
/// like `debounce_ms` survive the mapping (`REVERIE_EXTRACTION__DEBOUNCE_MS`).
fn env_provider() -> Env {
    Env::prefixed("REVERIE_").split("__")
}
