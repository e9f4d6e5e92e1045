//! Site configuration module.
//!
//! Handles loading and validating `site.toml`, the single configuration
//! document at the project root. The file is read once at process start and
//! is immutable for the rest of the invocation.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! format = true               # Pretty output (false = compressed HTML/CSS)
//! url = ""                    # Base URL used when rewriting for relative mode
//! is_relative = false         # Rewrite root-relative asset URLs on release
//! is_protect = false          # Enable password protection in templates
//! # protect_password = "..."  # Required for protection to take effect
//!
//! [data]                      # Free-form values exposed to templates as `site.*`
//!
//! [scripts]
//! bundler = []                # Command that prints the bundle to stdout; `{entry}` is substituted
//!
//! [images]
//! quality = 80                # JPEG re-encoding quality (1-100)
//!
//! [favicon]
//! app_name = ""
//! background = "#ffffff"
//! theme_color = "#ffffff"
//! path = "/"
//! sizes = [16, 32, 48, 192, 512]
//!
//! [server]
//! port = 3000
//! open = true
//! ```
//!
//! ## Derived Values
//!
//! Some values are not configured directly but computed from the
//! configuration: see [`DerivedValues`]. They are computed once per run and
//! passed by reference next to the config, never written back into it.
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name of the site configuration at the project root.
pub const CONFIG_FILE: &str = "site.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading site.toml: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `site.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Pretty (expanded) output when true, compressed output when false.
    pub format: bool,
    /// Base URL of the deployed site, used by relative-mode rewriting.
    pub url: String,
    /// Rewrite root-relative asset references to `url` on release.
    pub is_relative: bool,
    /// Enable template-level password protection on release builds.
    pub is_protect: bool,
    /// Password used by protected pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protect_password: Option<String>,
    /// Free-form values exposed to templates.
    pub data: toml::Table,
    pub scripts: ScriptsConfig,
    pub images: ImagesConfig,
    pub favicon: FaviconConfig,
    pub server: ServerConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            format: true,
            url: String::new(),
            is_relative: false,
            is_protect: false,
            protect_password: None,
            data: toml::Table::new(),
            scripts: ScriptsConfig::default(),
            images: ImagesConfig::default(),
            favicon: FaviconConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_relative && self.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "is_relative requires a non-empty url".into(),
            ));
        }
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if let Some(size) = self.favicon.sizes.iter().find(|s| **s == 0 || **s > 1024) {
            return Err(ConfigError::Validation(format!(
                "favicon.sizes entries must be 1-1024, got {size}"
            )));
        }
        if self.favicon.sizes.is_empty() {
            return Err(ConfigError::Validation(
                "favicon.sizes must not be empty".into(),
            ));
        }
        if let Some(program) = self.scripts.bundler.first()
            && program.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "scripts.bundler must start with a program name".into(),
            ));
        }
        Ok(())
    }
}

/// Script bundling settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptsConfig {
    /// Bundler command line. The bundle is read from the command's stdout.
    /// `{entry}` is replaced with the absolute path of the entry script.
    /// When empty, the entry script is copied as-is.
    pub bundler: Vec<String>,
}

/// Image optimization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// JPEG encoding quality (1 = worst, 100 = best).
    pub quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { quality: 80 }
    }
}

/// Favicon generator options.
///
/// Beyond icon generation these feed the web app manifest written next to
/// the icons.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaviconConfig {
    pub app_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_short_name: Option<String>,
    pub app_description: String,
    pub background: String,
    pub theme_color: String,
    /// URL prefix under which the icons are served.
    pub path: String,
    /// Square PNG sizes to generate as `favicon-NxN.png`.
    pub sizes: Vec<u32>,
    /// Also write `apple-touch-icon.png` (180x180).
    pub apple_touch: bool,
    /// Also write `favicon.ico` (48x48).
    pub ico: bool,
    /// Also write the `manifest.json` web app manifest.
    pub manifest: bool,
}

impl Default for FaviconConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            app_short_name: None,
            app_description: String::new(),
            background: "#ffffff".to_string(),
            theme_color: "#ffffff".to_string(),
            path: "/".to_string(),
            sizes: vec![16, 32, 48, 192, 512],
            apple_touch: true,
            ico: true,
            manifest: true,
        }
    }
}

/// Preview server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
    /// Open a browser on the preview URL when serving.
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            open: true,
        }
    }
}

// =============================================================================
// Derived values
// =============================================================================

/// Values computed from [`SiteConfig`] once per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedValues {
    /// Password protection is active for this run.
    pub protect: bool,
    /// `url` with trailing slashes removed. `None` when no url is configured.
    pub base_url: Option<String>,
}

impl DerivedValues {
    /// Compute derived values.
    ///
    /// `publishing` is true for the release entry points; protection only
    /// applies to publishable output, never to local previews.
    pub fn compute(config: &SiteConfig, publishing: bool) -> Self {
        let has_password = config
            .protect_password
            .as_deref()
            .is_some_and(|p| !p.is_empty());
        Self {
            protect: publishing && config.is_protect && has_password,
            base_url: strip_base_url(&config.url),
        }
    }
}

/// Strip trailing slashes from a base URL. Empty input yields `None`.
pub fn strip_base_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `site.toml` from the project root.
///
/// A missing file yields the stock defaults. User values are merged on top of
/// the defaults, unknown keys are rejected, and the result is validated.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let config_path = root.join(CONFIG_FILE);
    let base = stock_defaults_value()?;
    let merged = if config_path.exists() {
        let content = fs::read_to_string(&config_path)?;
        let overlay: toml::Value = toml::from_str(&content)?;
        merge_toml(base, overlay)
    } else {
        base
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `site.toml`.
///
/// Used by `--gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# sitepipe configuration
# ======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Pretty output. Set to false for compressed HTML and CSS.
format = true

# Base URL of the deployed site. Required when is_relative = true.
url = ""

# Rewrite root-relative src/href/url() references to `url` on release.
is_relative = false

# Password protection for release builds. Takes effect only when a
# password is set as well; templates read it as `site.protect`.
is_protect = false
# protect_password = "secret"

# ---------------------------------------------------------------------------
# Template data, available as site.<key>
# ---------------------------------------------------------------------------
[data]
# title = "My Site"

# ---------------------------------------------------------------------------
# Scripts
# ---------------------------------------------------------------------------
[scripts]
# Bundler command. It must print the bundle to stdout; {entry} is replaced
# with the path of src/scripts/entry.js. Leave empty to copy the entry as-is.
# bundler = ["esbuild", "{entry}", "--bundle", "--minify"]
bundler = []

# ---------------------------------------------------------------------------
# Image optimization (release only)
# ---------------------------------------------------------------------------
[images]
# JPEG quality, 1-100. PNGs are recompressed losslessly.
quality = 80

# ---------------------------------------------------------------------------
# Favicons (release only), generated from src/favicon.*
# ---------------------------------------------------------------------------
[favicon]
app_name = ""
app_description = ""
background = "#ffffff"
theme_color = "#ffffff"
path = "/"
sizes = [16, 32, 48, 192, 512]
apple_touch = true
ico = true
manifest = true

# ---------------------------------------------------------------------------
# Preview server (serve)
# ---------------------------------------------------------------------------
[server]
port = 3000
open = true
"##
}
