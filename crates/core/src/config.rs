use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Name of the optional configuration file in the installation root.
pub const CONFIG_FILE_NAME: &str = "athenaeum.toml";

const DEFAULT_CONTENT_DIR: &str = "content";
const DEFAULT_PREVIEWS_DIR: &str = "templates/static/previews";
const DEFAULT_STATE_FILE: &str = "sites.json";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ITEMS_PER_PAGE: usize = 4;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_ERROR_BACKOFF_SECS: u64 = 15;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_SETTLE_SECS: u64 = 5;
const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 60;
const DEFAULT_IMAGE_EXT: &str = "png";

/// Raw TOML configuration structure.
/// Every key is optional; missing keys fall back to the defaults below.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    paths: RawPaths,
    server: RawServer,
    monitor: RawMonitor,
    preview: RawPreview,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPaths {
    content_dir: Option<String>,
    previews_dir: Option<String>,
    state_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawServer {
    host: Option<String>,
    port: Option<u16>,
    items_per_page: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMonitor {
    poll_interval_secs: Option<u64>,
    error_backoff_secs: Option<u64>,
    shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPreview {
    width: Option<u32>,
    height: Option<u32>,
    settle_secs: Option<u64>,
    page_timeout_secs: Option<u64>,
    refresh_timeout_secs: Option<u64>,
    image_ext: Option<String>,
    chrome: Option<PathBuf>,
}

/// Validated configuration with every path resolved against the
/// installation root.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub root: PathBuf,
    pub paths: PathsConfig,
    pub server: ServerConfig,
    pub monitor: MonitorConfig,
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathsConfig {
    pub content_dir: PathBuf,
    pub previews_dir: PathBuf,
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub items_per_page: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Sleep after a failed tick; always longer than `poll_interval`
    pub error_backoff: Duration,
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewConfig {
    pub width: u32,
    pub height: u32,
    pub settle: Duration,
    pub page_timeout: Duration,
    pub refresh_timeout: Duration,
    pub image_ext: String,
    pub chrome: Option<PathBuf>,
}

impl Config {
    /// Defaults for an installation rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Config {
            paths: PathsConfig {
                content_dir: root.join(DEFAULT_CONTENT_DIR),
                previews_dir: root.join(DEFAULT_PREVIEWS_DIR),
                state_file: root.join(DEFAULT_STATE_FILE),
            },
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                items_per_page: DEFAULT_ITEMS_PER_PAGE,
            },
            monitor: MonitorConfig {
                poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
                error_backoff: Duration::from_secs(DEFAULT_ERROR_BACKOFF_SECS),
                shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            preview: PreviewConfig {
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
                settle: Duration::from_secs(DEFAULT_SETTLE_SECS),
                page_timeout: Duration::from_secs(DEFAULT_PAGE_TIMEOUT_SECS),
                refresh_timeout: Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS),
                image_ext: DEFAULT_IMAGE_EXT.to_string(),
                chrome: None,
            },
            root,
        }
    }
}

/// Load `athenaeum.toml` from `root`, or the defaults if the file does not exist.
pub fn load_config<P: AsRef<Path>>(root: P) -> Result<Config> {
    let root = root.as_ref();
    let config_path = root.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return build_config(root.to_path_buf(), RawConfig::default());
    }
    let content = fs::read_to_string(&config_path)?;
    parse_config_str(root, &content)
}

/// Parse configuration from a string (useful for testing)
pub fn parse_config_str<P: AsRef<Path>>(root: P, content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content)?;
    build_config(root.as_ref().to_path_buf(), raw)
}

fn build_config(root: PathBuf, raw: RawConfig) -> Result<Config> {
    let content_dir = resolve(&root, raw.paths.content_dir, DEFAULT_CONTENT_DIR, "paths.content_dir")?;
    let previews_dir = resolve(
        &root,
        raw.paths.previews_dir,
        DEFAULT_PREVIEWS_DIR,
        "paths.previews_dir",
    )?;
    let state_file = resolve(&root, raw.paths.state_file, DEFAULT_STATE_FILE, "paths.state_file")?;

    let items_per_page = raw.server.items_per_page.unwrap_or(DEFAULT_ITEMS_PER_PAGE);
    if items_per_page == 0 {
        return Err(Error::ConfigParse(
            "server.items_per_page must be greater than 0".to_string(),
        ));
    }

    let poll_interval = raw.monitor.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
    let error_backoff = raw.monitor.error_backoff_secs.unwrap_or(DEFAULT_ERROR_BACKOFF_SECS);
    let shutdown_timeout = raw.monitor.shutdown_timeout_secs.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS);
    if poll_interval == 0 || shutdown_timeout == 0 {
        return Err(Error::ConfigParse(
            "monitor intervals must be greater than 0".to_string(),
        ));
    }
    if error_backoff <= poll_interval {
        return Err(Error::ConfigParse(format!(
            "monitor.error_backoff_secs ({}) must be greater than monitor.poll_interval_secs ({})",
            error_backoff, poll_interval
        )));
    }

    let width = raw.preview.width.unwrap_or(DEFAULT_WIDTH);
    let height = raw.preview.height.unwrap_or(DEFAULT_HEIGHT);
    if width == 0 || height == 0 {
        return Err(Error::ConfigParse(format!(
            "Invalid preview viewport {}x{}",
            width, height
        )));
    }

    let image_ext = raw.preview.image_ext.unwrap_or_else(|| DEFAULT_IMAGE_EXT.to_string());
    if image_ext.is_empty() || !image_ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::ConfigParse(format!(
            "Invalid preview.image_ext '{}'",
            image_ext
        )));
    }

    let page_timeout = raw.preview.page_timeout_secs.unwrap_or(DEFAULT_PAGE_TIMEOUT_SECS);
    let refresh_timeout = raw.preview.refresh_timeout_secs.unwrap_or(DEFAULT_REFRESH_TIMEOUT_SECS);
    if page_timeout == 0 || refresh_timeout == 0 {
        return Err(Error::ConfigParse(
            "preview timeouts must be greater than 0".to_string(),
        ));
    }

    Ok(Config {
        paths: PathsConfig {
            content_dir,
            previews_dir,
            state_file,
        },
        server: ServerConfig {
            host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: raw.server.port.unwrap_or(DEFAULT_PORT),
            items_per_page,
        },
        monitor: MonitorConfig {
            poll_interval: Duration::from_secs(poll_interval),
            error_backoff: Duration::from_secs(error_backoff),
            shutdown_timeout: Duration::from_secs(shutdown_timeout),
        },
        preview: PreviewConfig {
            width,
            height,
            settle: Duration::from_secs(raw.preview.settle_secs.unwrap_or(DEFAULT_SETTLE_SECS)),
            page_timeout: Duration::from_secs(page_timeout),
            refresh_timeout: Duration::from_secs(refresh_timeout),
            image_ext,
            chrome: raw.preview.chrome,
        },
        root,
    })
}

fn resolve(root: &Path, value: Option<String>, default: &str, field_name: &str) -> Result<PathBuf> {
    let value = value.unwrap_or_else(|| default.to_string());
    Ok(root.join(validate_path(&value, field_name)?))
}

/// Validate a configured path and convert it to a PathBuf.
///
/// Configured paths must stay inside the installation root, so absolute
/// paths and `..` components are rejected.
fn validate_path(path_str: &str, field_name: &str) -> Result<PathBuf> {
    if path_str.trim().is_empty() {
        return Err(Error::ConfigParse(format!(
            "Empty path in '{}' field",
            field_name
        )));
    }

    let path = Path::new(path_str);
    if path.is_absolute() {
        return Err(Error::ConfigParse(format!(
            "Absolute paths not allowed in '{}': '{}'. Use relative paths only.",
            field_name, path_str
        )));
    }

    if path.components().any(|c| c == Component::ParentDir) {
        return Err(Error::ConfigParse(format!(
            "Parent directory references (..) not allowed in '{}': '{}'",
            field_name, path_str
        )));
    }

    Ok(path.to_path_buf())
}
