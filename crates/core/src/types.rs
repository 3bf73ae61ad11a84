use chrono::{Local, TimeZone};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// URL prefix under which preview images are served.
pub const PREVIEW_URL_PREFIX: &str = "/static/previews";

/// Entry page every site is expected to have at its root.
pub const ENTRY_PAGE: &str = "index.html";

/// Characters escaped when a site name is used as a URL path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// URL path segment for a site name
pub fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// One discovered site directory.
///
/// Field names match the persisted `sites.json` layout, so `preview_ref`
/// is stored under the `preview` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "preview", default)]
    pub preview_ref: String,
    /// Newest file mtime under `path`, seconds since the epoch (0 if unknown)
    #[serde(default)]
    pub last_modified: f64,
}

impl SiteRecord {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, image_ext: &str, last_modified: f64) -> Self {
        let name = name.into();
        Self {
            preview_ref: preview_ref_for(&name, image_ext),
            name,
            path: path.into(),
            last_modified,
        }
    }

    /// Path of the site's `index.html`
    pub fn entry_page(&self) -> PathBuf {
        self.path.join(ENTRY_PAGE)
    }

    pub fn has_entry_page(&self) -> bool {
        self.entry_page().is_file()
    }

    /// Where this site's preview image lives inside `previews_dir`
    pub fn preview_file(&self, previews_dir: &Path, image_ext: &str) -> PathBuf {
        preview_file_for(previews_dir, &self.name, image_ext)
    }
}

/// Logical URL of a site's preview image, derived from the site name only.
pub fn preview_ref_for(name: &str, image_ext: &str) -> String {
    format!("{}/{}.{}", PREVIEW_URL_PREFIX, encode_segment(name), image_ext)
}

pub fn preview_file_for(previews_dir: &Path, name: &str, image_ext: &str) -> PathBuf {
    previews_dir.join(format!("{}.{}", name, image_ext))
}

/// Seconds since the Unix epoch as a float, the unit used for every
/// timestamp in the registry.
pub fn epoch_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub fn now_epoch_seconds() -> f64 {
    epoch_seconds(SystemTime::now())
}

/// The ordered collection of all known sites plus the time of the last
/// successful reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub sites: Vec<SiteRecord>,
    #[serde(default)]
    pub last_update: f64,
}

impl RegistrySnapshot {
    pub fn names(&self) -> BTreeSet<String> {
        self.sites.iter().map(|s| s.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&SiteRecord> {
        self.sites.iter().find(|s| s.name == name)
    }

    /// `last_update` formatted for display in local time, `N/A` if the
    /// registry was never reconciled.
    pub fn last_update_display(&self) -> String {
        format_timestamp(self.last_update)
    }
}

/// Format epoch seconds as `%Y-%m-%d %H:%M:%S` in local time.
pub fn format_timestamp(secs: f64) -> String {
    if secs <= 0.0 || !secs.is_finite() {
        return "N/A".to_string();
    }
    match Local.timestamp_opt(secs as i64, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "N/A".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Success,
    Timeout,
    Error,
}

/// Body returned to a user who asked for an explicit refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub status: RefreshStatus,
    pub message: String,
    pub changes_count: usize,
}

impl RefreshResponse {
    pub fn success(changes_count: usize) -> Self {
        let message = if changes_count > 0 {
            format!("Changes detected: {}", changes_count)
        } else {
            "No changes found".to_string()
        };
        Self {
            status: RefreshStatus::Success,
            message,
            changes_count,
        }
    }

    pub fn timeout() -> Self {
        Self {
            status: RefreshStatus::Timeout,
            message: "Timed out waiting for the update".to_string(),
            changes_count: 0,
        }
    }

    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self {
            status: RefreshStatus::Error,
            message: format!("Update failed: {}", reason),
            changes_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_ref_derived_from_name() {
        let site = SiteRecord::new("blog", "/srv/content/blog", "png", 0.0);
        assert_eq!(site.preview_ref, "/static/previews/blog.png");
        assert_eq!(
            site.preview_file(Path::new("/srv/previews"), "png"),
            PathBuf::from("/srv/previews/blog.png")
        );
    }

    #[test]
    fn test_preview_ref_escapes_reserved_characters() {
        let site = SiteRecord::new("c#1 ?%", "/srv/content/c#1 ?%", "png", 0.0);
        assert_eq!(site.preview_ref, "/static/previews/c%231%20%3F%25.png");
        assert_eq!(
            site.preview_file(Path::new("/srv/previews"), "png"),
            PathBuf::from("/srv/previews/c#1 ?%.png")
        );
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("my site"), "my%20site");
        assert_eq!(encode_segment("plain-name_1.0"), "plain-name_1.0");
        assert_eq!(encode_segment("a#b?c"), "a%23b%3Fc");
    }

    #[test]
    fn test_snapshot_reads_legacy_layout() {
        let json = r#"{
            "sites": [
                {"name": "a", "path": "/c/a", "preview": "/static/previews/a.png", "last_modified": 1700000000.5, "extra": true}
            ],
            "last_update": 1700000100,
            "version": "1.0"
        }"#;
        let snapshot: RegistrySnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.sites.len(), 1);
        assert_eq!(snapshot.sites[0].name, "a");
        assert_eq!(snapshot.sites[0].last_modified, 1700000000.5);
        assert_eq!(snapshot.last_update, 1700000100.0);
    }

    #[test]
    fn test_snapshot_missing_fields_default() {
        let snapshot: RegistrySnapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.sites.is_empty());
        assert_eq!(snapshot.last_update, 0.0);

        let site: SiteRecord = serde_json::from_str(r#"{"name": "x", "path": "/x"}"#).unwrap();
        assert_eq!(site.last_modified, 0.0);
    }

    #[test]
    fn test_site_record_serializes_preview_key() {
        let site = SiteRecord::new("a", "/c/a", "png", 10.0);
        let value = serde_json::to_value(&site).unwrap();
        assert_eq!(value["preview"], "/static/previews/a.png");
        assert!(value.get("preview_ref").is_none());
    }

    #[test]
    fn test_format_timestamp_never_updated() {
        assert_eq!(format_timestamp(0.0), "N/A");
        assert_eq!(format_timestamp(f64::NAN), "N/A");
        assert_eq!(format_timestamp(1_700_000_000.0).len(), 19);
    }

    #[test]
    fn test_refresh_response_messages() {
        assert_eq!(RefreshResponse::success(0).message, "No changes found");
        assert_eq!(RefreshResponse::success(3).changes_count, 3);

        let timeout = serde_json::to_value(RefreshResponse::timeout()).unwrap();
        assert_eq!(timeout["status"], "timeout");
        assert_eq!(timeout["changes_count"], 0);

        let error = RefreshResponse::error("disk on fire");
        assert_eq!(error.status, RefreshStatus::Error);
        assert!(error.message.contains("disk on fire"));
    }

    #[test]
    fn test_names_sorted() {
        let snapshot = RegistrySnapshot {
            sites: vec![
                SiteRecord::new("b", "/c/b", "png", 0.0),
                SiteRecord::new("a", "/c/a", "png", 0.0),
            ],
            last_update: 0.0,
        };
        let names: Vec<_> = snapshot.names().into_iter().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(snapshot.get("b").is_some());
        assert!(snapshot.get("c").is_none());
    }
}
