//! Catalog parsing.
//!
//! The catalog is plain text, one app per line:
//! `name;downloadURL;websiteURL[;iconURL]`

use std::path::{Component, Path};

/// One installable app, parsed from a catalog line.
/// Apps are identified by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppRecord {
    pub name: String,
    pub download_url: String,
    pub website_url: String,
    /// Empty when the catalog line has no fourth field.
    pub icon_url: String,
}

impl AppRecord {
    pub fn has_icon(&self) -> bool {
        !self.icon_url.is_empty()
    }

    pub fn has_website(&self) -> bool {
        !self.website_url.is_empty()
    }
}

/// Whether `name` can be used as an install directory name: exactly one
/// plain path component, no separators, never `.` or `..`.
pub fn is_valid_app_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Parse a single catalog line. Lines with fewer than three fields, or whose
/// name is not a valid directory name, yield `None`.
pub fn parse_line(line: &str) -> Option<AppRecord> {
    let mut fields = line.trim().split(';').map(str::trim);

    let name = fields.next().filter(|name| is_valid_app_name(name))?;
    let download_url = fields.next()?;
    let website_url = fields.next()?;
    let icon_url = fields.next().unwrap_or_default();

    Some(AppRecord {
        name: name.to_string(),
        download_url: download_url.to_string(),
        website_url: website_url.to_string(),
        icon_url: icon_url.to_string(),
    })
}

/// Parse a full catalog payload, keeping input order.
/// Blank and malformed lines are skipped silently.
pub fn parse_catalog(text: &str) -> Vec<AppRecord> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(parse_line)
        .collect()
}

/// Case-insensitive substring match on app names. An empty term keeps everything.
pub fn filter_apps(apps: &[AppRecord], term: &str) -> Vec<AppRecord> {
    let term = term.trim().to_lowercase();
    apps.iter()
        .filter(|app| term.is_empty() || app.name.to_lowercase().contains(&term))
        .cloned()
        .collect()
}
