//! App details page.

use tiwut_store::{AppRecord, Icon};

/// Everything the details page shows about one app.
pub struct Details<'a> {
    pub app: &'a AppRecord,
    pub installed: bool,
    pub icon: Option<&'a Icon>,
}

pub fn render(details: &Details<'_>) -> String {
    let app = details.app;
    let mut out = format!("== {} ==\n", app.name);

    let status = if details.installed {
        "Installed"
    } else {
        "Not installed"
    };
    out.push_str(&format!("  Status:   {}\n", status));

    let website = if app.has_website() {
        app.website_url.as_str()
    } else {
        "No website provided for this application."
    };
    out.push_str(&format!("  Website:  {}\n", website));
    out.push_str(&format!("  Download: {}\n", app.download_url));

    let icon = match details.icon {
        Some(icon) => format!("{}x{}", icon.width, icon.height),
        None if app.has_icon() => "unavailable".to_string(),
        None => "none".to_string(),
    };
    out.push_str(&format!("  Icon:     {}\n", icon));

    let actions = if details.installed {
        "launch, uninstall, shortcut"
    } else {
        "install"
    };
    let actions = if app.has_website() {
        format!("{}, website", actions)
    } else {
        actions.to_string()
    };
    out.push_str(&format!("  Actions:  {}\n", actions));
    out
}
