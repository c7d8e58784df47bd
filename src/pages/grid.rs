//! App grid page ("Discover" and "Library").

use tiwut_store::AppRecord;

const COLUMNS: usize = 3;
const CARD_WIDTH: usize = 26;

/// Lay apps out as cards, `COLUMNS` per row. Installed apps carry a check mark.
pub fn render(title: &str, apps: &[AppRecord], is_installed: impl Fn(&AppRecord) -> bool) -> String {
    let mut out = format!("== {} ({}) ==\n", title, apps.len());

    if apps.is_empty() {
        out.push_str("  No apps found.\n");
        return out;
    }

    for row in apps.chunks(COLUMNS) {
        let line: String = row
            .iter()
            .map(|app| card(app, is_installed(app)))
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

fn card(app: &AppRecord, installed: bool) -> String {
    let mark = if installed { "[x]" } else { "[ ]" };
    let mut name: String = app.name.chars().take(CARD_WIDTH - 4).collect();
    if name.chars().count() < app.name.chars().count() {
        name.pop();
        name.push('~');
    }
    format!("{mark} {name:<width$}", width = CARD_WIDTH - 4)
}
