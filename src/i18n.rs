// i18n.rs — runtime string table for window title, overlay and messages
//
// - Strings live in assets/i18n/<lang>.json (flat { "key": "value" } maps)
// - English is compiled in and used for keys the selected language lacks
// - Lookup: tr("key") / tr_with("key", &[("name", ...)]) with {name} placeholders
//
// Language selection: --lang <code>, then UNWARP_LANG, then "en".

use once_cell::sync::{Lazy, OnceCell};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

pub const DEFAULT_LANG: &str = "en";
pub const LANG_ENV: &str = "UNWARP_LANG";

static BUILTIN: Lazy<HashMap<String, String>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../assets/i18n/en.json")).unwrap_or_else(|e| {
        log::error!("built-in string table is invalid: {e}");
        HashMap::new()
    })
});

#[derive(Debug, Clone)]
struct Table {
    lang: String,
    map: HashMap<String, String>,
}

static TABLE: OnceCell<RwLock<Table>> = OnceCell::new();

fn load_json_map(path: &Path) -> Option<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(map) => Some(map),
        Err(e) => {
            log::warn!("ignoring string table {}: {e}", path.display());
            None
        }
    }
}

/// assets/i18n/<lang>.json next to the executable, then under the working dir.
fn find_lang_file(lang: &str) -> Option<PathBuf> {
    let rel = Path::new("assets").join("i18n").join(format!("{lang}.json"));
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&rel)));

    beside_exe.into_iter().chain(Some(rel)).find(|p| p.exists())
}

/// Selects the active language. Later calls replace the table.
pub fn init(lang: impl Into<String>) {
    let lang = lang.into();
    let map = find_lang_file(&lang)
        .and_then(|p| load_json_map(&p))
        .unwrap_or_default();
    if map.is_empty() && lang != DEFAULT_LANG {
        log::warn!("no strings for language '{lang}', using built-in English");
    }

    let table = Table { lang, map };
    log::debug!("ui language {} ({} strings)", table.lang, table.map.len());
    match TABLE.get() {
        Some(lock) => {
            if let Ok(mut w) = lock.write() {
                *w = table;
            }
        }
        None => {
            let _ = TABLE.set(RwLock::new(table));
        }
    }
}

/// Localized text for `key`; the key itself when no table has it.
pub fn tr(key: &str) -> String {
    let selected = TABLE
        .get()
        .and_then(|l| l.read().ok().and_then(|t| t.map.get(key).cloned()));
    selected
        .or_else(|| BUILTIN.get(key).cloned())
        .unwrap_or_else(|| key.to_string())
}

/// Localized text with `{name}` placeholders substituted. Unknown
/// placeholders are left in place.
pub fn tr_with(key: &str, args: &[(&str, String)]) -> String {
    let mut s = tr(key);
    for (k, v) in args {
        s = s.replace(&format!("{{{k}}}"), v);
    }
    s
}

/// Language from the CLI flag, else the environment, else English.
pub fn resolve_lang(cli: Option<&str>) -> String {
    if let Some(lang) = cli.filter(|l| !l.trim().is_empty()) {
        return lang.to_string();
    }
    match std::env::var(LANG_ENV) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => DEFAULT_LANG.to_string(),
    }
}
