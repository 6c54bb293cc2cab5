//! Filesystem locations.
//!
//! The data directory holds the span file and, unless configured otherwise,
//! the SQLite database. It is resolved in this order:
//!
//! 1. `MOLONARI_DATA_DIR`
//! 2. `$XDG_DATA_HOME/molonari`
//! 3. `$HOME/.local/share/molonari`
//! 4. `./molonari-data`

use std::path::PathBuf;

/// Returns the default data directory from the process environment.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    resolve_data_dir(|key| std::env::var(key).ok())
}

/// Resolves the data directory from an environment lookup.
pub fn resolve_data_dir(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    let set = |key: &str| env(key).filter(|value| !value.is_empty());

    if let Some(dir) = set("MOLONARI_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = set("XDG_DATA_HOME") {
        return PathBuf::from(dir).join("molonari");
    }
    if let Some(home) = set("HOME") {
        return PathBuf::from(home).join(".local/share/molonari");
    }
    PathBuf::from("molonari-data")
}

/// Expands a leading `~` using `home`.
///
/// # Examples
///
/// ```
/// use molonari::infrastructure::expand_tilde;
///
/// assert_eq!(expand_tilde("~/data/site.sqlite", Some("/home/ana")), "/home/ana/data/site.sqlite");
/// assert_eq!(expand_tilde("~", Some("/home/ana")), "/home/ana");
/// assert_eq!(expand_tilde("/srv/site.sqlite", Some("/home/ana")), "/srv/site.sqlite");
/// assert_eq!(expand_tilde("~/site.sqlite", None), "~/site.sqlite");
/// ```
#[must_use]
pub fn expand_tilde(path: &str, home: Option<&str>) -> String {
    match home {
        Some(home) if path == "~" => home.to_string(),
        Some(home) if path.starts_with("~/") => path.replacen('~', home, 1),
        _ => path.to_string(),
    }
}
