use std::path::PathBuf;

const APP_DIR: &str = "nowplaying";

/// Directory for the log file.
pub fn data_dir() -> PathBuf {
    app_dir(&[".local", "share"], dirs::data_local_dir)
}

/// Directory holding `config.toml` and the optional `stations.toml`.
pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(dir) = portable_dir() {
            return dir;
        }
    }
    app_dir(&[".config"], dirs::config_dir)
}

/// `~/<home_subdir>/nowplaying` on unix (macOS included, XDG-style),
/// `<platform_dir>/nowplaying` elsewhere.
fn app_dir(home_subdir: &[&str], platform_dir: fn() -> Option<PathBuf>) -> PathBuf {
    let base = if cfg!(unix) {
        dirs::home_dir().map(|home| home_subdir.iter().fold(home, |dir, part| dir.join(part)))
    } else {
        platform_dir()
    };
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

/// A `config.toml` beside the executable marks a portable install.
#[cfg(windows)]
fn portable_dir() -> Option<PathBuf> {
    let exe_dir = std::env::current_exe().ok()?.parent()?.to_path_buf();
    exe_dir.join("config.toml").exists().then_some(exe_dir)
}
