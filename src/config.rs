use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Corrigenda";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    "info,corrigenda=debug".to_string()
}

/// Get the application data directory
/// ~/Corrigenda/ on all platforms (user-visible, per design requirement)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Corrigenda")
}

/// Element-stream dumps from the extraction collaborator
pub fn elements_dir() -> PathBuf {
    app_data_dir().join("elements")
}

/// Correction files, one per (law, version)
pub fn corrections_dir() -> PathBuf {
    app_data_dir().join("corrections")
}

/// Batch progress records
pub fn progress_dir() -> PathBuf {
    app_data_dir().join("progress")
}
