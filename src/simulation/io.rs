use std::path::{Path, PathBuf};

pub fn resolve_path(config_path: &Option<PathBuf>, file_path: &Path) -> PathBuf {
    // Paths starting with "./" are taken relative to the working directory, not the config file.
    if file_path.is_absolute() || file_path.starts_with("./") {
        return file_path.to_path_buf();
    }

    if let Some(path) = config_path.as_ref().and_then(|c| c.parent()) {
        path.join(file_path)
    } else {
        file_path.to_path_buf()
    }
}

pub fn is_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}
