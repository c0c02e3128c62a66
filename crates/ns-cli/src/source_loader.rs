use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ns_core::NsError;
use walkdir::WalkDir;

use crate::{map_cli_source_path, map_cli_source_read, map_cli_source_scan};

pub(crate) const SOURCE_EXTENSION: &str = "nss";

pub(crate) fn resolve_scripts_dir(scripts_dir: &str) -> Result<PathBuf, NsError> {
    let path = PathBuf::from(scripts_dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(NsError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("scripts-dir does not exist: {}", absolute.display()),
        ));
    }
    if !absolute.is_dir() {
        return Err(NsError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("scripts-dir is not a directory: {}", absolute.display()),
        ));
    }
    Ok(absolute)
}

/// Reads every `.nss` file below `scripts_dir`, keyed by its `/`-separated
/// path relative to the directory.
pub(crate) fn read_sources_from_dir(scripts_dir: &Path) -> Result<BTreeMap<String, String>, NsError> {
    let mut sources = BTreeMap::new();

    for entry in WalkDir::new(scripts_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(SOURCE_EXTENSION) {
            continue;
        }

        let relative = path
            .strip_prefix(scripts_dir)
            .map_err(map_cli_source_scan)?
            .to_string_lossy()
            .replace('\\', "/");
        let content = fs::read_to_string(path).map_err(map_cli_source_read)?;
        sources.insert(relative, content);
    }

    if sources.is_empty() {
        return Err(NsError::new(
            "CLI_SOURCE_EMPTY",
            format!("No .nss files under {}", scripts_dir.display()),
        ));
    }
    Ok(sources)
}

pub(crate) fn load_sources(scripts_dir: &str) -> Result<BTreeMap<String, String>, NsError> {
    let root = resolve_scripts_dir(scripts_dir)?;
    read_sources_from_dir(&root)
}
