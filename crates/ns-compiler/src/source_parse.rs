use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ns_core::NsError;
use ns_parser::{parse_source_file, SourceFile};

use crate::FileDiagnostic;

#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub file: SourceFile,
    /// Include targets resolved to project paths, in directive order.
    pub includes: Vec<String>,
}

pub(crate) fn parse_sources(
    source_by_path: &BTreeMap<String, String>,
    diagnostics: &mut Vec<FileDiagnostic>,
) -> Result<BTreeMap<String, ParsedSource>, NsError> {
    let known: Vec<String> = source_by_path
        .keys()
        .map(|path| normalize_virtual_path(path))
        .collect();

    let mut sources = BTreeMap::new();
    for (raw_path, source_text) in source_by_path {
        let file_path = normalize_virtual_path(raw_path);
        if !is_script_source(&file_path) {
            return Err(NsError::new(
                "SOURCE_KIND_UNSUPPORTED",
                format!("Unsupported source extension: {}", file_path),
            ));
        }

        let parsed = parse_source_file(&file_path, source_text);
        let first_error = parsed
            .diagnostics
            .iter()
            .find(|diagnostic| diagnostic.is_error())
            .cloned();
        diagnostics.extend(parsed.diagnostics.into_iter().map(|diagnostic| FileDiagnostic {
            file: file_path.clone(),
            diagnostic,
        }));
        if let Some(error) = first_error {
            return Err(error.into_error(&file_path));
        }

        let includes = parsed
            .value
            .includes
            .iter()
            .map(|include| resolve_include_path(&file_path, &include.path, &known))
            .collect();
        sources.insert(
            file_path,
            ParsedSource {
                file: parsed.value,
                includes,
            },
        );
    }
    Ok(sources)
}

pub(crate) fn is_script_source(path: &str) -> bool {
    path.ends_with(".nss")
}

/// Includes are looked up next to the including file first, then from the
/// project root.
pub(crate) fn resolve_include_path(current_path: &str, include: &str, known: &[String]) -> String {
    let parent = match Path::new(current_path).parent() {
        Some(parent) => parent,
        None => Path::new(""),
    };
    let joined = if include.starts_with('/') {
        PathBuf::from(include)
    } else {
        parent.join(include)
    };
    let relative = normalize_virtual_path(joined.to_string_lossy().as_ref());
    if known.iter().any(|path| *path == relative) {
        return relative;
    }
    let rooted = normalize_virtual_path(include);
    if known.iter().any(|path| *path == rooted) {
        rooted
    } else {
        relative
    }
}

pub fn normalize_virtual_path(path: &str) -> String {
    let mut stack: Vec<String> = Vec::new();
    for part in path.replace('\\', "/").split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            if !stack.is_empty() {
                stack.pop();
            }
            continue;
        }
        stack.push(part.to_string());
    }
    stack.join("/")
}
