//! Path helpers shared by entry registration and dependency resolution.

use std::path::{Component, Path, PathBuf};

/// Extension appended to requests whose file name has none.
pub const DEFAULT_EXTENSION: &str = ".js";

/// Lexically normalizes a path, folding `.` and `..` components.
///
/// Does not touch the file system, so the path does not need to exist.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` above the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

/// Computes the registry id of `resource`: `"./"` followed by its
/// `/`-separated path relative to `context`.
pub fn module_id(context: &Path, resource: &Path) -> String {
    let relative = pathdiff::diff_paths(resource, context).unwrap_or_else(|| resource.to_path_buf());
    let segments: Vec<_> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy()),
            Component::ParentDir => Some("..".into()),
            _ => None,
        })
        .collect();
    format!("./{}", segments.join("/"))
}

/// Returns the file name a request points at: its last `/` segment, with
/// `default_extension` appended when that segment contains no `.`.
pub fn request_file_name(request: &str, default_extension: &str) -> String {
    let name = request.rsplit('/').next().unwrap_or(request);
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{name}{default_extension}")
    }
}

/// Resolves a request made from a module living in `base_dir` to an
/// absolute, normalized file path.
///
/// Only the request's file name takes part: directory segments of the
/// request are dropped, so every request resolves to a sibling of the
/// requesting module.
pub fn resolve_request(base_dir: &Path, request: &str, default_extension: &str) -> PathBuf {
    normalize_path(&base_dir.join(request_file_name(request, default_extension)))
}
