//! Canonical resource paths.
//!
//! Resource paths are `/`-separated, case-sensitive and relative. Filesystem
//! files and archive entries are mapped into one shared namespace, so both
//! `\` and `/` are accepted as separators on input and `./` noise is
//! stripped.

use crate::error::{ErrorKind, Result};

/// Normalize a resource path into its canonical form.
///
/// Ensures that paths don't escape the namespace root (no `..` traversal past
/// the first component). Null bytes are explicitly rejected, as are paths that
/// normalize to nothing.
///
/// # Examples
///
/// ```
/// use quarry_storage::path::normalize;
/// assert_eq!(normalize("./textures//grass.png").unwrap(), "textures/grass.png");
/// assert_eq!(normalize("models\\tree.mesh").unwrap(), "models/tree.mesh");
/// assert_eq!(normalize("a/../b/c.txt").unwrap(), "b/c.txt");
/// assert!(normalize("../etc/passwd").is_err());
/// assert!(normalize("./").is_err());
/// ```
pub fn normalize(path: &str) -> Result<String> {
    if path.contains('\0') {
        exn::bail!(ErrorKind::InvalidPath(path.replace('\0', "\\0")));
    }
    let mut components: Vec<&str> = Vec::new();
    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {},
            ".." => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_string()));
                }
            },
            other => components.push(other),
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.to_string())),
        false => Ok(components.join("/")),
    }
}

/// Join two canonical paths. Either side may be empty.
pub fn cat_path(root: &str, child: &str) -> String {
    match (root.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (false, true) => root.to_string(),
        (false, false) => format!("{root}/{child}"),
    }
}

/// The final component of a path.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Lowercased extension of the final path component, without the dot.
///
/// Dotfiles (`.hidden`) have no extension, matching how the standard library
/// treats them.
pub fn extension(path: &str) -> String {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => name[idx + 1..].to_ascii_lowercase(),
    }
}

/// Strip one extension from the final component, if there is one.
pub fn without_extension(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => path,
        Some(idx) => &path[..path.len() - (name.len() - idx)],
    }
}

/// Append `.ext` to a path; the existing extension (if any) is kept.
pub fn add_extension(path: &str, ext: &str) -> String {
    match ext.is_empty() {
        true => path.to_string(),
        false => format!("{path}.{ext}"),
    }
}
