//! Destination path resolution
//!
//! Pure string helpers: the remote location of an upload, its ancestor
//! directories, and the public URL handed back to the caller.

/// Combine a working directory, a path prefix and a logical name into the
/// destination path.
///
/// With an empty `dir` the result is `prefix/name`. Otherwise the trailing
/// slashes of `dir` and the leading slashes of `prefix/name` are stripped so
/// the join point carries exactly one `/`.
pub fn resolve(dir: &str, path_prefix: &str, name: &str) -> String {
    let stored = format!("{path_prefix}/{name}");
    if dir.is_empty() {
        return stored;
    }

    format!(
        "{}/{}",
        dir.trim_end_matches('/'),
        stored.trim_start_matches('/')
    )
}

/// Build the public URL for an uploaded name.
///
/// The working directory is not part of the URL; see DESIGN.md.
pub fn public_url(url_prefix: &str, path_prefix: &str, name: &str) -> String {
    format!("{url_prefix}{path_prefix}/{name}")
}

/// Parent directory of a remote path, or `None` when the path has no parent
/// segment (a bare name or a file directly under `/`).
pub fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let (parent, _) = trimmed.rsplit_once('/')?;
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() || parent == "." {
        None
    } else {
        Some(parent)
    }
}

/// Every ancestor of `dir` from the shallowest down, including `dir` itself.
///
/// `"/srv/files/a"` yields `["/srv", "/srv/files", "/srv/files/a"]`;
/// relative input stays relative. Empty segments from repeated slashes are
/// skipped.
pub fn ancestors(dir: &str) -> Vec<String> {
    let absolute = dir.starts_with('/');
    let mut current = String::new();
    let mut out = Vec::new();

    for segment in dir.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(segment);
        out.push(current.clone());
    }

    out
}
