//! Lexical path handling
//!
//! Paths stored on PersistentVolumes and produced by templates are plain
//! strings on the NFS server's namespace, so they are normalized lexically
//! and never resolved against the local filesystem.

const SEPARATOR: char = '/';

/// Lexically normalize a slash-separated path.
///
/// Collapses repeated separators, drops `.` segments and folds `..` into the
/// preceding segment. `..` above the root of an absolute path is dropped;
/// on a relative path it is kept. An empty result becomes `.`.
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with(SEPARATOR);
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join `relative` onto `root` and normalize the result.
pub fn join(root: &str, relative: &str) -> String {
    clean(&format!("{}/{}", root, relative))
}

/// Offset of `target` below `root`, both normalized first.
///
/// Returns `.` when they are equal and `None` when `target` is not inside
/// `root`.
pub fn relative_offset(root: &str, target: &str) -> Option<String> {
    let root = clean(root);
    let target = clean(target);

    if root == target {
        return Some(".".to_string());
    }
    if root.starts_with(SEPARATOR) != target.starts_with(SEPARATOR) {
        return None;
    }

    let rest = if root == "/" {
        target.strip_prefix(SEPARATOR)
    } else if root == "." {
        Some(target.as_str())
    } else {
        target
            .strip_prefix(root.as_str())
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
    };
    let rest = rest?;

    if escapes(rest) {
        return None;
    }
    Some(rest.to_string())
}

/// Turn a rendered template into a safe relative path below the export root.
///
/// The value is trimmed, normalized and made relative by stripping a leading
/// separator. `None` means the value is unusable: empty, `.`, or still
/// climbing out of the root.
pub fn sanitize_relative(rendered: &str) -> Option<String> {
    let trimmed = rendered.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned = clean(trimmed);
    let relative = cleaned.strip_prefix(SEPARATOR).unwrap_or(&cleaned);

    if relative.is_empty() || relative == "." || escapes(relative) {
        return None;
    }
    Some(relative.to_string())
}

fn escapes(relative: &str) -> bool {
    relative.starts_with("..")
}
