//! POSIX-style path helpers.
//!
//! Module paths are plain strings with `/` separators regardless of the
//! host OS (vault paths, URL-ish ids, Windows drive paths after
//! [`to_posix`]), so these work on `&str` rather than `std::path`.

/// Replace backslashes with forward slashes.
pub fn to_posix(path: &str) -> String {
    path.replace('\\', "/")
}

/// Whether `path` starts at a root: `/x` or a drive path such as `C:/x`.
pub fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && (bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Resolve `.` and `..` segments and collapse repeated separators.
///
/// A trailing separator is kept. `..` above the root of an absolute path
/// is dropped; in a relative path it is kept.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let absolute = path.starts_with('/');
    let trailing = path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let mut result = segments.join("/");
    if absolute {
        result.insert(0, '/');
    }
    if result.is_empty() {
        return ".".to_string();
    }
    if trailing && !result.ends_with('/') {
        result.push('/');
    }
    result
}

/// Join segments with `/` and normalize.
///
/// Unlike `std::path::Path::join`, a later absolute segment does not reset
/// the result: `join(&["/a", "/b"])` is `/a/b`.
pub fn join(paths: &[&str]) -> String {
    let joined = paths
        .iter()
        .filter(|segment| !segment.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");

    if joined.is_empty() {
        ".".to_string()
    } else {
        normalize(&joined)
    }
}

fn trim_trailing_separators(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') { "/" } else { trimmed }
}

/// Parent folder of `path`; `.` when there is none.
pub fn dirname(path: &str) -> String {
    let path = trim_trailing_separators(path);
    if path == "/" {
        return "/".to_string();
    }

    match path.rfind('/') {
        None => ".".to_string(),
        Some(0) => "/".to_string(),
        Some(index) => trim_trailing_separators(&path[..index]).to_string(),
    }
}

/// Last segment of `path`.
pub fn basename(path: &str) -> &str {
    let path = trim_trailing_separators(path);
    match path.rfind('/') {
        Some(index) if path != "/" => &path[index + 1..],
        _ if path == "/" => "",
        _ => path,
    }
}

/// Extension of the last segment including the dot, or an empty string.
pub fn extname(path: &str) -> &str {
    let base = basename(path);
    match base.rfind('.') {
        Some(index) if index > 0 => &base[index..],
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join(&["/vault", "scripts", "a.ts"]), "/vault/scripts/a.ts");
        assert_eq!(join(&["/vault/scripts", "../lib/b.ts"]), "/vault/lib/b.ts");
        assert_eq!(join(&["/vault", "/abs"]), "/vault/abs");
        assert_eq!(join(&["/vault", "", "./x"]), "/vault/x");
        assert_eq!(join(&[".", "x"]), "x");
        assert_eq!(join(&["dist/index.js", "."]), "dist/index.js");
        assert_eq!(join(&[]), ".");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a//b/./c/.."), "/a/b");
        assert_eq!(normalize("/../a"), "/a");
        assert_eq!(normalize("../a/../.."), "../..");
        assert_eq!(normalize("a/"), "a/");
        assert_eq!(normalize("./"), ".");
    }

    #[test]
    fn test_dirname() {
        assert_eq!(dirname("/a/b/c.ts"), "/a/b");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(dirname("/"), "/");
        assert_eq!(dirname("a"), ".");
        assert_eq!(dirname("a/b/"), "a");
        assert_eq!(dirname("C:/vault"), "C:");
        assert_eq!(dirname("C:"), ".");
    }

    #[test]
    fn test_basename_and_extname() {
        assert_eq!(basename("/a/b/c.ts"), "c.ts");
        assert_eq!(basename("/a/b/"), "b");
        assert_eq!(extname("/a/b/c.test.ts"), ".ts");
        assert_eq!(extname("/a/.hidden"), "");
        assert_eq!(extname("/a/b"), "");
    }

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("/a"));
        assert!(is_absolute("C:/a"));
        assert!(is_absolute("C:\\a"));
        assert!(!is_absolute("a/b"));
        assert!(!is_absolute("./a"));
        assert_eq!(to_posix("C:\\a\\b"), "C:/a/b");
    }
}
