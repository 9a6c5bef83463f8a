//! Path helpers for repository-relative paths
//!
//! Every path the engine stores or compares is in normalized form: exactly
//! one leading `/`, no trailing `/` (except the root itself).

use chrono::NaiveDate;

/// Repository root in normalized form.
pub const ROOT: &str = "/";

/// Normalize a path to begin with a single leading separator.
///
/// `"a/b"`, `"/a/b"` and `"//a/b"` all normalize to `"/a/b"`. Trailing
/// separators are dropped so directory paths compare equal regardless of
/// how they were typed.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    format!("/{}", trimmed)
}

/// Strip the leading separator for use in API URLs.
pub fn to_remote(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Join a directory and a name, normalizing the result.
pub fn join(dir: &str, name: &str) -> String {
    normalize(&format!("{}/{}", dir.trim_end_matches('/'), name))
}

/// Parent directory of a normalized path. The root is its own parent.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(idx) => &path[..idx],
    }
}

/// True when `path` sits exactly one level below `dir`.
pub fn is_direct_child(path: &str, dir: &str) -> bool {
    let dir = normalize(dir);
    path != dir && parent(path) == dir
}

/// `{dir}/{YYYYMMDD}` prefix shared by all entries generated on `date`.
pub fn dated_prefix(dir: &str, date: NaiveDate) -> String {
    join(dir, &date.format("%Y%m%d").to_string())
}

/// Build `{prefix}_{NN}.{extension}` where `NN = existing + 1`, two digits.
pub fn sequenced_name(prefix: &str, existing: usize, extension: &str) -> String {
    format!("{}_{:02}.{}", prefix, existing + 1, extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_relative_and_absolute_agree() {
        assert_eq!(normalize("a/b"), "/a/b");
        assert_eq!(normalize("/a/b"), "/a/b");
        assert_eq!(normalize("//20261016_01.mdx"), "/20261016_01.mdx");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/posts/"), "/posts");
    }

    #[test]
    fn test_join_from_root() {
        assert_eq!(join("/", "20261016_01.mdx"), "/20261016_01.mdx");
        assert_eq!(join("/posts", "a.mdx"), "/posts/a.mdx");
        assert_eq!(join("/posts/", "a.mdx"), "/posts/a.mdx");
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/x/a.txt"), "/x");
        assert_eq!(parent("/z.txt"), "/");
        assert_eq!(parent("/"), "/");
    }

    #[test]
    fn test_direct_child_excludes_deeper_and_siblings() {
        assert!(is_direct_child("/x/a.txt", "/x"));
        assert!(!is_direct_child("/x/y/b.txt", "/x"));
        assert!(!is_direct_child("/z.txt", "/x"));
        assert!(!is_direct_child("/xa.txt", "/x"));
        assert!(is_direct_child("/z.txt", "/"));
        assert!(!is_direct_child("/x", "/x"));
    }

    #[test]
    fn test_sequenced_name() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let prefix = dated_prefix("/posts", date);
        assert_eq!(prefix, "/posts/20261016");
        assert_eq!(sequenced_name(&prefix, 0, "mdx"), "/posts/20261016_01.mdx");
        assert_eq!(sequenced_name(&prefix, 11, "jpg"), "/posts/20261016_12.jpg");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(path in "[/a-z0-9_.]{0,24}") {
            let once = normalize(&path);
            prop_assert_eq!(normalize(&once), once.clone());
            prop_assert!(once.starts_with('/'));
            prop_assert!(!once.starts_with("//"));
        }

        #[test]
        fn prop_leading_separator_is_irrelevant(path in "[a-z0-9_./]{0,24}") {
            prop_assert_eq!(normalize(&path), normalize(&format!("/{}", path)));
        }
    }
}
