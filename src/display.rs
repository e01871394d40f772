//! Unit-relative display names for metadata artifacts.
//!
//! Absolute artifact paths differ between checkouts, so configuration lists
//! show a path relative to the unit's content root instead. The result is a
//! display heuristic only; artifact identity is always the absolute path.
use std::path::Path;

const SEPARATOR: char = '/';

/// Display path and filename for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayPath {
    /// Directory part, without leading or trailing separator. Empty at the root.
    pub path: String,
    pub filename: String,
}

/// Shortens absolute artifact paths using a unit's content roots and the
/// project root.
#[derive(Debug, Clone, Default)]
pub struct DisplayPathResolver {
    content_roots: Vec<String>,
    project_root: Option<String>,
}

impl DisplayPathResolver {
    pub fn new<'a>(
        content_roots: impl IntoIterator<Item = &'a Path>,
        project_root: Option<&Path>,
    ) -> Self {
        Self {
            content_roots: content_roots.into_iter().map(path_string).collect(),
            project_root: project_root.map(path_string),
        }
    }

    pub fn resolve(&self, artifact: &Path) -> DisplayPath {
        let mut rest = path_string(artifact);

        let longest_root = self
            .content_roots
            .iter()
            .filter(|root| !root.is_empty() && rest.contains(root.as_str()))
            .max_by_key(|root| root.len());
        if let Some(root) = longest_root {
            rest = strip_through(&rest, root);
        }

        if let Some(project_root) = self.project_root.as_deref() {
            if !project_root.is_empty() && rest.contains(project_root) {
                rest = strip_through(&rest, project_root);
            }
        }

        let rest = rest.strip_prefix(SEPARATOR).unwrap_or(&rest);
        match rest.rfind(SEPARATOR) {
            Some(index) => DisplayPath {
                path: rest[..index].to_string(),
                filename: rest[index + 1..].to_string(),
            },
            None => DisplayPath {
                path: String::new(),
                filename: rest.to_string(),
            },
        }
    }
}

/// Drop everything up to and including the first occurrence of `needle`.
fn strip_through(haystack: &str, needle: &str) -> String {
    match haystack.find(needle) {
        Some(index) => haystack[index + needle.len()..].to_string(),
        None => haystack.to_string(),
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(roots: &[&str], project_root: Option<&str>) -> DisplayPathResolver {
        DisplayPathResolver::new(roots.iter().map(Path::new), project_root.map(Path::new))
    }

    #[test]
    fn strips_content_root_then_splits() {
        let display = resolver(&["/proj/moduleA/out"], Some("/proj"))
            .resolve(Path::new("/proj/moduleA/out/com/x/Foo.class"));
        assert_eq!(display.filename, "Foo.class");
        assert_eq!(display.path, "com/x");
    }

    #[test]
    fn prefers_longest_content_root() {
        let display = resolver(&["/proj/moduleA", "/proj/moduleA/out"], None)
            .resolve(Path::new("/proj/moduleA/out/com/x/Foo.class"));
        assert_eq!(display.path, "com/x");
    }

    #[test]
    fn falls_back_to_project_root() {
        let display = resolver(&["/elsewhere"], Some("/proj"))
            .resolve(Path::new("/proj/moduleA/out/META-INF/orm.xml"));
        assert_eq!(display.path, "moduleA/out/META-INF");
        assert_eq!(display.filename, "orm.xml");
    }

    #[test]
    fn bare_filename_has_empty_path() {
        let display = resolver(&["/proj/out"], None).resolve(Path::new("/proj/out/package.jdo"));
        assert_eq!(display.path, "");
        assert_eq!(display.filename, "package.jdo");
    }

    #[test]
    fn unmatched_path_keeps_directories() {
        let display = resolver(&[], None).resolve(Path::new("/tmp/a/B.class"));
        assert_eq!(display.path, "tmp/a");
        assert_eq!(display.filename, "B.class");
    }
}
