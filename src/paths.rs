//! Path normalization for wire-form relative paths.
//!
//! Wire paths always use forward slashes and never begin with `..` or a
//! root anchor, regardless of the host separator convention.

use std::path::{Component, Path};

/// Convert an absolute path under `root` into its wire-form relative path.
///
/// Returns `None` for the root itself, for paths outside the root, and for
/// paths whose relative form would escape the root.
pub fn wire_relative(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                segments.push(segment.to_string_lossy().into_owned())
            }
            Component::CurDir => {}
            // ParentDir, RootDir, and Prefix all escape the root
            _ => return None,
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_nested_path_uses_forward_slashes() {
        let root = PathBuf::from("/work/project");
        let path = root.join("docs").join("guide").join("intro.md");

        assert_eq!(
            wire_relative(&root, &path).as_deref(),
            Some("docs/guide/intro.md")
        );
    }

    #[test]
    fn test_root_itself_is_rejected() {
        let root = PathBuf::from("/work/project");

        assert_eq!(wire_relative(&root, &root), None);
    }

    #[test]
    fn test_outside_root_is_rejected() {
        let root = PathBuf::from("/work/project");

        assert_eq!(wire_relative(&root, Path::new("/etc/passwd")), None);
        assert_eq!(
            wire_relative(&root, Path::new("/work/project/../other/file")),
            None
        );
    }

    #[test]
    fn test_curdir_segments_are_dropped() {
        let root = PathBuf::from("/work/project");

        assert_eq!(
            wire_relative(&root, Path::new("/work/project/./src/lib.rs")).as_deref(),
            Some("src/lib.rs")
        );
    }
}
