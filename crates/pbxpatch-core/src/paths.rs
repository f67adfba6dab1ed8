use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File name constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "pbxpatch.yaml";
pub const DESCRIPTOR_FILE: &str = "project.pbxproj";
pub const PROJECT_BUNDLE_EXT: &str = "xcodeproj";
pub const BACKUP_SUFFIX: &str = ".backup";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Accept either a `.xcodeproj` bundle or the descriptor file itself.
pub fn descriptor_path(project: &Path) -> PathBuf {
    let is_bundle = project.is_dir()
        || project
            .extension()
            .is_some_and(|ext| ext == PROJECT_BUNDLE_EXT);
    if is_bundle {
        project.join(DESCRIPTOR_FILE)
    } else {
        project.to_path_buf()
    }
}

/// Sibling backup path: the original file name plus `.backup`.
pub fn backup_path(descriptor: &Path) -> PathBuf {
    let mut name = descriptor
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(BACKUP_SUFFIX);
    descriptor.with_file_name(name)
}

/// Default config location: next to the `.xcodeproj` bundle.
pub fn default_config_path(descriptor: &Path) -> PathBuf {
    let bundle_parent = descriptor
        .parent()
        .filter(|p| p.extension().is_some_and(|ext| ext == PROJECT_BUNDLE_EXT))
        .and_then(Path::parent);
    match bundle_parent {
        Some(dir) => dir.join(CONFIG_FILE),
        None => descriptor
            .parent()
            .unwrap_or(Path::new("."))
            .join(CONFIG_FILE),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
