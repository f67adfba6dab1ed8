pub mod apply;
pub mod config;
pub mod init;
pub mod verify;

use anyhow::Context;
use pbxpatch_core::{io, paths};
use std::path::{Path, PathBuf};

/// Resolve the descriptor for `project` and read it.
pub(crate) fn load_descriptor(project: &Path) -> anyhow::Result<(PathBuf, String)> {
    let descriptor = paths::descriptor_path(project);
    let text = io::read_descriptor(&descriptor)
        .with_context(|| format!("failed to read {}", descriptor.display()))?;
    Ok((descriptor, text))
}

/// Explicit config path, or the default location for `descriptor`.
pub(crate) fn config_path(explicit: Option<&Path>, descriptor: &Path) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths::default_config_path(descriptor))
}
