use super::{config_path, load_descriptor};
use crate::output::{print_json, print_table};
use anyhow::Context;
use pbxpatch_core::config::{IdentifierTable, PatchConfig};
use pbxpatch_core::discover::discover;
use std::path::Path;
use tracing::info;

pub fn run(
    project: &Path,
    main_target: &str,
    config: Option<&Path>,
    force: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (descriptor, text) = load_descriptor(project)?;
    let config_path = config_path(config, &descriptor);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to regenerate it)",
            config_path.display()
        );
    }

    let cfg = PatchConfig::new(main_target, IdentifierTable::generate(&text));
    // Fail early when the main target cannot be resolved.
    let ctx = discover(&text, &cfg).context("failed to inspect the descriptor")?;
    info!(main_target = %ctx.main_target, "resolved main target");

    cfg.save(&config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    if json {
        let value = serde_json::json!({
            "config": config_path.display().to_string(),
            "main_target": ctx.main_target,
            "unit_test_target": cfg.unit_test_name(),
            "ui_test_target": cfg.ui_test_name(),
            "identifiers": cfg.identifiers,
        });
        return print_json(&value);
    }

    println!("  created: {}", config_path.display());
    println!(
        "  targets: {} + {} (main: {} {})",
        cfg.unit_test_name(),
        cfg.ui_test_name(),
        ctx.main_target_name,
        ctx.main_target
    );
    let rows: Vec<Vec<String>> = cfg
        .identifiers
        .new_ids()
        .into_iter()
        .map(|(role, id)| vec![role, id.to_string()])
        .collect();
    print_table(&["ROLE", "IDENTIFIER"], rows);
    Ok(())
}
