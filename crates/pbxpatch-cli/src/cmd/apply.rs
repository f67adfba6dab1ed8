use super::{config_path, load_descriptor};
use crate::output::{print_json, print_table};
use anyhow::Context;
use pbxpatch_core::config::{PatchConfig, WarnLevel};
use pbxpatch_core::io;
use pbxpatch_core::patcher::{PatchReport, PatchStatus, Patcher};
use pbxpatch_core::verify::check_structure;
use pbxpatch_core::PatchError;
use std::path::Path;
use tracing::{info, warn};

pub struct ApplyOptions {
    pub dry_run: bool,
    pub allow_partial: bool,
}

pub fn run(
    project: &Path,
    config: Option<&Path>,
    opts: ApplyOptions,
    json: bool,
) -> anyhow::Result<()> {
    let (descriptor, text) = load_descriptor(project)?;
    let config_path = config_path(config, &descriptor);
    let cfg = PatchConfig::load(&config_path).context("failed to load config")?;

    let errors: Vec<String> = cfg
        .validate()
        .into_iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message)
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }

    let patcher = Patcher::new(&cfg);
    if !patcher.already_present(&text) {
        if let Some(id) = cfg.identifiers.collisions(&text).into_iter().next() {
            return Err(PatchError::IdentifierCollision(id.to_string()))
                .context("regenerate the identifier table with 'pbxpatch init --force'");
        }
    }

    let report = patcher.patch(&text).context("patch failed")?;

    if report.status == PatchStatus::AlreadyPresent {
        if json {
            print_json(&report)?;
        } else {
            println!(
                "Test targets {} and {} are already present. Nothing to do.",
                cfg.unit_test_name(),
                cfg.ui_test_name()
            );
        }
        return Ok(());
    }

    if !opts.allow_partial {
        report
            .require_anchors()
            .context("nothing written (use --allow-partial to apply the remaining steps)")?;
    }

    let findings = check_structure(&report.text);
    if !findings.is_empty() {
        for f in &findings {
            warn!(offset = ?f.offset, "{}", f.message);
        }
        anyhow::bail!("patched text failed the structure check; nothing written");
    }

    let backup = if opts.dry_run {
        None
    } else {
        let backup = io::write_with_backup(&descriptor, &text, &report.text)
            .with_context(|| format!("failed to write {}", descriptor.display()))?;
        info!(backup = %backup.display(), "wrote backup");
        Some(backup)
    };

    if json {
        let value = serde_json::json!({
            "status": report.status,
            "dry_run": opts.dry_run,
            "descriptor": descriptor.display().to_string(),
            "backup": backup.as_ref().map(|b| b.display().to_string()),
            "steps": report.steps,
        });
        return print_json(&value);
    }

    print_steps(&report);
    match backup {
        Some(backup) => println!(
            "\nPatched {} (backup: {})",
            descriptor.display(),
            backup.display()
        ),
        None => println!("\nDry run: {} not modified", descriptor.display()),
    }
    Ok(())
}

fn print_steps(report: &PatchReport) {
    let rows: Vec<Vec<String>> = report
        .steps
        .iter()
        .map(|r| vec![r.step.to_string(), r.outcome.to_string()])
        .collect();
    print_table(&["STEP", "OUTCOME"], rows);
}
