use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use pbxpatch_core::config::{PatchConfig, WarnLevel};
use pbxpatch_core::paths;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config for common mistakes
    Validate {
        /// Config path
        #[arg(long, env = "PBXPATCH_CONFIG", default_value = paths::CONFIG_FILE)]
        config: PathBuf,
    },
}

pub fn run(subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Validate { config } => validate(&config, json),
    }
}

fn validate(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = PatchConfig::load(path).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
