use super::load_descriptor;
use crate::output::print_json;
use anyhow::Context;
use pbxpatch_core::verify::{check_structure, dangling_references, record_count};
use std::path::Path;

const COUNTED_REGIONS: &[&str] = &[
    "PBXNativeTarget",
    "PBXTargetDependency",
    "XCConfigurationList",
];

pub fn run(project: &Path, json: bool) -> anyhow::Result<()> {
    let (descriptor, text) = load_descriptor(project)?;

    let findings = check_structure(&text);
    // References can only be resolved once the text parses.
    let dangling = if findings.is_empty() {
        dangling_references(&text).context("failed to parse descriptor")?
    } else {
        Vec::new()
    };

    if json {
        let mut counts = serde_json::Map::new();
        if findings.is_empty() {
            for region in COUNTED_REGIONS {
                counts.insert(region.to_string(), record_count(&text, region)?.into());
            }
        }
        let value = serde_json::json!({
            "descriptor": descriptor.display().to_string(),
            "findings": findings,
            "dangling_references": dangling,
            "records": counts,
        });
        print_json(&value)?;
    } else {
        for f in &findings {
            match f.offset {
                Some(offset) => println!("[structure] byte {offset}: {}", f.message),
                None => println!("[structure] {}", f.message),
            }
        }
        for id in &dangling {
            println!("[reference] {id} is referenced but not defined");
        }
        if findings.is_empty() && dangling.is_empty() {
            let counts: Vec<String> = COUNTED_REGIONS
                .iter()
                .map(|r| -> anyhow::Result<String> {
                    Ok(format!("{r}: {}", record_count(&text, r)?))
                })
                .collect::<anyhow::Result<_>>()?;
            println!("{} is consistent ({})", descriptor.display(), counts.join(", "));
        }
    }

    if !findings.is_empty() || !dangling.is_empty() {
        anyhow::bail!(
            "{} structure problem(s), {} dangling reference(s)",
            findings.len(),
            dangling.len()
        );
    }
    Ok(())
}
