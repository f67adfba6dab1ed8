use crate::error::{PatchError, Result};
use crate::ident::{IdAllocator, ObjectId};
use crate::io;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// TargetIds
// ---------------------------------------------------------------------------

/// Identifiers for every object one test target needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetIds {
    pub target: ObjectId,
    pub product: ObjectId,
    pub sync_group: ObjectId,
    pub group: ObjectId,
    pub sources_phase: ObjectId,
    pub frameworks_phase: ObjectId,
    pub resources_phase: ObjectId,
    pub dependency: ObjectId,
    pub proxy: ObjectId,
    pub config_list: ObjectId,
    pub debug_config: ObjectId,
    pub release_config: ObjectId,
}

impl TargetIds {
    pub fn generate(alloc: &mut IdAllocator) -> Self {
        Self {
            target: alloc.next(),
            product: alloc.next(),
            sync_group: alloc.next(),
            group: alloc.next(),
            sources_phase: alloc.next(),
            frameworks_phase: alloc.next(),
            resources_phase: alloc.next(),
            dependency: alloc.next(),
            proxy: alloc.next(),
            config_list: alloc.next(),
            debug_config: alloc.next(),
            release_config: alloc.next(),
        }
    }

    pub fn all(&self) -> [(&'static str, &ObjectId); 12] {
        [
            ("target", &self.target),
            ("product", &self.product),
            ("sync_group", &self.sync_group),
            ("group", &self.group),
            ("sources_phase", &self.sources_phase),
            ("frameworks_phase", &self.frameworks_phase),
            ("resources_phase", &self.resources_phase),
            ("dependency", &self.dependency),
            ("proxy", &self.proxy),
            ("config_list", &self.config_list),
            ("debug_config", &self.debug_config),
            ("release_config", &self.release_config),
        ]
    }
}

// ---------------------------------------------------------------------------
// IdentifierTable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierTable {
    pub unit_tests: TargetIds,
    pub ui_tests: TargetIds,
    /// Overrides for pre-existing objects. Discovered from the descriptor
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_target: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_group: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products_group: Option<ObjectId>,
}

impl IdentifierTable {
    /// Allocate a fresh table that avoids every identifier in `descriptor`.
    pub fn generate(descriptor: &str) -> Self {
        let mut alloc = IdAllocator::for_descriptor(descriptor);
        Self {
            unit_tests: TargetIds::generate(&mut alloc),
            ui_tests: TargetIds::generate(&mut alloc),
            project: None,
            main_target: None,
            root_group: None,
            products_group: None,
        }
    }

    /// Every identifier the patcher introduces, labelled by role.
    pub fn new_ids(&self) -> Vec<(String, &ObjectId)> {
        let unit = self
            .unit_tests
            .all()
            .into_iter()
            .map(|(role, id)| (format!("unit_tests.{role}"), id));
        let ui = self
            .ui_tests
            .all()
            .into_iter()
            .map(|(role, id)| (format!("ui_tests.{role}"), id));
        unit.chain(ui).collect()
    }

    fn overrides(&self) -> Vec<(&'static str, &ObjectId)> {
        [
            ("project", self.project.as_ref()),
            ("main_target", self.main_target.as_ref()),
            ("root_group", self.root_group.as_ref()),
            ("products_group", self.products_group.as_ref()),
        ]
        .into_iter()
        .filter_map(|(role, id)| id.map(|id| (role, id)))
        .collect()
    }

    /// Roles sharing an identifier, grouped by the identifier.
    pub fn duplicates(&self) -> Vec<(ObjectId, Vec<String>)> {
        let mut seen: HashMap<&ObjectId, Vec<String>> = HashMap::new();
        for (role, id) in self.new_ids() {
            seen.entry(id).or_default().push(role);
        }
        for (role, id) in self.overrides() {
            seen.entry(id).or_default().push(role.to_string());
        }
        let mut dups: Vec<(ObjectId, Vec<String>)> = seen
            .into_iter()
            .filter(|(_, roles)| roles.len() > 1)
            .map(|(id, roles)| (id.clone(), roles))
            .collect();
        dups.sort_by(|a, b| a.0.cmp(&b.0));
        dups
    }

    /// New identifiers that already occur in `descriptor`.
    pub fn collisions(&self, descriptor: &str) -> Vec<ObjectId> {
        let alloc = IdAllocator::for_descriptor(descriptor);
        self.new_ids()
            .into_iter()
            .filter(|(_, id)| alloc.is_taken(id))
            .map(|(_, id)| id.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// BuildSettingsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSettingsConfig {
    #[serde(default = "default_deployment_target")]
    pub deployment_target: String,
    #[serde(default = "default_swift_version")]
    pub swift_version: String,
    #[serde(default = "default_marketing_version")]
    pub marketing_version: String,
    #[serde(default = "default_project_version")]
    pub current_project_version: String,
    #[serde(default = "default_code_sign_style")]
    pub code_sign_style: String,
    /// Falls back to the main target's `DEVELOPMENT_TEAM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development_team: Option<String>,
    /// Bundle identifiers become `<prefix>.<TargetName>`. Falls back to the
    /// namespace of the main target's bundle identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id_prefix: Option<String>,
}

fn default_deployment_target() -> String {
    "26.0".to_string()
}

fn default_swift_version() -> String {
    "5.0".to_string()
}

fn default_marketing_version() -> String {
    "1.0".to_string()
}

fn default_project_version() -> String {
    "1".to_string()
}

fn default_code_sign_style() -> String {
    "Automatic".to_string()
}

impl Default for BuildSettingsConfig {
    fn default() -> Self {
        Self {
            deployment_target: default_deployment_target(),
            swift_version: default_swift_version(),
            marketing_version: default_marketing_version(),
            current_project_version: default_project_version(),
            code_sign_style: default_code_sign_style(),
            development_team: None,
            bundle_id_prefix: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ProductRef
// ---------------------------------------------------------------------------

/// A Swift package product dependency record (`XCSwiftPackageProductDependency`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ObjectId,
    pub name: String,
}

// ---------------------------------------------------------------------------
// PatchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchConfig {
    pub main_target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_test_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_test_target: Option<String>,
    #[serde(default = "default_tools_version")]
    pub tools_version: String,
    #[serde(default)]
    pub settings: BuildSettingsConfig,
    /// Package products linked into the unit-test target. Inherited from the
    /// main target when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_products: Option<Vec<ProductRef>>,
    /// Products skipped when inheriting from the main target.
    #[serde(default = "default_excluded_packages")]
    pub excluded_packages: Vec<String>,
    pub identifiers: IdentifierTable,
}

fn default_tools_version() -> String {
    "26.0".to_string()
}

fn default_excluded_packages() -> Vec<String> {
    vec!["GoogleMobileAds".to_string(), "FirebaseAI".to_string()]
}

impl PatchConfig {
    pub fn new(main_target: impl Into<String>, identifiers: IdentifierTable) -> Self {
        Self {
            main_target: main_target.into(),
            unit_test_target: None,
            ui_test_target: None,
            tools_version: default_tools_version(),
            settings: BuildSettingsConfig::default(),
            package_products: None,
            excluded_packages: default_excluded_packages(),
            identifiers,
        }
    }

    pub fn unit_test_name(&self) -> String {
        self.unit_test_target
            .clone()
            .unwrap_or_else(|| format!("{}Tests", self.main_target))
    }

    pub fn ui_test_name(&self) -> String {
        self.ui_test_target
            .clone()
            .unwrap_or_else(|| format!("{}UITests", self.main_target))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PatchError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: PatchConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(path, data.as_bytes())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let error = |message: String| ConfigWarning {
            level: WarnLevel::Error,
            message,
        };

        if self.main_target.trim().is_empty() {
            warnings.push(error("main_target is empty".to_string()));
        }

        let unit = self.unit_test_name();
        let ui = self.ui_test_name();
        if unit == ui {
            warnings.push(error(format!(
                "unit and UI test targets share the name '{unit}'"
            )));
        }
        for name in [&unit, &ui] {
            if *name == self.main_target {
                warnings.push(error(format!(
                    "test target '{name}' has the same name as the main target"
                )));
            }
        }

        for (id, roles) in self.identifiers.duplicates() {
            warnings.push(error(format!(
                "identifier {id} is used by more than one role: {}",
                roles.join(", ")
            )));
        }

        if self
            .settings
            .bundle_id_prefix
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "settings.bundle_id_prefix is empty".to_string(),
            });
        }

        if let Some(products) = &self.package_products {
            for p in products {
                if self.excluded_packages.contains(&p.name) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "package product '{}' is listed explicitly and also excluded; exclusions only apply when inheriting",
                            p.name
                        ),
                    });
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
