//! The eleven insertion steps that wire a unit-test and a UI-test target
//! into an application project.
//!
//! Every step touches its own region (or list attribute), never removes or
//! rewrites existing records, and skips identifiers that are already in
//! place, so steps are idempotent and can run in any order.

use crate::config::{PatchConfig, TargetIds};
use crate::discover::{discover, ProjectContext};
use crate::error::{PatchError, Result};
use crate::ident::ObjectId;
use crate::record::{render_entry, Record, Value};
use crate::region::{self, Document, Entry, LineEnding};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Step / StepOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    FileReferences,
    SynchronizedGroups,
    Groups,
    SourcesPhases,
    FrameworksPhases,
    ResourcesPhases,
    NativeTargets,
    ProjectTargets,
    TargetAttributes,
    TargetDependencies,
    BuildConfigurations,
}

impl Step {
    /// Canonical application order.
    pub fn all() -> &'static [Step] {
        &[
            Step::FileReferences,
            Step::SynchronizedGroups,
            Step::Groups,
            Step::SourcesPhases,
            Step::FrameworksPhases,
            Step::ResourcesPhases,
            Step::NativeTargets,
            Step::ProjectTargets,
            Step::TargetAttributes,
            Step::TargetDependencies,
            Step::BuildConfigurations,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::FileReferences => "file_references",
            Step::SynchronizedGroups => "synchronized_groups",
            Step::Groups => "groups",
            Step::SourcesPhases => "sources_phases",
            Step::FrameworksPhases => "frameworks_phases",
            Step::ResourcesPhases => "resources_phases",
            Step::NativeTargets => "native_targets",
            Step::ProjectTargets => "project_targets",
            Step::TargetAttributes => "target_attributes",
            Step::TargetDependencies => "target_dependencies",
            Step::BuildConfigurations => "build_configurations",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Inserted,
    AlreadyPresent,
    AnchorMissing { anchor: String },
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Inserted => f.write_str("inserted"),
            StepOutcome::AlreadyPresent => f.write_str("already present"),
            StepOutcome::AnchorMissing { anchor } => write!(f, "anchor missing: {anchor}"),
        }
    }
}

/// Collects the result of a step that touches more than one anchor.
struct Progress {
    text: String,
    inserted: bool,
    missing: Vec<String>,
}

impl Progress {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            inserted: false,
            missing: Vec::new(),
        }
    }

    fn absorb(&mut self, (text, outcome): (String, StepOutcome)) {
        self.text = text;
        match outcome {
            StepOutcome::Inserted => self.inserted = true,
            StepOutcome::AlreadyPresent => {}
            StepOutcome::AnchorMissing { anchor } => self.missing.push(anchor),
        }
    }

    fn finish(self) -> (String, StepOutcome) {
        let outcome = if !self.missing.is_empty() {
            StepOutcome::AnchorMissing {
                anchor: self.missing.join(", "),
            }
        } else if self.inserted {
            StepOutcome::Inserted
        } else {
            StepOutcome::AlreadyPresent
        };
        (self.text, outcome)
    }
}

// ---------------------------------------------------------------------------
// PatchReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    Patched,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step: Step,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchReport {
    pub status: PatchStatus,
    #[serde(skip)]
    pub text: String,
    pub steps: Vec<StepResult>,
}

impl PatchReport {
    pub fn missing_anchors(&self) -> Vec<(Step, &str)> {
        self.steps
            .iter()
            .filter_map(|r| match &r.outcome {
                StepOutcome::AnchorMissing { anchor } => Some((r.step, anchor.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Fail with every skipped step and its anchor listed.
    pub fn require_anchors(&self) -> Result<()> {
        let missing = self.missing_anchors();
        if missing.is_empty() {
            return Ok(());
        }
        let listed: Vec<String> = missing
            .iter()
            .map(|(step, anchor)| format!("{step} ({anchor})"))
            .collect();
        Err(PatchError::AnchorMissing(listed.join(", ")))
    }

    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| &r.outcome)
    }
}

// ---------------------------------------------------------------------------
// Test targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestKind {
    Unit,
    Ui,
}

impl TestKind {
    fn product_type(self) -> &'static str {
        match self {
            TestKind::Unit => "com.apple.product-type.bundle.unit-test",
            TestKind::Ui => "com.apple.product-type.bundle.ui-testing",
        }
    }
}

struct TestTarget<'a> {
    kind: TestKind,
    name: String,
    ids: &'a TargetIds,
}

impl TestTarget<'_> {
    fn product_name(&self) -> String {
        format!("{}.xctest", self.name)
    }

    fn config_list_comment(&self) -> String {
        format!("Build configuration list for PBXNativeTarget \"{}\"", self.name)
    }
}

// ---------------------------------------------------------------------------
// Patcher
// ---------------------------------------------------------------------------

pub struct Patcher<'a> {
    config: &'a PatchConfig,
}

impl<'a> Patcher<'a> {
    pub fn new(config: &'a PatchConfig) -> Self {
        Self { config }
    }

    fn targets(&self) -> [TestTarget<'a>; 2] {
        [
            TestTarget {
                kind: TestKind::Unit,
                name: self.config.unit_test_name(),
                ids: &self.config.identifiers.unit_tests,
            },
            TestTarget {
                kind: TestKind::Ui,
                name: self.config.ui_test_name(),
                ids: &self.config.identifiers.ui_tests,
            },
        ]
    }

    /// True when both test target names already occur in the text.
    pub fn already_present(&self, text: &str) -> bool {
        text.contains(&self.config.unit_test_name()) && text.contains(&self.config.ui_test_name())
    }

    /// Run every step in canonical order.
    pub fn patch(&self, text: &str) -> Result<PatchReport> {
        if self.already_present(text) {
            info!("test targets already present; nothing to do");
            return Ok(PatchReport {
                status: PatchStatus::AlreadyPresent,
                text: text.to_string(),
                steps: Vec::new(),
            });
        }

        let eol = LineEnding::detect(text);
        let normalized = eol.normalize(text);
        let ctx = discover(&normalized, self.config)?;
        debug!(main_target = %ctx.main_target, project = %ctx.project, ?eol, "resolved project context");

        let mut current = normalized;
        let mut steps = Vec::with_capacity(Step::all().len());
        for &step in Step::all() {
            let (next, outcome) = self.apply(step, &current, &ctx)?;
            match &outcome {
                StepOutcome::AnchorMissing { anchor } => {
                    warn!(step = %step, anchor = %anchor, "anchor missing; step skipped")
                }
                other => debug!(step = %step, outcome = %other, "step applied"),
            }
            current = next;
            steps.push(StepResult { step, outcome });
        }

        Ok(PatchReport {
            status: PatchStatus::Patched,
            text: eol.restore(current),
            steps,
        })
    }

    /// Run a single step, resolving the project context from `text`.
    pub fn run_step(&self, step: Step, text: &str) -> Result<(String, StepOutcome)> {
        let eol = LineEnding::detect(text);
        let normalized = eol.normalize(text);
        let ctx = discover(&normalized, self.config)?;
        let (out, outcome) = self.apply(step, &normalized, &ctx)?;
        Ok((eol.restore(out), outcome))
    }

    fn apply(&self, step: Step, text: &str, ctx: &ProjectContext) -> Result<(String, StepOutcome)> {
        match step {
            Step::FileReferences => self.file_references(text),
            Step::SynchronizedGroups => self.synchronized_groups(text),
            Step::Groups => self.groups(text, ctx),
            Step::SourcesPhases => {
                self.build_phases(text, "PBXSourcesBuildPhase", "Sources", |ids| &ids.sources_phase)
            }
            Step::FrameworksPhases => self.build_phases(
                text,
                "PBXFrameworksBuildPhase",
                "Frameworks",
                |ids| &ids.frameworks_phase,
            ),
            Step::ResourcesPhases => self.build_phases(
                text,
                "PBXResourcesBuildPhase",
                "Resources",
                |ids| &ids.resources_phase,
            ),
            Step::NativeTargets => self.native_targets(text, ctx),
            Step::ProjectTargets => self.project_targets(text, ctx),
            Step::TargetAttributes => self.target_attributes(text, ctx),
            Step::TargetDependencies => self.target_dependencies(text, ctx),
            Step::BuildConfigurations => self.build_configurations(text, ctx),
        }
    }

    // -- 1 ------------------------------------------------------------------

    fn file_references(&self, text: &str) -> Result<(String, StepOutcome)> {
        let records: Vec<Record> = self
            .targets()
            .iter()
            .map(|t| {
                Record::new("PBXFileReference", &t.ids.product)
                    .comment(t.product_name())
                    .scalar("explicitFileType", "wrapper.cfbundle")
                    .scalar("includeInIndex", "0")
                    .scalar("path", t.product_name())
                    .scalar("sourceTree", "BUILT_PRODUCTS_DIR")
            })
            .collect();
        append_records(text, "PBXFileReference", &records, Layout::Inline)
    }

    // -- 2 ------------------------------------------------------------------

    fn synchronized_groups(&self, text: &str) -> Result<(String, StepOutcome)> {
        let records: Vec<Record> = self
            .targets()
            .iter()
            .map(|t| {
                Record::new("PBXFileSystemSynchronizedRootGroup", &t.ids.sync_group)
                    .comment(&t.name)
                    .scalar("path", &t.name)
                    .scalar("sourceTree", "<group>")
            })
            .collect();
        append_records(
            text,
            "PBXFileSystemSynchronizedRootGroup",
            &records,
            Layout::Block,
        )
    }

    // -- 3 ------------------------------------------------------------------

    fn groups(&self, text: &str, ctx: &ProjectContext) -> Result<(String, StepOutcome)> {
        let targets = self.targets();
        let mut progress = Progress::new(text);

        let group_refs: Vec<Value> = targets
            .iter()
            .map(|t| Value::reference(&t.ids.group, &t.name))
            .collect();
        progress.absorb(extend_group_children(
            &progress.text,
            ctx.root_group.as_ref(),
            "root group",
            &group_refs,
        )?);

        let product_refs: Vec<Value> = targets
            .iter()
            .map(|t| Value::reference(&t.ids.product, t.product_name()))
            .collect();
        progress.absorb(extend_group_children(
            &progress.text,
            ctx.products_group.as_ref(),
            "products group",
            &product_refs,
        )?);

        let records: Vec<Record> = targets
            .iter()
            .map(|t| {
                Record::new("PBXGroup", &t.ids.group)
                    .comment(&t.name)
                    .attr(
                        "children",
                        Value::list([Value::reference(&t.ids.sync_group, &t.name)]),
                    )
                    .scalar("name", &t.name)
                    .scalar("sourceTree", "<group>")
            })
            .collect();
        progress.absorb(append_records(&progress.text, "PBXGroup", &records, Layout::Block)?);

        Ok(progress.finish())
    }

    // -- 4, 5, 6 ------------------------------------------------------------

    fn build_phases(
        &self,
        text: &str,
        isa: &str,
        comment: &str,
        pick: fn(&TargetIds) -> &ObjectId,
    ) -> Result<(String, StepOutcome)> {
        let records: Vec<Record> = self
            .targets()
            .iter()
            .map(|t| {
                Record::new(isa, pick(t.ids))
                    .comment(comment)
                    .scalar("buildActionMask", "2147483647")
                    .attr("files", Value::empty_list())
                    .scalar("runOnlyForDeploymentPostprocessing", "0")
            })
            .collect();
        append_records(text, isa, &records, Layout::Block)
    }

    // -- 7 ------------------------------------------------------------------

    fn native_targets(&self, text: &str, ctx: &ProjectContext) -> Result<(String, StepOutcome)> {
        let records: Vec<Record> = self
            .targets()
            .iter()
            .map(|t| {
                let packages = match t.kind {
                    TestKind::Unit => Value::list(
                        ctx.package_products
                            .iter()
                            .map(|p| Value::reference(&p.id, &p.name)),
                    ),
                    TestKind::Ui => Value::empty_list(),
                };
                Record::new("PBXNativeTarget", &t.ids.target)
                    .comment(&t.name)
                    .attr(
                        "buildConfigurationList",
                        Value::reference(&t.ids.config_list, t.config_list_comment()),
                    )
                    .attr(
                        "buildPhases",
                        Value::list([
                            Value::reference(&t.ids.sources_phase, "Sources"),
                            Value::reference(&t.ids.frameworks_phase, "Frameworks"),
                            Value::reference(&t.ids.resources_phase, "Resources"),
                        ]),
                    )
                    .attr("buildRules", Value::empty_list())
                    .attr(
                        "dependencies",
                        Value::list([Value::reference(&t.ids.dependency, "PBXTargetDependency")]),
                    )
                    .attr(
                        "fileSystemSynchronizedGroups",
                        Value::list([Value::reference(&t.ids.sync_group, &t.name)]),
                    )
                    .scalar("name", &t.name)
                    .attr("packageProductDependencies", packages)
                    .scalar("productName", &t.name)
                    .attr(
                        "productReference",
                        Value::reference(&t.ids.product, t.product_name()),
                    )
                    .scalar("productType", t.kind.product_type())
            })
            .collect();
        append_records(text, "PBXNativeTarget", &records, Layout::Block)
    }

    // -- 8 ------------------------------------------------------------------

    fn project_targets(&self, text: &str, ctx: &ProjectContext) -> Result<(String, StepOutcome)> {
        let doc = Document::parse(text)?;
        let Some(targets) = project_attribute(&doc, &ctx.project, &["targets"])? else {
            return Ok(missing(text, "PBXProject targets"));
        };
        let present: HashSet<String> = doc
            .list_items(&targets.value)
            .into_iter()
            .map(|i| i.value)
            .collect();

        let mut wanted = vec![Value::reference(&ctx.main_target, &ctx.main_target_name)];
        wanted.extend(
            self.targets()
                .iter()
                .map(|t| Value::reference(&t.ids.target, &t.name)),
        );
        let entries = missing_refs(&wanted, &present);
        if entries.is_empty() {
            return Ok((text.to_string(), StepOutcome::AlreadyPresent));
        }
        Ok((
            region::extend_list(text, &targets, &entries)?,
            StepOutcome::Inserted,
        ))
    }

    // -- 9 ------------------------------------------------------------------

    fn target_attributes(&self, text: &str, ctx: &ProjectContext) -> Result<(String, StepOutcome)> {
        let doc = Document::parse(text)?;
        let Some(attrs) = project_attribute(&doc, &ctx.project, &["attributes", "TargetAttributes"])?
        else {
            return Ok(missing(text, "PBXProject TargetAttributes"));
        };
        let present: HashSet<String> = doc
            .entries_in(&attrs.value.inner)?
            .into_iter()
            .map(|e| e.key)
            .collect();

        let depth = region::child_depth(text, &attrs);
        let mut payload = String::new();
        for t in self.targets() {
            if present.contains(t.ids.target.as_str()) {
                continue;
            }
            let value = Value::Dict(vec![
                (
                    "CreatedOnToolsVersion".to_string(),
                    Value::scalar(&self.config.tools_version),
                ),
                ("TestTargetID".to_string(), Value::bare_ref(&ctx.main_target)),
            ]);
            payload.push_str(&render_entry(t.ids.target.as_str(), &value, depth));
        }
        if payload.is_empty() {
            return Ok((text.to_string(), StepOutcome::AlreadyPresent));
        }
        Ok((
            region::extend_dict(text, &attrs, &payload),
            StepOutcome::Inserted,
        ))
    }

    // -- 10 -----------------------------------------------------------------

    fn target_dependencies(&self, text: &str, ctx: &ProjectContext) -> Result<(String, StepOutcome)> {
        let targets = self.targets();
        let mut progress = Progress::new(text);

        let proxies: Vec<Record> = targets
            .iter()
            .map(|t| {
                Record::new("PBXContainerItemProxy", &t.ids.proxy)
                    .comment("PBXContainerItemProxy")
                    .attr(
                        "containerPortal",
                        Value::reference(&ctx.project, "Project object"),
                    )
                    .scalar("proxyType", "1")
                    .attr("remoteGlobalIDString", Value::bare_ref(&ctx.main_target))
                    .scalar("remoteInfo", &ctx.main_target_name)
            })
            .collect();
        progress.absorb(append_records_creating(
            &progress.text,
            "PBXContainerItemProxy",
            &proxies,
        )?);

        let dependencies: Vec<Record> = targets
            .iter()
            .map(|t| {
                Record::new("PBXTargetDependency", &t.ids.dependency)
                    .comment("PBXTargetDependency")
                    .attr(
                        "target",
                        Value::reference(&ctx.main_target, &ctx.main_target_name),
                    )
                    .attr(
                        "targetProxy",
                        Value::reference(&t.ids.proxy, "PBXContainerItemProxy"),
                    )
            })
            .collect();
        progress.absorb(append_records_creating(
            &progress.text,
            "PBXTargetDependency",
            &dependencies,
        )?);

        Ok(progress.finish())
    }

    // -- 11 -----------------------------------------------------------------

    fn build_configurations(
        &self,
        text: &str,
        ctx: &ProjectContext,
    ) -> Result<(String, StepOutcome)> {
        let targets = self.targets();
        let mut progress = Progress::new(text);

        let mut configs = Vec::new();
        for t in &targets {
            let settings = self.build_settings(t, ctx);
            for (id, name) in [(&t.ids.debug_config, "Debug"), (&t.ids.release_config, "Release")] {
                configs.push(
                    Record::new("XCBuildConfiguration", id)
                        .comment(name)
                        .attr("buildSettings", settings.clone())
                        .scalar("name", name),
                );
            }
        }
        progress.absorb(append_records(
            &progress.text,
            "XCBuildConfiguration",
            &configs,
            Layout::Block,
        )?);

        let lists: Vec<Record> = targets
            .iter()
            .map(|t| {
                Record::new("XCConfigurationList", &t.ids.config_list)
                    .comment(t.config_list_comment())
                    .attr(
                        "buildConfigurations",
                        Value::list([
                            Value::reference(&t.ids.debug_config, "Debug"),
                            Value::reference(&t.ids.release_config, "Release"),
                        ]),
                    )
                    .scalar("defaultConfigurationIsVisible", "0")
                    .scalar("defaultConfigurationName", "Release")
            })
            .collect();
        progress.absorb(append_records(
            &progress.text,
            "XCConfigurationList",
            &lists,
            Layout::Block,
        )?);

        Ok(progress.finish())
    }

    fn bundle_id(&self, target: &TestTarget, ctx: &ProjectContext) -> String {
        let prefix = match (&self.config.settings.bundle_id_prefix, &ctx.main_bundle_id) {
            (Some(prefix), _) => prefix.trim_end_matches('.').to_string(),
            (None, Some(main)) => main
                .rsplit_once('.')
                .map(|(ns, _)| ns.to_string())
                .unwrap_or_else(|| main.clone()),
            (None, None) => "com.example".to_string(),
        };
        format!("{prefix}.{}", target.name)
    }

    fn build_settings(&self, target: &TestTarget, ctx: &ProjectContext) -> Value {
        let s = &self.config.settings;
        let mut settings: BTreeMap<&str, Value> = BTreeMap::new();
        settings.insert("CODE_SIGN_STYLE", Value::scalar(&s.code_sign_style));
        settings.insert(
            "CURRENT_PROJECT_VERSION",
            Value::scalar(&s.current_project_version),
        );
        if let Some(team) = &ctx.development_team {
            settings.insert("DEVELOPMENT_TEAM", Value::scalar(team));
        }
        settings.insert("GENERATE_INFOPLIST_FILE", Value::scalar("YES"));
        settings.insert(
            "IPHONEOS_DEPLOYMENT_TARGET",
            Value::scalar(&s.deployment_target),
        );
        settings.insert(
            "LD_RUNPATH_SEARCH_PATHS",
            Value::list([
                Value::scalar("$(inherited)"),
                Value::scalar("@executable_path/Frameworks"),
                Value::scalar("@loader_path/Frameworks"),
            ]),
        );
        settings.insert("MARKETING_VERSION", Value::scalar(&s.marketing_version));
        settings.insert(
            "PRODUCT_BUNDLE_IDENTIFIER",
            Value::scalar(self.bundle_id(target, ctx)),
        );
        settings.insert("PRODUCT_NAME", Value::scalar("$(TARGET_NAME)"));
        settings.insert("SWIFT_EMIT_LOC_STRINGS", Value::scalar("NO"));
        settings.insert("SWIFT_VERSION", Value::scalar(&s.swift_version));
        match target.kind {
            TestKind::Unit => {
                settings.insert("BUNDLE_LOADER", Value::scalar("$(TEST_HOST)"));
                settings.insert(
                    "TEST_HOST",
                    Value::scalar(format!(
                        "$(BUILT_PRODUCTS_DIR)/{}/$(BUNDLE_EXECUTABLE_FOLDER_PATH)/{}",
                        ctx.main_product,
                        ctx.executable_name()
                    )),
                );
            }
            TestKind::Ui => {
                settings.insert("TEST_TARGET_NAME", Value::scalar(&ctx.main_target_name));
            }
        }
        Value::Dict(
            settings
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Shared splicing helpers
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Layout {
    Block,
    Inline,
}

fn missing(text: &str, anchor: &str) -> (String, StepOutcome) {
    (
        text.to_string(),
        StepOutcome::AnchorMissing {
            anchor: anchor.to_string(),
        },
    )
}

/// Append the records whose identifiers the region does not define yet.
fn append_records(
    text: &str,
    region_name: &str,
    records: &[Record],
    layout: Layout,
) -> Result<(String, StepOutcome)> {
    let doc = Document::parse(text)?;
    let Some(region) = doc.region(region_name)? else {
        return Ok(missing(text, region_name));
    };
    let existing: HashSet<String> = doc.records(&region)?.into_iter().map(|r| r.key).collect();
    let payload: String = records
        .iter()
        .filter(|r| !existing.contains(r.id.as_str()))
        .map(|r| match layout {
            Layout::Block => r.render(),
            Layout::Inline => r.render_inline(),
        })
        .collect();
    if payload.is_empty() {
        return Ok((text.to_string(), StepOutcome::AlreadyPresent));
    }
    Ok((
        region::insert_before_end(text, &region, &payload),
        StepOutcome::Inserted,
    ))
}

/// Like [`append_records`], but creates the region first when it is absent.
fn append_records_creating(
    text: &str,
    region_name: &str,
    records: &[Record],
) -> Result<(String, StepOutcome)> {
    let Some((text, created)) = region::ensure_region(text, region_name)? else {
        return Ok(missing(text, region_name));
    };
    if created {
        debug!(region = region_name, "created region");
    }
    append_records(&text, region_name, records, Layout::Block)
}

fn missing_refs(wanted: &[Value], present: &HashSet<String>) -> Vec<String> {
    wanted
        .iter()
        .filter(|v| match v {
            Value::Ref { id, .. } => !present.contains(id.as_str()),
            _ => true,
        })
        .map(Value::inline)
        .collect()
}

/// Walk nested dictionary attributes of the project record.
fn project_attribute(doc: &Document, project: &ObjectId, path: &[&str]) -> Result<Option<Entry>> {
    let Some(region) = doc.region("PBXProject")? else {
        return Ok(None);
    };
    let Some(mut current) = doc
        .records(&region)?
        .into_iter()
        .find(|r| r.key == project.as_str())
    else {
        return Ok(None);
    };
    for key in path {
        match doc.attribute(&current, key)? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Extend a `PBXGroup` record's `children` list with the refs it lacks.
fn extend_group_children(
    text: &str,
    group: Option<&ObjectId>,
    label: &str,
    refs: &[Value],
) -> Result<(String, StepOutcome)> {
    let Some(group) = group else {
        return Ok(missing(text, label));
    };
    let doc = Document::parse(text)?;
    let Some(region) = doc.region("PBXGroup")? else {
        return Ok(missing(text, "PBXGroup"));
    };
    let Some(record) = doc
        .records(&region)?
        .into_iter()
        .find(|r| r.key == group.as_str())
    else {
        return Ok(missing(text, label));
    };
    let Some(children) = doc.attribute(&record, "children")? else {
        return Ok(missing(text, label));
    };
    let present: HashSet<String> = doc
        .list_items(&children.value)
        .into_iter()
        .map(|i| i.value)
        .collect();
    let entries = missing_refs(refs, &present);
    if entries.is_empty() {
        return Ok((text.to_string(), StepOutcome::AlreadyPresent));
    }
    Ok((
        region::extend_list(text, &children, &entries)?,
        StepOutcome::Inserted,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentifierTable;

    const FIXTURE: &str = include_str!("../tests/fixtures/minimal.pbxproj");

    fn config() -> PatchConfig {
        PatchConfig::new("Soramoyou", IdentifierTable::generate(FIXTURE))
    }

    #[test]
    fn every_step_is_idempotent_on_its_own_output() {
        let cfg = config();
        let patcher = Patcher::new(&cfg);
        for &step in Step::all() {
            let (once, outcome) = patcher.run_step(step, FIXTURE).unwrap();
            assert_eq!(outcome, StepOutcome::Inserted, "step {step}");
            let (twice, outcome) = patcher.run_step(step, &once).unwrap();
            assert_eq!(outcome, StepOutcome::AlreadyPresent, "step {step}");
            assert_eq!(once, twice, "step {step}");
        }
    }

    #[test]
    fn file_references_use_inline_form() {
        let cfg = config();
        let (out, _) = Patcher::new(&cfg)
            .run_step(Step::FileReferences, FIXTURE)
            .unwrap();
        let unit = &cfg.identifiers.unit_tests.product;
        let ui = &cfg.identifiers.ui_tests.product;
        assert!(out.contains(&format!(
            "\t\t{unit} /* SoramoyouTests.xctest */ = {{isa = PBXFileReference; explicitFileType = wrapper.cfbundle; includeInIndex = 0; path = SoramoyouTests.xctest; sourceTree = BUILT_PRODUCTS_DIR; }};\n\
             \t\t{ui} /* SoramoyouUITests.xctest */ = {{isa = PBXFileReference; explicitFileType = wrapper.cfbundle; includeInIndex = 0; path = SoramoyouUITests.xctest; sourceTree = BUILT_PRODUCTS_DIR; }};\n\
             /* End PBXFileReference section */"
        )));
    }

    #[test]
    fn project_targets_keep_main_first_without_duplicating_it() {
        let cfg = config();
        let (out, _) = Patcher::new(&cfg)
            .run_step(Step::ProjectTargets, FIXTURE)
            .unwrap();
        let ids = &cfg.identifiers;
        assert!(out.contains(&format!(
            "\t\t\ttargets = (\n\
             \t\t\t\tE051C9D52EE497CA00CC78AB /* Soramoyou */,\n\
             \t\t\t\t{} /* SoramoyouTests */,\n\
             \t\t\t\t{} /* SoramoyouUITests */,\n\
             \t\t\t);",
            ids.unit_tests.target, ids.ui_tests.target
        )));
    }

    #[test]
    fn project_targets_extend_inline_list_without_trailing_comma() {
        let cfg = config();
        let text = FIXTURE.replace(
            "\t\t\ttargets = (\n\t\t\t\tE051C9D52EE497CA00CC78AB /* Soramoyou */,\n\t\t\t);",
            "\t\t\ttargets = (E051C9D52EE497CA00CC78AB /* Soramoyou */);",
        );
        assert_ne!(text, FIXTURE);
        let patcher = Patcher::new(&cfg);
        let (out, outcome) = patcher.run_step(Step::ProjectTargets, &text).unwrap();
        assert_eq!(outcome, StepOutcome::Inserted);
        assert!(out.contains("targets = (E051C9D52EE497CA00CC78AB /* Soramoyou */,\n"));

        let doc = Document::parse(&out).unwrap();
        let region = doc.region("PBXProject").unwrap().unwrap();
        let project = doc.records(&region).unwrap().remove(0);
        let targets = doc.attribute(&project, "targets").unwrap().unwrap();
        let items: Vec<String> = doc
            .list_items(&targets.value)
            .into_iter()
            .map(|i| i.value)
            .collect();
        assert_eq!(
            items,
            vec![
                "E051C9D52EE497CA00CC78AB".to_string(),
                cfg.identifiers.unit_tests.target.to_string(),
                cfg.identifiers.ui_tests.target.to_string(),
            ]
        );

        let (again, outcome) = patcher.run_step(Step::ProjectTargets, &out).unwrap();
        assert_eq!(outcome, StepOutcome::AlreadyPresent);
        assert_eq!(again, out);
    }

    #[test]
    fn project_targets_reassert_missing_main_target() {
        let cfg = config();
        let text = FIXTURE.replace(
            "\t\t\ttargets = (\n\t\t\t\tE051C9D52EE497CA00CC78AB /* Soramoyou */,\n\t\t\t);",
            "\t\t\ttargets = (\n\t\t\t);",
        );
        let (out, outcome) = Patcher::new(&cfg)
            .run_step(Step::ProjectTargets, &text)
            .unwrap();
        assert_eq!(outcome, StepOutcome::Inserted);
        let list_start = out.find("targets = (").unwrap();
        let main = out[list_start..].find("E051C9D52EE497CA00CC78AB").unwrap();
        let unit = out[list_start..]
            .find(cfg.identifiers.unit_tests.target.as_str())
            .unwrap();
        assert!(main < unit);
    }

    #[test]
    fn target_attributes_point_at_main_target() {
        let cfg = config();
        let (out, _) = Patcher::new(&cfg)
            .run_step(Step::TargetAttributes, FIXTURE)
            .unwrap();
        let unit = &cfg.identifiers.unit_tests.target;
        assert!(out.contains(&format!(
            "\t\t\t\t\t{unit} = {{\n\
             \t\t\t\t\t\tCreatedOnToolsVersion = 26.0;\n\
             \t\t\t\t\t\tTestTargetID = E051C9D52EE497CA00CC78AB;\n\
             \t\t\t\t\t}};\n"
        )));
    }

    #[test]
    fn dependencies_use_distinct_proxies() {
        let cfg = config();
        let (out, _) = Patcher::new(&cfg)
            .run_step(Step::TargetDependencies, FIXTURE)
            .unwrap();
        for ids in [&cfg.identifiers.unit_tests, &cfg.identifiers.ui_tests] {
            assert_ne!(ids.dependency, ids.proxy);
            assert!(out.contains(&format!(
                "\t\t\ttargetProxy = {} /* PBXContainerItemProxy */;",
                ids.proxy
            )));
            assert!(out.contains(&format!("\t\t{} /* PBXContainerItemProxy */ = {{", ids.proxy)));
        }
        assert!(out.contains("\t\t\tcontainerPortal = E051C9CE2EE497CA00CC78AB /* Project object */;"));
        assert!(out.contains("\t\t\tremoteInfo = Soramoyou;"));
    }

    #[test]
    fn unit_tests_inherit_packages_ui_tests_do_not() {
        let cfg = config();
        let (out, _) = Patcher::new(&cfg)
            .run_step(Step::NativeTargets, FIXTURE)
            .unwrap();
        let ui_start = out
            .find(&format!("\t\t{} /* SoramoyouUITests */ = {{", cfg.identifiers.ui_tests.target))
            .unwrap();
        let unit_block = &out[..ui_start];
        let ui_block = &out[ui_start..];
        assert!(unit_block.contains("E051CA4F2EE49B0200CC78AB /* Kingfisher */,"));
        assert!(ui_block.contains("\t\t\tpackageProductDependencies = (\n\t\t\t);"));
        assert!(ui_block.contains("productType = \"com.apple.product-type.bundle.ui-testing\";"));
        assert!(unit_block.contains("productType = \"com.apple.product-type.bundle.unit-test\";"));
    }

    #[test]
    fn build_settings_per_kind() {
        let cfg = config();
        let (out, _) = Patcher::new(&cfg)
            .run_step(Step::BuildConfigurations, FIXTURE)
            .unwrap();
        assert_eq!(
            out.matches("TEST_HOST = \"$(BUILT_PRODUCTS_DIR)/Soramoyou.app/$(BUNDLE_EXECUTABLE_FOLDER_PATH)/Soramoyou\";")
                .count(),
            2
        );
        assert_eq!(out.matches("TEST_TARGET_NAME = Soramoyou;").count(), 2);
        assert_eq!(
            out.matches("PRODUCT_BUNDLE_IDENTIFIER = com.yoshidometoru.SoramoyouTests;")
                .count(),
            2
        );
        assert_eq!(out.matches("DEVELOPMENT_TEAM = B7F79FDM78;").count(), 6);
        assert!(out.contains("defaultConfigurationName = Release;"));
    }

    #[test]
    fn bundle_prefix_override() {
        let mut cfg = config();
        cfg.settings.bundle_id_prefix = Some("org.example.".into());
        let (out, _) = Patcher::new(&cfg)
            .run_step(Step::BuildConfigurations, FIXTURE)
            .unwrap();
        assert!(out.contains("PRODUCT_BUNDLE_IDENTIFIER = org.example.SoramoyouUITests;"));
    }

    #[test]
    fn groups_step_reports_missing_products_group() {
        let mut cfg = config();
        cfg.identifiers.products_group = Some(ObjectId::parse("0123456789ABCDEF01234567").unwrap());
        let (out, outcome) = Patcher::new(&cfg).run_step(Step::Groups, FIXTURE).unwrap();
        assert_eq!(
            outcome,
            StepOutcome::AnchorMissing {
                anchor: "products group".to_string()
            }
        );
        // The root group and the new group records still went in.
        assert!(out.contains(&format!("{} /* SoramoyouTests */,", cfg.identifiers.unit_tests.group)));
    }

    #[test]
    fn already_present_guard() {
        let cfg = config();
        let text = format!("{FIXTURE}// SoramoyouTests SoramoyouUITests\n");
        let report = Patcher::new(&cfg).patch(&text).unwrap();
        assert_eq!(report.status, PatchStatus::AlreadyPresent);
        assert_eq!(report.text, text);
        assert!(report.steps.is_empty());
    }
}
