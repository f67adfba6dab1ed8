//! Resolve the pre-existing objects the insertion steps refer to.

use crate::config::{PatchConfig, ProductRef};
use crate::error::{PatchError, Result};
use crate::ident::ObjectId;
use crate::region::{Document, Entry, ValueKind};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectContext {
    pub project: ObjectId,
    pub main_target: ObjectId,
    pub main_target_name: String,
    /// Product path of the main target, e.g. `App.app`.
    pub main_product: String,
    pub root_group: Option<ObjectId>,
    pub products_group: Option<ObjectId>,
    pub package_products: Vec<ProductRef>,
    pub development_team: Option<String>,
    pub main_bundle_id: Option<String>,
}

impl ProjectContext {
    /// Executable name inside the main product bundle.
    pub fn executable_name(&self) -> &str {
        self.main_product
            .strip_suffix(".app")
            .unwrap_or(&self.main_product)
    }
}

fn ref_attr(doc: &Document, record: &Entry, key: &str) -> Result<Option<ObjectId>> {
    Ok(doc
        .scalar(record, key)?
        .and_then(|s| ObjectId::parse(&s).ok()))
}

pub fn discover(text: &str, config: &PatchConfig) -> Result<ProjectContext> {
    let doc = Document::parse(text)?;
    let ids = &config.identifiers;

    let project_record = match doc.region("PBXProject")? {
        Some(region) => {
            let mut records = doc.records(&region)?.into_iter();
            match &ids.project {
                Some(id) => records.find(|r| r.key == id.as_str()),
                None => records.next(),
            }
        }
        None => None,
    };
    let project = match (&ids.project, &project_record) {
        (Some(id), _) => id.clone(),
        (None, Some(rec)) => ObjectId::parse(&rec.key)?,
        (None, None) => return Err(PatchError::RecordNotFound("PBXProject".to_string())),
    };

    let (root_group, products_group) = match &project_record {
        Some(rec) => (
            ref_attr(&doc, rec, "mainGroup")?,
            ref_attr(&doc, rec, "productRefGroup")?,
        ),
        None => (None, None),
    };

    let targets = match doc.region("PBXNativeTarget")? {
        Some(region) => doc.records(&region)?,
        None => Vec::new(),
    };
    let mut main_record = None;
    for t in targets {
        let by_id = ids.main_target.as_ref().is_some_and(|id| id.as_str() == t.key);
        let by_name = doc.scalar(&t, "name")?.as_deref() == Some(config.main_target.as_str());
        if by_id || (ids.main_target.is_none() && by_name) {
            main_record = Some(t);
            break;
        }
    }

    let main_target = match (&ids.main_target, &main_record) {
        (_, Some(rec)) => ObjectId::parse(&rec.key)?,
        (Some(id), None) => id.clone(),
        (None, None) => return Err(PatchError::MainTargetNotFound(config.main_target.clone())),
    };

    let main_target_name = match &main_record {
        Some(rec) => doc
            .scalar(rec, "name")?
            .unwrap_or_else(|| config.main_target.clone()),
        None => config.main_target.clone(),
    };
    let mut main_product = format!("{main_target_name}.app");
    let mut inherited = Vec::new();
    let mut build_settings = InheritedSettings::default();

    if let Some(rec) = &main_record {
        if let Some(product) = doc.attribute(rec, "productReference")? {
            if let Some(c) = product.value_comment {
                main_product = c;
            }
        }
        if let Some(deps) = doc.attribute(rec, "packageProductDependencies")? {
            for item in doc.list_items(&deps.value) {
                let Ok(id) = ObjectId::parse(&item.value) else {
                    continue;
                };
                let name = item.comment.unwrap_or_else(|| id.to_string());
                if config.excluded_packages.contains(&name) {
                    debug!(product = %name, "skipping excluded package product");
                    continue;
                }
                if !inherited.iter().any(|p: &ProductRef| p.id == id) {
                    inherited.push(ProductRef { id, name });
                }
            }
        }
        if let Some(list_id) = ref_attr(&doc, rec, "buildConfigurationList")? {
            build_settings = read_build_settings(&doc, &list_id)?;
        }
    }

    let package_products = match &config.package_products {
        Some(explicit) => explicit.clone(),
        None => inherited,
    };

    Ok(ProjectContext {
        project,
        main_target,
        main_target_name,
        main_product,
        root_group: ids.root_group.clone().or(root_group),
        products_group: ids.products_group.clone().or(products_group),
        package_products,
        development_team: config
            .settings
            .development_team
            .clone()
            .or(build_settings.development_team),
        main_bundle_id: build_settings.bundle_id,
    })
}

#[derive(Default)]
struct InheritedSettings {
    development_team: Option<String>,
    bundle_id: Option<String>,
}

/// Read settings from the first configuration of a configuration list.
fn read_build_settings(doc: &Document, list_id: &ObjectId) -> Result<InheritedSettings> {
    let mut found = InheritedSettings::default();
    let Some(list) = doc.find_record(list_id.as_str())? else {
        return Ok(found);
    };
    let Some(configs) = doc.attribute(&list, "buildConfigurations")? else {
        return Ok(found);
    };
    let Some(first) = doc.list_items(&configs.value).into_iter().next() else {
        return Ok(found);
    };
    let Some(config) = doc.find_record(&first.value)? else {
        return Ok(found);
    };
    if let Some(settings) = doc.attribute(&config, "buildSettings")? {
        if settings.value.kind == ValueKind::Dict {
            found.development_team = doc.scalar(&settings, "DEVELOPMENT_TEAM")?;
            found.bundle_id = doc.scalar(&settings, "PRODUCT_BUNDLE_IDENTIFIER")?;
        }
    }
    Ok(found)
}
