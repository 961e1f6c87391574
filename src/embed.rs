//! Embedding the project definition into the container.
//!
//! A disposable copy of the project is built whose layers point into the
//! container (or keep their original source when they were not packaged),
//! then stored in the `qgis_projects` table. The preferred format is a zip
//! archive written through [`ProjectStorage`]; when that fails the plain
//! document is written directly, which only this crate is guaranteed to read.

use crate::error::{PackError, Result};
use crate::gpkg::Gpkg;
use crate::naming::{DEFAULT_PROJECT_NAME, sanitize_project_name};
use crate::package::{LogSink, ProcessedLayer};
use crate::project::{LayerId, LayerStyle, LayerType, MapLayer, Project};
use crate::provider::{GDAL, OGR, ProviderRegistry, raster_source, vector_source};
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Address of a project stored inside a GeoPackage:
/// `geopackage:{container}?projectName={name}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectStorageUri {
    container: PathBuf,
    project_name: String,
}

impl ProjectStorageUri {
    pub fn new(container: impl Into<PathBuf>, project_name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            project_name: project_name.into(),
        }
    }

    pub fn container(&self) -> &Path {
        &self.container
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }
}

impl fmt::Display for ProjectStorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "geopackage:{}?projectName={}",
            self.container.display(),
            self.project_name
        )
    }
}

/// Native, container-aware project storage.
pub trait ProjectStorage: Send + Sync {
    fn write(&self, project: &Project, uri: &ProjectStorageUri) -> Result<()>;
    fn read(&self, uri: &ProjectStorageUri) -> Result<Project>;
}

/// Stores a project as a zip archive holding `{name}.json`, with a small JSON
/// metadata object next to it.
#[derive(Clone, Copy, Debug, Default)]
pub struct GpkgProjectStorage;

impl ProjectStorage for GpkgProjectStorage {
    fn write(&self, project: &Project, uri: &ProjectStorageUri) -> Result<()> {
        let name = uri.project_name();
        let archive = project_archive(name, &project.to_document()?)?;
        let metadata = serde_json::json!({
            "last_modified_time": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "last_modified_user": login_name(),
        });

        let gpkg = Gpkg::open_or_create(uri.container())?;
        gpkg.upsert_project(name, &metadata.to_string(), &archive)?;
        Ok(())
    }

    fn read(&self, uri: &ProjectStorageUri) -> Result<Project> {
        let gpkg = Gpkg::open_read_only(uri.container())?;
        let stored = gpkg
            .read_project(uri.project_name())?
            .ok_or_else(|| PackError::ProjectNotFound {
                name: uri.project_name().to_string(),
            })?;
        decode_project(&stored.content)
    }
}

fn login_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

fn project_archive(name: &str, document: &str) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(format!("{name}.json"), options)?;
    zip.write_all(document.as_bytes())?;
    Ok(zip.finish()?.into_inner())
}

/// Decode stored content: a zip archive holding a `.json` document, or the
/// document itself.
fn decode_project(content: &[u8]) -> Result<Project> {
    if !content.starts_with(b"PK\x03\x04") {
        return Project::from_document(&String::from_utf8_lossy(content));
    }

    let mut archive = ZipArchive::new(Cursor::new(content))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.name().ends_with(".json") {
            let mut document = String::new();
            entry.read_to_string(&mut document)?;
            return Project::from_document(&document);
        }
    }
    Err(PackError::Storage(
        "project archive holds no project document".to_string(),
    ))
}

/// A project that ended up inside the container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedProject {
    pub name: String,
    /// Written through the direct SQL fallback rather than native storage.
    pub reduced_compatibility: bool,
}

/// Resolve the stored project name: the hint, else the project's base name,
/// else the default, then sanitized.
pub fn resolve_project_name(name_hint: Option<&str>, project: &Project) -> String {
    let raw = name_hint
        .map(str::trim)
        .filter(|hint| !hint.is_empty())
        .map(str::to_string)
        .or_else(|| project.base_name())
        .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());
    sanitize_project_name(&raw)
}

pub struct ProjectEmbedder<'a> {
    storage: &'a dyn ProjectStorage,
    registry: &'a dyn ProviderRegistry,
}

impl<'a> ProjectEmbedder<'a> {
    pub fn new(storage: &'a dyn ProjectStorage, registry: &'a dyn ProviderRegistry) -> Self {
        Self { storage, registry }
    }

    /// Embed `project` into `container`. Never fails the caller: problems are
    /// logged and reported as `None`.
    pub fn embed<L: LogSink + ?Sized>(
        &self,
        project: &Project,
        container: &Path,
        processed: &[ProcessedLayer],
        name_hint: Option<&str>,
        log: &L,
    ) -> Option<EmbeddedProject> {
        let name = resolve_project_name(name_hint, project);
        log.log(&format!("Saving project as: {name}"));

        let disposable = self.disposable_project(project, container, processed, log);
        let uri = ProjectStorageUri::new(container, name.clone());

        match self.storage.write(&disposable, &uri) {
            Ok(()) => {
                log.log("Project saved to the GeoPackage");
                if let Err(err) = register_project(&disposable, &uri) {
                    tracing::warn!(error = %err, "project registration failed");
                    log.log(&format!("Could not register project in qgis_projects: {err}"));
                }
                Some(EmbeddedProject {
                    name,
                    reduced_compatibility: false,
                })
            }
            Err(err) => {
                tracing::warn!(uri = %uri, error = %err, "native project storage failed");
                log.log(&format!(
                    "Native project storage failed ({err}), writing the project document directly"
                ));
                match store_document(&disposable, &uri) {
                    Ok(()) => {
                        log.log(&format!(
                            "Project saved as a plain document: {name} (reduced compatibility, readable by this tool)"
                        ));
                        Some(EmbeddedProject {
                            name,
                            reduced_compatibility: true,
                        })
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "direct project storage failed");
                        log.log(&format!("Project could not be saved: {err}"));
                        None
                    }
                }
            }
        }
    }

    /// Copy of `project` whose layers point into the container. Substitutes
    /// that fail to open are logged and left out.
    pub fn disposable_project<L: LogSink + ?Sized>(
        &self,
        project: &Project,
        container: &Path,
        processed: &[ProcessedLayer],
        log: &L,
    ) -> Project {
        let mut disposable = Project::new(project.title.clone());
        disposable.crs = project.crs.clone();
        disposable.metadata = project.metadata.clone();
        disposable.transform_context = project.transform_context.clone();

        let mut mapping: HashMap<LayerId, LayerId> = HashMap::new();
        for record in processed {
            let original = &record.layer;
            let (provider, source) = match (&record.table, original.layer_type) {
                (Some(table), LayerType::Vector) if record.packageable => {
                    (OGR.to_string(), vector_source(container, table))
                }
                (Some(table), LayerType::Raster) if record.packageable => {
                    (GDAL.to_string(), raster_source(container, table))
                }
                _ => (original.provider.clone(), original.source.clone()),
            };

            let mut substitute = MapLayer::open(
                record.original_name.clone(),
                original.layer_type,
                provider,
                source,
                self.registry,
            );
            if !substitute.is_valid() {
                log.log(&format!(
                    "Failed to create project layer: {}",
                    record.original_name
                ));
                continue;
            }

            LayerStyle::read_from_layer(original).write_to_layer(&mut substitute);
            let id = disposable.add_map_layer(substitute, false);
            mapping.insert(original.id.clone(), id);
            if record.packageable {
                log.log(&format!("Added GPKG layer: {}", record.original_name));
            } else {
                log.log(&format!(
                    "Preserved non-packageable layer: {}",
                    record.original_name
                ));
            }
        }

        *disposable.layer_tree_mut() = project.layer_tree().mirror(&mapping);
        disposable
    }
}

/// Make sure the project is enumerable from `qgis_projects`.
///
/// [`GpkgProjectStorage`] writes that row itself, which is then left alone.
/// Only a storage that keeps the project elsewhere leaves the row missing;
/// the plain document is inserted for it then.
fn register_project(project: &Project, uri: &ProjectStorageUri) -> Result<()> {
    let gpkg = Gpkg::open_or_create(uri.container())?;
    if gpkg.read_project(uri.project_name())?.is_some() {
        return Ok(());
    }
    tracing::debug!(uri = %uri, "registering project row");
    gpkg.upsert_project(
        uri.project_name(),
        &fallback_metadata(uri.project_name()),
        project.to_document()?.as_bytes(),
    )
}

fn fallback_metadata(name: &str) -> String {
    format!("Project: {name}")
}

fn store_document(project: &Project, uri: &ProjectStorageUri) -> Result<()> {
    let gpkg = Gpkg::open_or_create(uri.container())?;
    let name = uri.project_name();
    gpkg.upsert_project(name, &fallback_metadata(name), project.to_document()?.as_bytes())?;
    if gpkg.read_project(name)?.is_none() {
        return Err(PackError::Storage(format!(
            "project '{name}' missing after write"
        )));
    }
    Ok(())
}

/// Names of the projects embedded in a container.
pub fn list_embedded_projects(container: &Path) -> Result<Vec<String>> {
    Gpkg::open_read_only(container)?.project_names()
}

/// Read an embedded project back, whichever format it was stored in.
pub fn read_embedded_project(container: &Path, name: &str) -> Result<Project> {
    GpkgProjectStorage.read(&ProjectStorageUri::new(container, name))
}
