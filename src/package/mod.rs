//! Packaging a project's layers into one container.
//!
//! [`Packager::run`] is the worker-side sequence: classify, copy each
//! packageable layer, optionally embed the project, then compute the source
//! updates that the controller applies afterwards with
//! [`crate::rewrite::apply_updates`].

mod summary;
pub mod worker;

use crate::classify::partition;
use crate::config::PackageOptions;
use crate::embed::{EmbeddedProject, GpkgProjectStorage, ProjectEmbedder, ProjectStorage};
use crate::error::{PackError, Result};
use crate::gpkg::Gpkg;
use crate::naming::sanitize_table_name;
use crate::project::{LayerId, LayerType, MapLayer, Project};
use crate::provider::{GDAL, GpkgProviders, OGR, ProviderRegistry, raster_source, vector_source};
use crate::writer::{GpkgLayerWriter, LayerWriter, write_layer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Receives human-readable packaging log lines.
pub trait LogSink: Send + Sync {
    fn log(&self, line: &str);
}

/// Receives log lines and progress percentages (0..=100).
pub trait ProgressSink: LogSink {
    fn progress(&self, percent: u8);
}

/// A layer the packaging loop dealt with.
#[derive(Clone, Debug)]
pub struct ProcessedLayer {
    /// Snapshot of the layer as it was when packaging started.
    pub layer: MapLayer,
    /// Table in the container; `None` for layers kept at their source.
    pub table: Option<String>,
    pub original_name: String,
    pub packageable: bool,
}

/// New source of a live layer, applied on the controller side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerUpdate {
    pub layer_id: LayerId,
    pub source: String,
    pub name: String,
    pub provider: String,
    pub table: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PackageReport {
    pub container: PathBuf,
    /// Display names of the packageable layers now in the container.
    pub processed: Vec<String>,
    pub failed: Vec<String>,
    pub non_packageable: Vec<String>,
    pub updates_prepared: usize,
    pub embedded: Option<EmbeddedProject>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PackageOutcome {
    Completed {
        report: PackageReport,
        updates: Vec<LayerUpdate>,
    },
    Canceled,
}

/// Host collaborators used by the packager.
#[derive(Clone)]
pub struct PackagingServices {
    pub writer: Arc<dyn LayerWriter>,
    pub registry: Arc<dyn ProviderRegistry>,
    pub storage: Arc<dyn ProjectStorage>,
}

impl Default for PackagingServices {
    fn default() -> Self {
        Self {
            writer: Arc::new(GpkgLayerWriter::default()),
            registry: Arc::new(GpkgProviders),
            storage: Arc::new(GpkgProjectStorage),
        }
    }
}

#[derive(Clone, Default)]
pub struct Packager {
    services: PackagingServices,
}

impl Packager {
    pub fn new(services: PackagingServices) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &PackagingServices {
        &self.services
    }

    /// Package every layer of `project` into `options.container`.
    ///
    /// Per-layer failures and embedding failures are reported, not returned.
    /// Only precondition failures are errors.
    pub fn run(
        &self,
        project: &Project,
        options: &PackageOptions,
        cancel: &CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Result<PackageOutcome> {
        let container = options.container.as_path();
        prepare_container(container)?;

        let (packageable, non_packageable) = partition(project.map_layers());
        if packageable.is_empty() && non_packageable.is_empty() {
            return Err(PackError::NoLayers);
        }
        tracing::info!(
            container = %container.display(),
            packageable = packageable.len(),
            non_packageable = non_packageable.len(),
            "packaging started"
        );

        if non_packageable.is_empty() {
            sink.log(&format!("Packaging {} supported layers...", packageable.len()));
        } else {
            sink.log(&format!(
                "Found {} packageable layers and {} non-packageable layers (WMS, etc.)",
                packageable.len(),
                non_packageable.len()
            ));
            let names: Vec<&str> = non_packageable.iter().map(|l| l.name.as_str()).collect();
            sink.log(&format!(
                "Non-packageable layers will be preserved in project: {}",
                summary::first_three(&names)
            ));
        }

        let mut processed = Vec::new();
        let mut failed = Vec::new();
        let total = packageable.len();

        for (i, layer) in packageable.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(canceled(sink));
            }

            let table = sanitize_table_name(&layer.name);
            if let Some(existing) = existing_table(container, &table) {
                sink.log(&format!(
                    "Layer {} (table '{existing}') already exists in GeoPackage",
                    layer.name
                ));
                processed.push(packaged(layer, existing));
            } else {
                sink.log(&format!(
                    "Processing layer {}/{total}: {} (as table '{table}')",
                    i + 1,
                    layer.name
                ));
                match write_layer(
                    self.services.writer.as_ref(),
                    layer,
                    container,
                    &table,
                    &project.transform_context,
                ) {
                    Ok(()) => {
                        sink.log(&format!("Successfully packaged {}", layer.name));
                        processed.push(packaged(layer, table));
                    }
                    Err(err) => {
                        tracing::warn!(
                            layer = %layer.name,
                            table,
                            error = %err,
                            "layer write failed"
                        );
                        sink.log(&format!("Error processing {}: {err}", layer.name));
                        failed.push(layer.name.clone());
                    }
                }
            }

            sink.progress(((i + 1) * 80 / total) as u8);
        }

        // A cancel that arrives during the last write still wins.
        if cancel.is_cancelled() {
            return Ok(canceled(sink));
        }

        for layer in &non_packageable {
            sink.log(&format!(
                "Preserving non-packageable layer in project: {}",
                layer.name
            ));
            processed.push(ProcessedLayer {
                layer: (*layer).clone(),
                table: None,
                original_name: layer.name.clone(),
                packageable: false,
            });
        }

        let embedded = if options.embed_project {
            sink.progress(85);
            sink.log("Saving project to GeoPackage...");
            let embedder = ProjectEmbedder::new(
                self.services.storage.as_ref(),
                self.services.registry.as_ref(),
            );
            let embedded = embedder.embed(
                project,
                container,
                &processed,
                options.project_name.as_deref(),
                sink,
            );
            match &embedded {
                Some(e) => sink.log(&format!("Project saved inside GeoPackage as: {}", e.name)),
                None => sink.log("Could not save project inside GeoPackage"),
            }
            sink.progress(95);
            embedded
        } else {
            None
        };

        sink.log("Preparing layer data source updates...");
        let updates = layer_updates(container, &processed);

        let report = PackageReport {
            container: container.to_path_buf(),
            processed: processed
                .iter()
                .filter(|p| p.packageable)
                .map(|p| p.original_name.clone())
                .collect(),
            failed,
            non_packageable: processed
                .iter()
                .filter(|p| !p.packageable)
                .map(|p| p.original_name.clone())
                .collect(),
            updates_prepared: updates.len(),
            embedded,
        };
        tracing::info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            updates = report.updates_prepared,
            "packaging finished"
        );
        sink.progress(100);
        Ok(PackageOutcome::Completed { report, updates })
    }
}

fn prepare_container(container: &Path) -> Result<()> {
    if let Some(parent) = container.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    if container.exists() && std::fs::metadata(container)?.permissions().readonly() {
        return Err(PackError::NotWritable {
            path: container.to_path_buf(),
        });
    }
    Ok(())
}

/// The stored name of `table` when the container already holds it, in
/// whatever case it was written. An unreadable container counts as not
/// holding it; the write reports the actual problem.
fn existing_table(container: &Path, table: &str) -> Option<String> {
    if !container.exists() {
        return None;
    }
    match Gpkg::open_read_only(container).and_then(|gpkg| gpkg.stored_table_name(table)) {
        Ok(found) => found,
        Err(err) => {
            tracing::debug!(
                container = %container.display(),
                error = %err,
                "cannot inspect container"
            );
            None
        }
    }
}

fn packaged(layer: &MapLayer, table: String) -> ProcessedLayer {
    ProcessedLayer {
        layer: layer.clone(),
        table: Some(table),
        original_name: layer.name.clone(),
        packageable: true,
    }
}

fn canceled(sink: &dyn ProgressSink) -> PackageOutcome {
    tracing::info!("packaging canceled");
    sink.log("Packaging canceled");
    PackageOutcome::Canceled
}

fn layer_updates(container: &Path, processed: &[ProcessedLayer]) -> Vec<LayerUpdate> {
    processed
        .iter()
        .filter(|p| p.packageable && p.layer.is_valid())
        .filter_map(|p| {
            let table = p.table.clone()?;
            let (source, provider) = match p.layer.layer_type {
                LayerType::Vector => (vector_source(container, &table), OGR),
                LayerType::Raster => (raster_source(container, &table), GDAL),
                _ => return None,
            };
            Some(LayerUpdate {
                layer_id: p.layer.id.clone(),
                source,
                name: p.original_name.clone(),
                provider: provider.to_string(),
                table,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::read_embedded_project;
    use crate::project::TransformContext;
    use crate::rewrite::{RewriteReport, apply_updates};
    use crate::test_support::{RecordingSink, point_layer, tile_layer};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source GeoPackage with `roads`, `rivers` and the `ortho` pyramid.
    fn source_package(dir: &Path) -> PathBuf {
        let path = dir.join("source.gpkg");
        let gpkg = Gpkg::create(&path).unwrap();
        point_layer(&gpkg, "roads", 3);
        point_layer(&gpkg, "rivers", 2);
        tile_layer(&gpkg, "ortho", 2);
        path
    }

    fn city_project(dir: &Path, source: &Path) -> Project {
        let mut project = Project::new("City");
        project.set_file_name(dir.join("city.json"));
        for layer in [
            MapLayer::new("Roads A/B", LayerType::Vector, OGR, vector_source(source, "roads")),
            MapLayer::new("OSM Basemap", LayerType::Raster, "wms", "url=https://tile.example.com"),
        ] {
            project.add_map_layer(layer, true);
        }
        project.refresh_layers(&GpkgProviders);
        project
    }

    fn options(container: PathBuf, project_name: Option<&str>) -> PackageOptions {
        PackageOptions {
            container,
            embed_project: project_name.is_some(),
            project_name: project_name.map(str::to_string),
        }
    }

    /// Records the tables it is asked to write and cancels after `cancel_after`.
    struct ScriptedWriter {
        inner: GpkgLayerWriter,
        written: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
        cancel_after: Option<(usize, CancellationToken)>,
        calls: AtomicUsize,
    }

    impl ScriptedWriter {
        fn new() -> Self {
            Self {
                inner: GpkgLayerWriter::default(),
                written: Mutex::new(Vec::new()),
                fail_on: None,
                cancel_after: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn record(&self, table: &str) -> Result<()> {
            if self.fail_on == Some(table) {
                return Err(PackError::Storage("disk full".to_string()));
            }
            self.written.lock().unwrap().push(table.to_string());
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((k, token)) = &self.cancel_after {
                if calls == *k {
                    token.cancel();
                }
            }
            Ok(())
        }
    }

    impl LayerWriter for ScriptedWriter {
        fn write_vector(
            &self,
            layer: &MapLayer,
            container: &Path,
            table: &str,
            tc: &TransformContext,
        ) -> Result<()> {
            if self.fail_on != Some(table) {
                self.inner.write_vector(layer, container, table, tc)?;
            }
            self.record(table)
        }

        fn write_raster(
            &self,
            layer: &MapLayer,
            container: &Path,
            table: &str,
            tc: &TransformContext,
        ) -> Result<()> {
            if self.fail_on != Some(table) {
                self.inner.write_raster(layer, container, table, tc)?;
            }
            self.record(table)
        }
    }

    fn packager_with(writer: Arc<ScriptedWriter>) -> Packager {
        Packager::new(PackagingServices {
            writer,
            ..PackagingServices::default()
        })
    }

    #[test]
    fn packages_vectors_and_preserves_web_layers() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_package(dir.path());
        let project = city_project(dir.path(), &source);
        let container = dir.path().join("out").join("city.gpkg");
        let sink = RecordingSink::default();

        let outcome = Packager::default()
            .run(
                &project,
                &options(container.clone(), Some("MyMap")),
                &CancellationToken::new(),
                &sink,
            )
            .unwrap();
        let PackageOutcome::Completed { report, updates } = outcome else {
            panic!("packaging was canceled");
        };

        assert_eq!(report.processed, vec!["Roads A/B".to_string()]);
        assert_eq!(report.non_packageable, vec!["OSM Basemap".to_string()]);
        assert!(report.failed.is_empty());
        assert_eq!(report.embedded.as_ref().unwrap().name, "MyMap");
        assert_eq!(
            updates,
            vec![LayerUpdate {
                layer_id: project.map_layers()[0].id.clone(),
                source: format!("{}|layername=Roads_A_B", container.display()),
                name: "Roads A/B".to_string(),
                provider: "ogr".to_string(),
                table: "Roads_A_B".to_string(),
            }]
        );

        let gpkg = Gpkg::open_read_only(&container).unwrap();
        assert_eq!(gpkg.list_layers().unwrap(), vec!["Roads_A_B".to_string()]);
        assert_eq!(gpkg.project_names().unwrap(), vec!["MyMap".to_string()]);
        assert_eq!(sink.percentages(), vec![80, 85, 95, 100]);
    }

    #[test]
    fn raster_layers_become_gdal_updates() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_package(dir.path());
        let mut project = Project::new("Ortho");
        project.add_map_layer(
            MapLayer::open(
                "Ortho 2020",
                LayerType::Raster,
                GDAL,
                raster_source(&source, "ortho"),
                &GpkgProviders,
            ),
            true,
        );
        let container = dir.path().join("ortho.gpkg");

        let outcome = Packager::default()
            .run(
                &project,
                &options(container.clone(), None),
                &CancellationToken::new(),
                &RecordingSink::default(),
            )
            .unwrap();
        let PackageOutcome::Completed { report, updates } = outcome else {
            panic!("packaging was canceled");
        };
        assert!(report.embedded.is_none());
        assert_eq!(updates[0].provider, "gdal");
        assert_eq!(updates[0].source, format!("GPKG:{}:Ortho_2020", container.display()));
        let gpkg = Gpkg::open_read_only(&container).unwrap();
        assert_eq!(gpkg.list_tile_tables().unwrap(), vec!["Ortho_2020".to_string()]);
        assert!(gpkg.project_names().unwrap().is_empty());
    }

    #[test]
    fn zero_layers_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Packager::default()
            .run(
                &Project::new("empty"),
                &options(dir.path().join("out.gpkg"), None),
                &CancellationToken::new(),
                &RecordingSink::default(),
            )
            .unwrap_err();
        assert!(matches!(err, PackError::NoLayers));
    }

    #[test]
    fn existing_tables_are_reused_under_their_stored_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_package(dir.path());
        let mut project = city_project(dir.path(), &source);
        let container = dir.path().join("out.gpkg");
        let gpkg = Gpkg::create(&container).unwrap();
        point_layer(&gpkg, "roads_a_b", 1);
        drop(gpkg);

        let writer = Arc::new(ScriptedWriter::new());
        let sink = RecordingSink::default();
        let outcome = packager_with(writer.clone())
            .run(
                &project,
                &options(container.clone(), Some("City")),
                &CancellationToken::new(),
                &sink,
            )
            .unwrap();

        let PackageOutcome::Completed { report, updates } = outcome else {
            panic!("packaging was canceled");
        };
        assert!(writer.written.lock().unwrap().is_empty());
        assert_eq!(report.processed, vec!["Roads A/B".to_string()]);
        assert!(sink.lines().iter().any(|l| l.contains("(table 'roads_a_b') already exists")));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].table, "roads_a_b");
        assert_eq!(updates[0].source, vector_source(&container, "roads_a_b"));

        let embedded = read_embedded_project(&container, "City").unwrap();
        let sources: Vec<&str> = embedded.map_layers().iter().map(|l| l.source.as_str()).collect();
        assert!(sources.contains(&vector_source(&container, "roads_a_b").as_str()));

        let rewrite = apply_updates(&mut project, updates, &GpkgProviders, &sink);
        assert_eq!(rewrite, RewriteReport { updated: 1, failed: 0 });
        assert_eq!(project.map_layers()[0].source, vector_source(&container, "roads_a_b"));
    }

    #[test]
    fn write_failures_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_package(dir.path());
        let mut project = city_project(dir.path(), &source);
        project.add_map_layer(
            MapLayer::open(
                "Rivers",
                LayerType::Vector,
                OGR,
                vector_source(&source, "rivers"),
                &GpkgProviders,
            ),
            true,
        );
        let container = dir.path().join("out.gpkg");

        let writer = Arc::new(ScriptedWriter {
            fail_on: Some("Roads_A_B"),
            ..ScriptedWriter::new()
        });
        let outcome = packager_with(writer.clone())
            .run(
                &project,
                &options(container, None),
                &CancellationToken::new(),
                &RecordingSink::default(),
            )
            .unwrap();

        let PackageOutcome::Completed { report, updates } = outcome else {
            panic!("packaging was canceled");
        };
        assert_eq!(report.failed, vec!["Roads A/B".to_string()]);
        assert_eq!(report.processed, vec!["Rivers".to_string()]);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].table, "Rivers");
    }

    #[test]
    fn cancel_after_k_writes_keeps_k_tables_and_no_updates() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_package(dir.path());
        let mut project = Project::new("Many");
        for name in ["One", "Two", "Three", "Four"] {
            project.add_map_layer(
                MapLayer::open(
                    name,
                    LayerType::Vector,
                    OGR,
                    vector_source(&source, "roads"),
                    &GpkgProviders,
                ),
                true,
            );
        }
        let container = dir.path().join("out.gpkg");
        let token = CancellationToken::new();
        let writer = Arc::new(ScriptedWriter {
            cancel_after: Some((2, token.clone())),
            ..ScriptedWriter::new()
        });

        let outcome = packager_with(writer.clone())
            .run(
                &project,
                &options(container.clone(), Some("p")),
                &token,
                &RecordingSink::default(),
            )
            .unwrap();

        assert_eq!(outcome, PackageOutcome::Canceled);
        assert_eq!(
            *writer.written.lock().unwrap(),
            vec!["One".to_string(), "Two".to_string()]
        );
        let gpkg = Gpkg::open_read_only(&container).unwrap();
        assert_eq!(gpkg.list_layers().unwrap().len(), 2);
        assert!(gpkg.project_names().unwrap().is_empty());
    }
}
