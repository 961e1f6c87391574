//! Pointing the live project at the container once packaging is done.

use crate::package::{LayerUpdate, LogSink};
use crate::project::{LayerType, MapLayer, Project};
use crate::provider::{GDAL, OGR, ProviderOptions, ProviderRegistry};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub updated: usize,
    pub failed: usize,
}

fn probe_type(provider: &str) -> Option<LayerType> {
    if provider.eq_ignore_ascii_case(OGR) {
        Some(LayerType::Vector)
    } else if provider.eq_ignore_ascii_case(GDAL) {
        Some(LayerType::Raster)
    } else {
        None
    }
}

/// Apply source updates to the live project.
///
/// Every new source is first opened on a throwaway layer; only sources that
/// open are applied. Layers are updated one by one, so a failure part way
/// leaves the earlier updates in place.
pub fn apply_updates(
    project: &mut Project,
    updates: Vec<LayerUpdate>,
    registry: &dyn ProviderRegistry,
    log: &dyn LogSink,
) -> RewriteReport {
    log.log("Updating layer data sources...");
    let mut report = RewriteReport::default();

    let mut valid = Vec::with_capacity(updates.len());
    for update in updates {
        let readable = probe_type(&update.provider).is_some_and(|layer_type| {
            MapLayer::open(
                "test_layer",
                layer_type,
                update.provider.as_str(),
                update.source.as_str(),
                registry,
            )
            .is_valid()
        });
        if readable {
            log.log(&format!("Data source valid: {}", update.name));
            valid.push(update);
        } else {
            log.log(&format!("Invalid data source for: {}", update.name));
            report.failed += 1;
        }
    }

    for update in valid {
        let Some(layer) = project.map_layer_mut(&update.layer_id) else {
            log.log(&format!("Layer not found: {}", update.name));
            report.failed += 1;
            continue;
        };

        let applied = layer.set_data_source(
            &update.source,
            &update.name,
            &update.provider,
            &ProviderOptions::default(),
            registry,
        );
        match applied {
            Ok(()) if layer.is_valid() => {
                log.log(&format!("Updated: {}", update.name));
                report.updated += 1;
            }
            Ok(()) => {
                log.log(&format!("Layer became invalid after update: {}", update.name));
                report.failed += 1;
            }
            Err(err) => {
                log.log(&format!("Error updating {}: {err}", update.name));
                report.failed += 1;
            }
        }
    }

    log.log(&format!("Successfully updated {} layers", report.updated));
    if report.failed > 0 {
        log.log(&format!("Failed to update {} layers", report.failed));
    }
    tracing::info!(updated = report.updated, failed = report.failed, "layer sources rewritten");
    report
}
