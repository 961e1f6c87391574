//! Which layers can be copied into the container.

use crate::project::{LayerType, MapLayer};
use crate::provider::{is_file_raster_provider, is_remote_provider};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Packageable,
    NonPackageable,
}

/// Classify a layer from its provider key, type and last probe result.
///
/// Remote and streaming providers are never packageable. Otherwise a valid
/// vector layer is, and so is a valid raster layer on a file provider whose
/// probed pixel size is non-zero. A layer without probe information is
/// treated as invalid.
pub fn classify(layer: &MapLayer) -> Classification {
    if !layer.is_valid() || is_remote_provider(&layer.provider) {
        return Classification::NonPackageable;
    }

    let packageable = match layer.layer_type {
        LayerType::Vector => true,
        LayerType::Raster => {
            is_file_raster_provider(&layer.provider)
                && layer
                    .raster_size()
                    .is_some_and(|(width, height)| width > 0 && height > 0)
        }
        LayerType::Mesh | LayerType::VectorTile | LayerType::PointCloud | LayerType::Annotation => {
            false
        }
    };

    if packageable {
        Classification::Packageable
    } else {
        Classification::NonPackageable
    }
}

/// Split layers into (packageable, non-packageable), keeping project order.
pub fn partition(layers: &[MapLayer]) -> (Vec<&MapLayer>, Vec<&MapLayer>) {
    layers
        .iter()
        .partition(|layer| classify(layer) == Classification::Packageable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderInfo, REMOTE_PROVIDER_KINDS};

    fn probed(layer_type: LayerType, provider: &str, raster_size: Option<(u32, u32)>) -> MapLayer {
        let mut layer = MapLayer::new("layer", layer_type, provider, "source");
        layer.set_probe_result(ProviderInfo {
            valid: true,
            raster_size,
            extent: None,
        });
        layer
    }

    #[test]
    fn file_layers_are_packageable() {
        assert_eq!(classify(&probed(LayerType::Vector, "ogr", None)), Classification::Packageable);
        assert_eq!(
            classify(&probed(LayerType::Raster, "gdal", Some((512, 256)))),
            Classification::Packageable
        );
    }

    #[test]
    fn remote_providers_are_never_packageable() {
        for kind in REMOTE_PROVIDER_KINDS {
            for layer_type in [LayerType::Vector, LayerType::Raster] {
                let layer = probed(layer_type, &kind.to_uppercase(), Some((1, 1)));
                assert_eq!(classify(&layer), Classification::NonPackageable, "{kind}");
            }
        }
    }

    #[test]
    fn invalid_or_empty_layers_are_not_packageable() {
        let unprobed = MapLayer::new("roads", LayerType::Vector, "ogr", "roads.gpkg");
        assert_eq!(classify(&unprobed), Classification::NonPackageable);
        for size in [None, Some((0, 10)), Some((10, 0))] {
            assert_eq!(
                classify(&probed(LayerType::Raster, "gdal", size)),
                Classification::NonPackageable
            );
        }
        assert_eq!(
            classify(&probed(LayerType::Raster, "postgresraster", Some((1, 1)))),
            Classification::NonPackageable
        );
        assert_eq!(
            classify(&probed(LayerType::Mesh, "ogr", None)),
            Classification::NonPackageable
        );
    }

    #[test]
    fn partition_keeps_order() {
        let layers = vec![
            probed(LayerType::Raster, "wms", None),
            probed(LayerType::Vector, "ogr", None),
            probed(LayerType::Vector, "ogr", None),
        ];
        let (packageable, other) = partition(&layers);
        assert_eq!(packageable.len(), 2);
        assert!(std::ptr::eq(packageable[0], &layers[1]));
        assert_eq!(other.len(), 1);
    }
}
