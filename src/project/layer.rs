use crate::error::{PackError, Result};
use crate::naming::sanitize_table_name;
use crate::provider::{ProviderInfo, ProviderOptions, ProviderRegistry};
use crate::types::Extent;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a map layer, independent of its data source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh id derived from a display name.
    pub fn generate(name: &str) -> Self {
        Self(format!(
            "{}_{}",
            sanitize_table_name(name),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    Vector,
    Raster,
    Mesh,
    VectorTile,
    PointCloud,
    Annotation,
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerType::Vector => "vector",
            LayerType::Raster => "raster",
            LayerType::Mesh => "mesh",
            LayerType::VectorTile => "vector tile",
            LayerType::PointCloud => "point cloud",
            LayerType::Annotation => "annotation",
        };
        f.write_str(name)
    }
}

/// Rendering style of a layer. Opaque to this crate; it is only moved
/// between layers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerStyle(pub serde_json::Value);

impl LayerStyle {
    pub fn read_from_layer(layer: &MapLayer) -> Self {
        layer.style.clone()
    }

    pub fn write_to_layer(&self, layer: &mut MapLayer) {
        layer.style = self.clone();
    }

    fn is_unset(&self) -> bool {
        self.0.is_null()
    }
}

/// A layer of a project: a typed, named reference to data read through a
/// provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapLayer {
    pub id: LayerId,
    pub name: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub provider: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "LayerStyle::is_unset")]
    pub style: LayerStyle,
    /// Result of the last probe. `None` until the layer has been probed.
    #[serde(skip)]
    info: Option<ProviderInfo>,
}

impl PartialEq for MapLayer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.layer_type == other.layer_type
            && self.provider == other.provider
            && self.source == other.source
            && self.style == other.style
    }
}

impl MapLayer {
    /// A new, not yet probed layer with a generated id.
    pub fn new(
        name: impl Into<String>,
        layer_type: LayerType,
        provider: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            id: LayerId::generate(&name),
            name,
            layer_type,
            provider: provider.into(),
            source: source.into(),
            style: LayerStyle::default(),
            info: None,
        }
    }

    /// A new layer, probed immediately.
    pub fn open(
        name: impl Into<String>,
        layer_type: LayerType,
        provider: impl Into<String>,
        source: impl Into<String>,
        registry: &dyn ProviderRegistry,
    ) -> Self {
        let mut layer = Self::new(name, layer_type, provider, source);
        layer.refresh(registry, &ProviderOptions::default());
        layer
    }

    /// Probe the current source again. A probe error leaves the layer invalid.
    pub fn refresh(&mut self, registry: &dyn ProviderRegistry, options: &ProviderOptions) {
        let probed = registry.probe(&self.provider, self.layer_type, &self.source, options);
        self.info = Some(match probed {
            Ok(info) => info,
            Err(err) => {
                tracing::debug!(
                    layer = %self.name,
                    source = %self.source,
                    error = %err,
                    "layer source is not readable"
                );
                ProviderInfo::invalid()
            }
        });
    }

    pub fn is_valid(&self) -> bool {
        self.info.as_ref().is_some_and(|info| info.valid)
    }

    pub fn raster_size(&self) -> Option<(u32, u32)> {
        self.info.as_ref().and_then(|info| info.raster_size)
    }

    pub fn extent(&self) -> Option<Extent> {
        self.info.as_ref().and_then(|info| info.extent)
    }

    /// Point the layer at a new source, then probe it.
    ///
    /// Blank sources or provider keys are rejected without touching the
    /// layer. Otherwise the change is applied even when the new source turns
    /// out to be unreadable; check [`MapLayer::is_valid`] afterwards.
    pub fn set_data_source(
        &mut self,
        source: &str,
        name: &str,
        provider: &str,
        options: &ProviderOptions,
        registry: &dyn ProviderRegistry,
    ) -> Result<()> {
        if source.trim().is_empty() || provider.trim().is_empty() {
            return Err(PackError::InvalidDataSource {
                provider: provider.to_string(),
                source_uri: source.to_string(),
            });
        }
        self.source = source.to_string();
        self.name = name.to_string();
        self.provider = provider.to_string();
        self.refresh(registry, options);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_probe_result(&mut self, info: ProviderInfo) {
        self.info = Some(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GpkgProviders;

    #[test]
    fn generated_ids_are_unique_and_readable() {
        let a = LayerId::generate("Roads A/B");
        let b = LayerId::generate("Roads A/B");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("Roads_A_B_"));
    }

    #[test]
    fn probe_state_is_not_serialized() {
        let mut layer = MapLayer::new(
            "Basemap",
            LayerType::Raster,
            "wms",
            "url=https://example.com/wms",
        );
        assert!(!layer.is_valid());
        layer.refresh(&GpkgProviders, &ProviderOptions::default());
        assert!(layer.is_valid());

        let json = serde_json::to_string(&layer).unwrap();
        assert!(json.contains(r#""type":"raster""#));
        let back: MapLayer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, layer);
        assert!(!back.is_valid());
    }

    #[test]
    fn style_moves_between_layers() {
        let mut source = MapLayer::new("a", LayerType::Vector, "ogr", "a.gpkg");
        source.style = LayerStyle(serde_json::json!({"fill": "#ff0000"}));
        let mut target = MapLayer::new("b", LayerType::Vector, "ogr", "b.gpkg");

        LayerStyle::read_from_layer(&source).write_to_layer(&mut target);
        assert_eq!(target.style, source.style);
    }

    #[test]
    fn set_data_source_with_a_bad_source_invalidates() {
        let mut layer = MapLayer::open("roads", LayerType::Vector, "wfs", "url=x", &GpkgProviders);
        assert!(layer.is_valid());
        layer
            .set_data_source(
                "/nonexistent/out.gpkg|layername=roads",
                "roads",
                "ogr",
                &ProviderOptions::default(),
                &GpkgProviders,
            )
            .unwrap();
        assert!(!layer.is_valid());
        assert_eq!(layer.provider, "ogr");

        let err = layer
            .set_data_source("", "roads", "ogr", &ProviderOptions::default(), &GpkgProviders)
            .unwrap_err();
        assert!(matches!(err, PackError::InvalidDataSource { .. }));
        assert_eq!(layer.source, "/nonexistent/out.gpkg|layername=roads");
    }
}
