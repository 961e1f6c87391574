//! The project model: layers, layer tree, CRS, metadata and the transform
//! context, persisted as a JSON project document.

mod layer;
mod tree;

pub use layer::{LayerId, LayerStyle, LayerType, MapLayer};
pub use tree::{LayerTreeGroup, LayerTreeLayer, LayerTreeNode};

use crate::error::Result;
use crate::provider::{ProviderOptions, ProviderRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Coordinate reference system of the project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crs {
    /// Authority identifier such as `EPSG:3857`.
    pub authid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkt: Option<String>,
}

/// A preferred operation between two CRSs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateOperation {
    pub source_crs: String,
    pub destination_crs: String,
    pub operation: String,
}

/// Datum transformation preferences. Carried along untouched; nothing in
/// this crate reprojects.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<CoordinateOperation>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Where the document was loaded from or last saved to.
    #[serde(skip)]
    file_name: Option<PathBuf>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<Crs>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub transform_context: TransformContext,
    #[serde(default)]
    layers: Vec<MapLayer>,
    #[serde(default)]
    layer_tree: LayerTreeGroup,
}

impl Project {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Read a project document and probe every layer.
    ///
    /// Documents without a layer tree get a flat one listing every layer.
    pub fn load<P: AsRef<Path>>(path: P, registry: &dyn ProviderRegistry) -> Result<Self> {
        let path = path.as_ref();
        let mut project = Self::from_document(&std::fs::read_to_string(path)?)?;
        project.file_name = Some(path.to_path_buf());
        project.refresh_layers(registry);
        if project.layer_tree.is_empty() {
            for layer in &project.layers {
                project.layer_tree.add_layer(layer);
            }
        }
        tracing::debug!(path = %path.display(), layers = project.layers.len(), "project loaded");
        Ok(project)
    }

    /// Write the project document and remember `path` as its file name.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_document()?)?;
        self.file_name = Some(path.to_path_buf());
        Ok(())
    }

    pub fn to_document(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a project document. Layers are left unprobed.
    pub fn from_document(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    pub fn set_file_name(&mut self, path: impl Into<PathBuf>) {
        self.file_name = Some(path.into());
    }

    /// File stem of the project file, if it has one.
    pub fn base_name(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
    }

    pub fn map_layers(&self) -> &[MapLayer] {
        &self.layers
    }

    pub fn map_layer(&self, id: &LayerId) -> Option<&MapLayer> {
        self.layers.iter().find(|layer| &layer.id == id)
    }

    pub fn map_layer_mut(&mut self, id: &LayerId) -> Option<&mut MapLayer> {
        self.layers.iter_mut().find(|layer| &layer.id == id)
    }

    /// Register a layer, optionally appending it to the root of the tree.
    pub fn add_map_layer(&mut self, layer: MapLayer, add_to_tree: bool) -> LayerId {
        if add_to_tree {
            self.layer_tree.add_layer(&layer);
        }
        let id = layer.id.clone();
        self.layers.push(layer);
        id
    }

    pub fn refresh_layers(&mut self, registry: &dyn ProviderRegistry) {
        let options = ProviderOptions {
            transform_context: self.transform_context.clone(),
        };
        for layer in &mut self.layers {
            layer.refresh(registry, &options);
        }
    }

    pub fn layer_tree(&self) -> &LayerTreeGroup {
        &self.layer_tree
    }

    pub fn layer_tree_mut(&mut self) -> &mut LayerTreeGroup {
        &mut self.layer_tree
    }
}
