use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{LayerId, MapLayer};

fn visible_by_default() -> bool {
    true
}

/// A group of the layer tree. The project root is an unnamed group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerTreeGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub children: Vec<LayerTreeNode>,
}

/// A leaf of the layer tree pointing at a map layer by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerTreeLayer {
    pub layer_id: LayerId,
    pub name: String,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default)]
    pub expanded: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum LayerTreeNode {
    Group(LayerTreeGroup),
    Layer(LayerTreeLayer),
}

impl Default for LayerTreeGroup {
    fn default() -> Self {
        Self::new("")
    }
}

impl LayerTreeGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            expanded: true,
            children: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Append a visible, collapsed node for `layer`.
    pub fn add_layer(&mut self, layer: &MapLayer) {
        self.children.push(LayerTreeNode::Layer(LayerTreeLayer {
            layer_id: layer.id.clone(),
            name: layer.name.clone(),
            visible: true,
            expanded: false,
        }));
    }

    /// Ids of every layer node, depth first.
    pub fn layer_ids(&self) -> Vec<&LayerId> {
        let mut ids = Vec::new();
        self.collect_layer_ids(&mut ids);
        ids
    }

    fn collect_layer_ids<'a>(&'a self, ids: &mut Vec<&'a LayerId>) {
        for child in &self.children {
            match child {
                LayerTreeNode::Group(group) => group.collect_layer_ids(ids),
                LayerTreeNode::Layer(layer) => ids.push(&layer.layer_id),
            }
        }
    }

    /// Rebuild this tree with layer ids mapped through `mapping`.
    ///
    /// Groups keep their name and flags, layer nodes keep their name and
    /// flags and point at the mapped id. Layer nodes without a mapping are
    /// dropped; groups are kept even when that leaves them empty.
    pub fn mirror(&self, mapping: &HashMap<LayerId, LayerId>) -> LayerTreeGroup {
        let mut mirrored = LayerTreeGroup {
            name: self.name.clone(),
            visible: self.visible,
            expanded: self.expanded,
            children: Vec::with_capacity(self.children.len()),
        };

        for child in &self.children {
            match child {
                LayerTreeNode::Group(group) => {
                    mirrored
                        .children
                        .push(LayerTreeNode::Group(group.mirror(mapping)));
                }
                LayerTreeNode::Layer(node) => match mapping.get(&node.layer_id) {
                    Some(new_id) => mirrored.children.push(LayerTreeNode::Layer(LayerTreeLayer {
                        layer_id: new_id.clone(),
                        ..node.clone()
                    })),
                    None => {
                        tracing::debug!(
                            layer = %node.name,
                            "no substitute for layer tree node, dropped"
                        );
                    }
                },
            }
        }
        mirrored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(id: &str, name: &str, visible: bool) -> LayerTreeNode {
        LayerTreeNode::Layer(LayerTreeLayer {
            layer_id: LayerId::new(id),
            name: name.to_string(),
            visible,
            expanded: false,
        })
    }

    #[test]
    fn mirror_keeps_structure_and_flags() {
        let mut base = LayerTreeGroup::new("Base");
        base.visible = false;
        base.expanded = false;
        base.children.push(layer("osm", "OSM Basemap", false));

        let mut root = LayerTreeGroup::default();
        root.children.push(layer("roads", "Roads A/B", true));
        root.children.push(LayerTreeNode::Group(base));
        root.children.push(layer("gone", "Gone", true));

        let mapping = HashMap::from([
            (LayerId::new("roads"), LayerId::new("roads2")),
            (LayerId::new("osm"), LayerId::new("osm2")),
        ]);
        let mirrored = root.mirror(&mapping);

        assert_eq!(mirrored.children.len(), 2);
        assert_eq!(
            mirrored.children[0],
            layer("roads2", "Roads A/B", true)
        );
        let LayerTreeNode::Group(group) = &mirrored.children[1] else {
            panic!("expected a group");
        };
        assert_eq!(group.name, "Base");
        assert!(!group.visible && !group.expanded);
        assert_eq!(group.children, vec![layer("osm2", "OSM Basemap", false)]);
        assert_eq!(
            mirrored.layer_ids(),
            vec![&LayerId::new("roads2"), &LayerId::new("osm2")]
        );
    }

    #[test]
    fn tree_document_shape() {
        let mut root = LayerTreeGroup::default();
        root.children.push(layer("a", "A", true));
        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json["children"][0]["node"], "layer");
        assert_eq!(json["children"][0]["layer_id"], "a");

        let back: LayerTreeGroup =
            serde_json::from_str(r#"{"children":[{"node":"group","name":"G"}]}"#).unwrap();
        let LayerTreeNode::Group(group) = &back.children[0] else {
            panic!("expected a group");
        };
        assert!(group.visible);
    }
}
