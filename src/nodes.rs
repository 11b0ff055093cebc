use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum NodeRegistryError {
    #[error("failed to read node registry {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse node registry {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("node {node_id}: latitude {lat} out of range")]
    InvalidLatitude { node_id: String, lat: f64 },
    #[error("node {node_id}: longitude {lon} out of range")]
    InvalidLongitude { node_id: String, lon: f64 },
}

/// Location and display metadata for one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLocation {
    pub node_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Static per-node metadata loaded at startup. Nodes missing from the
/// registry are still ingested; they just never get a weather forecast.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, NodeLocation>,
}

impl NodeRegistry {
    /// Loads the registry from a JSON array of node entries. A missing file
    /// yields an empty registry; invalid coordinates are fatal.
    pub fn load(path: &Path) -> Result<Self, NodeRegistryError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Node registry file not found; weather lookups disabled.");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(NodeRegistryError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let entries: Vec<NodeLocation> =
            serde_json::from_str(&contents).map_err(|source| NodeRegistryError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<NodeLocation>) -> Result<Self, NodeRegistryError> {
        let mut nodes = HashMap::new();
        for entry in entries {
            if !(-90.0..=90.0).contains(&entry.lat) {
                return Err(NodeRegistryError::InvalidLatitude {
                    node_id: entry.node_id,
                    lat: entry.lat,
                });
            }
            if !(-180.0..=180.0).contains(&entry.lon) {
                return Err(NodeRegistryError::InvalidLongitude {
                    node_id: entry.node_id,
                    lon: entry.lon,
                });
            }
            nodes.insert(entry.node_id.clone(), entry);
        }
        Ok(Self { nodes })
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeLocation> {
        self.nodes.get(node_id)
    }

    pub fn all(&self) -> Vec<&NodeLocation> {
        let mut all: Vec<&NodeLocation> = self.nodes.values().collect();
        all.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        all
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(node_id: &str, lat: f64, lon: f64) -> NodeLocation {
        NodeLocation {
            node_id: node_id.to_string(),
            name: format!("Node {node_id}"),
            lat,
            lon,
        }
    }

    #[test]
    fn lookup_by_node_id() {
        let registry =
            NodeRegistry::from_entries(vec![entry("!a", 51.5, -0.1), entry("!b", 48.9, 2.3)])
                .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("!a").unwrap().lat, 51.5);
        assert!(registry.get("!missing").is_none());
    }

    #[test]
    fn out_of_range_coordinates_are_fatal() {
        assert!(matches!(
            NodeRegistry::from_entries(vec![entry("!a", 95.0, 0.0)]),
            Err(NodeRegistryError::InvalidLatitude { .. })
        ));
        assert!(matches!(
            NodeRegistry::from_entries(vec![entry("!a", 0.0, 200.0)]),
            Err(NodeRegistryError::InvalidLongitude { .. })
        ));
    }

    #[test]
    fn missing_file_yields_empty_registry() {
        let registry = NodeRegistry::load(Path::new("/nonexistent/nodes.json")).unwrap();
        assert!(registry.is_empty());
    }
}
