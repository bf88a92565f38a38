//! Avatar scene state — the mutable slice of the scene graph this engine owns.
//!
//! Rendering is an external capability: the renderer reads morph influences
//! and the head orientation every paint frame. This module holds exactly
//! that state, loaded from a JSON avatar manifest exported alongside the
//! model asset.

use glam::Quat;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("avatar manifest parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("manifest read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("mesh {mesh}: morph target {name:?} index {index} exceeds channel count {count}")]
    ChannelOutOfRange {
        mesh: String,
        name: String,
        index: usize,
        count: usize,
    },
}

/// JSON avatar manifest: per-mesh morph-target dictionaries.
#[derive(Debug, Deserialize)]
struct Manifest {
    meshes: Vec<ManifestMesh>,
}

#[derive(Debug, Deserialize)]
struct ManifestMesh {
    name: String,
    /// Raw morph-target name → channel index. Absent for meshes without
    /// morph channels (hair, clothing).
    #[serde(default)]
    morph_targets: HashMap<String, usize>,
    /// Total influence channels on the mesh, when the exporter states it.
    /// Inferred from the dictionary otherwise.
    #[serde(default)]
    channel_count: Option<usize>,
}

/// One avatar mesh with its morph-channel dictionary and influence values.
///
/// `influences` is the smoothed state itself — there is no separate buffer.
/// Channels are fixed after load; only the values mutate.
#[derive(Debug)]
pub struct MorphMesh {
    pub name: String,
    dictionary: HashMap<String, usize>,
    pub influences: Vec<f32>,
}

impl MorphMesh {
    /// Build a mesh from a raw dictionary, sizing influences from the
    /// highest registered channel index.
    pub fn new(name: String, dictionary: HashMap<String, usize>) -> Result<Self, SceneError> {
        Self::with_channel_count(name, dictionary, None)
    }

    /// Like [`new`](Self::new), but with an exporter-declared channel count
    /// that every dictionary index must fit within.
    pub fn with_channel_count(
        name: String,
        dictionary: HashMap<String, usize>,
        declared: Option<usize>,
    ) -> Result<Self, SceneError> {
        let inferred = dictionary.values().map(|&i| i + 1).max().unwrap_or(0);
        let count = declared.unwrap_or(inferred);
        for (raw, &index) in &dictionary {
            if index >= count {
                return Err(SceneError::ChannelOutOfRange {
                    mesh: name,
                    name: raw.clone(),
                    index,
                    count,
                });
            }
        }
        Ok(Self {
            name,
            dictionary,
            influences: vec![0.0; count],
        })
    }

    /// Typed capability check: `Some` when this mesh carries morph channels.
    ///
    /// Meshes without channels are valid scene members; the index simply
    /// skips them.
    pub fn morph_channels(&self) -> Option<&HashMap<String, usize>> {
        if self.dictionary.is_empty() {
            None
        } else {
            Some(&self.dictionary)
        }
    }
}

/// The avatar's head node. Orientation is mutated in place each tick by
/// spherical interpolation; position and scale belong to scene layout and
/// are never driven by tracking.
pub struct HeadNode {
    pub orientation: Quat,
}

impl Default for HeadNode {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
        }
    }
}

/// Mutable avatar state: meshes with morph influences plus the head node.
pub struct AvatarScene {
    pub meshes: Vec<MorphMesh>,
    pub head: HeadNode,
}

impl AvatarScene {
    pub fn new(meshes: Vec<MorphMesh>) -> Self {
        Self {
            meshes,
            head: HeadNode::default(),
        }
    }

    /// Load avatar state from a JSON manifest.
    pub fn from_manifest_reader(reader: impl Read) -> Result<Self, SceneError> {
        let manifest: Manifest = serde_json::from_reader(reader)?;
        let mut meshes = Vec::with_capacity(manifest.meshes.len());
        for m in manifest.meshes {
            let mesh = MorphMesh::with_channel_count(m.name, m.morph_targets, m.channel_count)?;
            tracing::debug!(
                mesh = %mesh.name,
                channels = mesh.influences.len(),
                "loaded avatar mesh"
            );
            meshes.push(mesh);
        }
        Ok(Self::new(meshes))
    }

    pub fn from_manifest_str(json: &str) -> Result<Self, SceneError> {
        Self::from_manifest_reader(json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: &[(&str, usize)]) -> HashMap<String, usize> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_mesh_influences_sized_from_max_index() {
        let mesh = MorphMesh::new("face".into(), dict(&[("smile", 0), ("jawOpen", 3)])).unwrap();
        assert_eq!(mesh.influences.len(), 4);
        assert!(mesh.influences.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_mesh_without_channels_has_no_capability() {
        let mesh = MorphMesh::new("hair".into(), HashMap::new()).unwrap();
        assert!(mesh.morph_channels().is_none());
        assert!(mesh.influences.is_empty());
    }

    #[test]
    fn test_manifest_roundtrip() {
        let json = r#"{
            "meshes": [
                {"name": "face", "morph_targets": {"ARKit.smile": 0, "ARKit.jawOpen": 1}},
                {"name": "hair"}
            ]
        }"#;
        let scene = AvatarScene::from_manifest_str(json).unwrap();
        assert_eq!(scene.meshes.len(), 2);
        assert!(scene.meshes[0].morph_channels().is_some());
        assert!(scene.meshes[1].morph_channels().is_none());
        assert_eq!(scene.head.orientation, Quat::IDENTITY);
    }

    #[test]
    fn test_declared_count_sizes_influences() {
        let mesh =
            MorphMesh::with_channel_count("face".into(), dict(&[("smile", 0)]), Some(52)).unwrap();
        assert_eq!(mesh.influences.len(), 52);
    }

    #[test]
    fn test_index_exceeding_declared_count_rejected() {
        let err =
            MorphMesh::with_channel_count("face".into(), dict(&[("smile", 9)]), Some(4))
                .unwrap_err();
        assert!(matches!(err, SceneError::ChannelOutOfRange { index: 9, count: 4, .. }));
    }

    #[test]
    fn test_manifest_parse_error() {
        assert!(matches!(
            AvatarScene::from_manifest_str("not json"),
            Err(SceneError::Parse(_))
        ));
    }
}
