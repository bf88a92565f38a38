//! Morph-target index — one-time name→channel lookup built at avatar load.
//!
//! Blendshape vocabularies rarely match avatar morph-target names exactly:
//! exporters prepend rig or group qualifiers ("ARKit.browInnerUp",
//! "blendShape1.jawOpen"). The index registers every channel under both its
//! canonical (prefix-stripped) and raw key so either spelling resolves.

use crate::scene::AvatarScene;
use std::collections::HashMap;

/// Identifies one scalar-influence slot on one mesh. Stable after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphChannel {
    pub mesh: usize,
    pub channel: usize,
}

/// Strip namespace qualifiers: everything up to and including the last `.`.
/// Case is preserved. A name without dots is already canonical.
///
/// Multi-level qualifiers collapse to the final segment ("a.b.c" → "c"),
/// which matches the blendshape vocabularies this is used with; a trailing
/// dot would yield an empty segment, so such names are kept raw.
pub fn canonical_key(raw: &str) -> &str {
    match raw.rsplit_once('.') {
        Some((_, tail)) if !tail.is_empty() => tail,
        _ => raw,
    }
}

/// Canonical-and-raw name → registered morph channels.
///
/// Built exactly once per avatar load, before the driver's first tick;
/// immutable afterwards. A name may fan out to channels on multiple meshes.
pub struct MorphTargetIndex {
    map: HashMap<String, Vec<MorphChannel>>,
}

impl MorphTargetIndex {
    /// Traverse the scene's meshes and register every morph channel.
    ///
    /// A scene with no morph channels produces a valid, inert index: lookups
    /// all miss and no animation occurs. That is not an error.
    pub fn build(scene: &AvatarScene) -> Self {
        let mut map: HashMap<String, Vec<MorphChannel>> = HashMap::new();
        let mut registered = 0usize;

        for (mesh_idx, mesh) in scene.meshes.iter().enumerate() {
            let Some(dictionary) = mesh.morph_channels() else {
                continue;
            };
            for (raw, &channel_idx) in dictionary {
                let channel = MorphChannel {
                    mesh: mesh_idx,
                    channel: channel_idx,
                };
                let canonical = canonical_key(raw);
                map.entry(canonical.to_string()).or_default().push(channel);
                // Raw key kept too: some avatars already use canonical names,
                // others are addressed by their full exported name.
                if canonical != raw {
                    map.entry(raw.clone()).or_default().push(channel);
                }
                registered += 1;
            }
        }

        if registered == 0 {
            tracing::warn!("avatar has no morph channels; expressions will not animate");
        } else {
            tracing::info!(channels = registered, keys = map.len(), "morph index built");
        }

        Self { map }
    }

    /// All channels registered under `name`, or `None` for an unknown name.
    pub fn lookup(&self, name: &str) -> Option<&[MorphChannel]> {
        self.map.get(name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MorphMesh;
    use std::collections::HashMap;

    fn scene_with(meshes: Vec<(&str, Vec<(&str, usize)>)>) -> AvatarScene {
        let meshes = meshes
            .into_iter()
            .map(|(name, entries)| {
                let dict: HashMap<String, usize> = entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect();
                MorphMesh::new(name.to_string(), dict).unwrap()
            })
            .collect();
        AvatarScene::new(meshes)
    }

    #[test]
    fn test_canonical_key_strips_prefix() {
        assert_eq!(canonical_key("ARKit.browInnerUp"), "browInnerUp");
        assert_eq!(canonical_key("blendShape1.jawOpen"), "jawOpen");
    }

    #[test]
    fn test_canonical_key_collapses_multilevel() {
        assert_eq!(canonical_key("rig.face.smile"), "smile");
    }

    #[test]
    fn test_canonical_key_passthrough() {
        assert_eq!(canonical_key("browInnerUp"), "browInnerUp");
        // Trailing dot would produce an empty key; keep raw instead.
        assert_eq!(canonical_key("weird."), "weird.");
    }

    #[test]
    fn test_canonical_key_preserves_case() {
        assert_eq!(canonical_key("ARKit.BrowInnerUp"), "BrowInnerUp");
    }

    #[test]
    fn test_lookup_by_canonical_and_raw() {
        let scene = scene_with(vec![("face", vec![("ARKit.browInnerUp", 2)])]);
        let index = MorphTargetIndex::build(&scene);

        let expected = MorphChannel { mesh: 0, channel: 2 };
        assert_eq!(index.lookup("browInnerUp"), Some(&[expected][..]));
        assert_eq!(index.lookup("ARKit.browInnerUp"), Some(&[expected][..]));
    }

    #[test]
    fn test_fanout_across_meshes() {
        let scene = scene_with(vec![
            ("head", vec![("ARKit.smile", 0)]),
            ("teeth", vec![("smile", 1)]),
        ]);
        let index = MorphTargetIndex::build(&scene);

        let channels = index.lookup("smile").unwrap();
        assert_eq!(channels.len(), 2);
        assert!(channels.contains(&MorphChannel { mesh: 0, channel: 0 }));
        assert!(channels.contains(&MorphChannel { mesh: 1, channel: 1 }));
    }

    #[test]
    fn test_unknown_name_misses() {
        let scene = scene_with(vec![("face", vec![("smile", 0)])]);
        let index = MorphTargetIndex::build(&scene);
        assert!(index.lookup("tongueOut").is_none());
    }

    #[test]
    fn test_empty_scene_is_inert() {
        let scene = scene_with(vec![("hair", vec![])]);
        let index = MorphTargetIndex::build(&scene);
        assert!(index.is_empty());
        assert!(index.lookup("smile").is_none());
    }
}
