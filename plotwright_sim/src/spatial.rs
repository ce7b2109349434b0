// Spatial queries over placed structures: hit-testing and bounding volumes.
//
// Remodel sessions never do their own spatial math. They ask a
// `SpatialIndex` which structure sits under a query point and what
// footprint a structure would occupy at a candidate transform. A host with
// its own physics/raycast layer can install a different implementation via
// `SimState::set_spatial_index()`; the default `FootprintIndex` derives
// oriented boxes from the catalog footprints in `GameConfig`.
//
// A structure whose kind has no catalog footprint yields `None` from
// `bounds()`, which callers treat as "cannot collide", never as invalid.
//
// See also: `geometry.rs` for `Footprint`, `remodel.rs` for the callers.

use crate::config::GameConfig;
use crate::geometry::Footprint;
use crate::structure::Structure;
use crate::types::{StructureId, StructureKind, Transform, Vec3};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub trait SpatialIndex: Send + Sync {
    /// The structure under `point`, if any. Ties go to the lowest id.
    fn hit_test(
        &self,
        structures: &BTreeMap<StructureId, Structure>,
        point: Vec3,
    ) -> Option<StructureId>;

    /// Footprint `structure` would occupy at `transform`.
    fn bounds(&self, structure: &Structure, transform: &Transform) -> Option<Footprint>;
}

/// Default index: catalog footprints as oriented boxes.
#[derive(Clone, Debug, Default)]
pub struct FootprintIndex {
    sizes: BTreeMap<StructureKind, (f32, f32)>,
}

impl FootprintIndex {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            sizes: config
                .structures
                .iter()
                .map(|(kind, def)| (kind.clone(), def.footprint))
                .collect(),
        }
    }
}

impl SpatialIndex for FootprintIndex {
    fn hit_test(
        &self,
        structures: &BTreeMap<StructureId, Structure>,
        point: Vec3,
    ) -> Option<StructureId> {
        structures
            .values()
            .find(|s| {
                self.bounds(s, &s.transform)
                    .is_some_and(|fp| fp.contains_point(point.x, point.z))
            })
            .map(|s| s.id)
    }

    fn bounds(&self, structure: &Structure, transform: &Transform) -> Option<Footprint> {
        let &(width, depth) = self.sizes.get(&structure.kind)?;
        let footprint = Footprint::at(transform, width, depth);
        (!footprint.is_degenerate()).then_some(footprint)
    }
}

/// Shared handle so `SimState` stays `Clone` and `Debug`.
#[derive(Clone)]
pub struct SharedSpatialIndex(pub Arc<dyn SpatialIndex>);

impl SharedSpatialIndex {
    pub fn new(index: impl SpatialIndex + 'static) -> Self {
        Self(Arc::new(index))
    }
}

impl Default for SharedSpatialIndex {
    fn default() -> Self {
        Self::new(FootprintIndex::default())
    }
}

impl fmt::Debug for SharedSpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSpatialIndex(..)")
    }
}

impl std::ops::Deref for SharedSpatialIndex {
    type Target = dyn SpatialIndex;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construction::BuildMode;
    use crate::types::{CollectionId, PartVariant};

    fn make(id: u32, kind: &str, x: f32, z: f32) -> Structure {
        let config = GameConfig::default();
        let kind = StructureKind::from(kind);
        let def = config
            .structure(&kind)
            .map(|d| d.construction.clone())
            .unwrap_or_default();
        Structure::new(
            StructureId(id),
            kind,
            PartVariant::Generic,
            CollectionId(0),
            Transform::at(Vec3::new(x, 0.0, z)),
            &def,
            BuildMode::Instant,
        )
    }

    fn registry(items: Vec<Structure>) -> BTreeMap<StructureId, Structure> {
        items.into_iter().map(|s| (s.id, s)).collect()
    }

    #[test]
    fn hit_test_finds_structure_under_point() {
        let index = FootprintIndex::from_config(&GameConfig::default());
        let structures = registry(vec![make(0, "pillar", 2.0, 2.0), make(1, "hearth", 6.0, 6.0)]);
        assert_eq!(
            index.hit_test(&structures, Vec3::new(2.1, 0.0, 1.9)),
            Some(StructureId(0))
        );
        assert_eq!(
            index.hit_test(&structures, Vec3::new(6.7, 0.0, 5.3)),
            Some(StructureId(1))
        );
        assert_eq!(index.hit_test(&structures, Vec3::new(4.0, 0.0, 4.0)), None);
    }

    #[test]
    fn overlapping_hits_prefer_lowest_id() {
        let index = FootprintIndex::from_config(&GameConfig::default());
        let structures = registry(vec![make(4, "hearth", 0.0, 0.0), make(2, "pillar", 0.0, 0.0)]);
        assert_eq!(index.hit_test(&structures, Vec3::ZERO), Some(StructureId(2)));
    }

    #[test]
    fn unknown_kind_has_no_bounds() {
        let index = FootprintIndex::from_config(&GameConfig::default());
        let ghost = make(0, "ghost", 0.0, 0.0);
        assert!(index.bounds(&ghost, &ghost.transform).is_none());
        assert_eq!(index.hit_test(&registry(vec![ghost]), Vec3::ZERO), None);
    }

    #[test]
    fn bounds_follow_candidate_transform() {
        let index = FootprintIndex::from_config(&GameConfig::default());
        let pillar = make(0, "pillar", 0.0, 0.0);
        let fp = index
            .bounds(&pillar, &Transform::at(Vec3::new(3.0, 0.0, 1.0)))
            .unwrap();
        assert_eq!(fp.center_x, 3.0);
        assert_eq!(fp.half_width, 0.25);
    }
}
