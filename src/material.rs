//! Material registry — immutable `u8 -> MaterialDescriptor` lookup.
//!
//! Mirrors the teacher's `domain::content::ContentRegistry`: a process-wide
//! read-only table built once at startup, either from a built-in default
//! table or from a JSON content bundle (§6, "Persisted state layout" — the
//! bundle itself is external content, not state the core owns).

use serde::{Deserialize, Serialize};

pub type MaterialId = u8;

pub const MATERIAL_EMPTY: MaterialId = 0;

/// Minimal `bitflags`-shaped helper, kept local so the crate does not pull in
/// the `bitflags` crate for a three-bit flag word.
macro_rules! bitflags_lite {
    (pub struct $name:ident: $ty:ty { $(const $variant:ident = $value:expr;)* }) => {
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name(pub $ty);
        impl $name {
            $(pub const $variant: $name = $name($value);)*
            pub const NONE: $name = $name(0);
            #[inline]
            pub fn contains(self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }
            #[inline]
            pub fn union(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }
        }
        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name { self.union(rhs) }
        }
        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) { *self = self.union(rhs); }
        }
    };
}

bitflags_lite! {
    pub struct MaterialFlags: u8 {
        const SOLID = 1 << 0;
        const TRANSPARENT = 1 << 1;
        const EMISSIVE = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MaterialDescriptor {
    pub color: [f32; 3],
    pub emissive: bool,
    pub roughness: f32,
    pub metallic: f32,
    pub density: f32,
    pub flags: MaterialFlags,
}

impl MaterialDescriptor {
    pub fn is_solid(&self) -> bool {
        self.flags.contains(MaterialFlags::SOLID)
    }

    pub fn is_transparent(&self) -> bool {
        self.flags.contains(MaterialFlags::TRANSPARENT)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MaterialRegistry {
    materials: Vec<MaterialDescriptor>,
}

impl MaterialRegistry {
    /// Built-in default table: empty (id 0) plus a small set of common
    /// construction materials, enough to exercise every scene/test in this
    /// crate without requiring a content bundle.
    pub fn default_table() -> Self {
        let mut materials = vec![MaterialDescriptor {
            color: [0.0, 0.0, 0.0],
            emissive: false,
            roughness: 1.0,
            metallic: 0.0,
            density: 0.0,
            flags: MaterialFlags::NONE,
        }];

        let entries: &[(f32, f32, f32, f32, f32, f32, bool, bool, bool)] = &[
            // r, g, b, roughness, metallic, density, solid, transparent, emissive
            (0.55, 0.55, 0.55, 0.9, 0.0, 2.6, true, false, false), // 1 stone
            (0.76, 0.70, 0.50, 0.95, 0.0, 1.5, true, false, false), // 2 sand (rigid-extracted)
            (0.45, 0.30, 0.15, 0.8, 0.0, 0.6, true, false, false), // 3 wood
            (0.70, 0.70, 0.75, 0.3, 0.9, 7.8, true, false, false), // 4 metal
            (1.00, 0.40, 0.05, 0.6, 0.0, 4.0, true, false, true),  // 5 lava (rigid-only here)
        ];

        for (r, g, b, rough, metal, density, solid, transparent, emissive) in entries.iter().copied() {
            let mut flags = MaterialFlags::NONE;
            if solid {
                flags |= MaterialFlags::SOLID;
            }
            if transparent {
                flags |= MaterialFlags::TRANSPARENT;
            }
            if emissive {
                flags |= MaterialFlags::EMISSIVE;
            }
            materials.push(MaterialDescriptor {
                color: [r, g, b],
                emissive,
                roughness: rough,
                metallic: metal,
                density,
                flags,
            });
        }

        Self { materials }
    }

    pub fn from_bundle_json(json: &str) -> Result<Self, String> {
        let materials: Vec<MaterialDescriptor> =
            serde_json::from_str(json).map_err(|e| e.to_string())?;
        if materials.is_empty() {
            return Err("material bundle must contain at least the empty material".to_string());
        }
        Ok(Self { materials })
    }

    #[inline]
    pub fn get(&self, id: MaterialId) -> Option<&MaterialDescriptor> {
        self.materials.get(id as usize)
    }

    #[inline]
    pub fn is_valid(&self, id: MaterialId) -> bool {
        (id as usize) < self.materials.len()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn density_of(&self, id: MaterialId) -> f32 {
        self.get(id).map(|m| m.density).unwrap_or(0.0)
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::default_table()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_material_is_not_solid() {
        let reg = MaterialRegistry::default_table();
        assert!(!reg.get(MATERIAL_EMPTY).unwrap().is_solid());
    }

    #[test]
    fn stone_is_solid_and_dense() {
        let reg = MaterialRegistry::default_table();
        let stone = reg.get(1).unwrap();
        assert!(stone.is_solid());
        assert!(stone.density > 1.0);
    }

    #[test]
    fn invalid_id_is_reported() {
        let reg = MaterialRegistry::default_table();
        assert!(!reg.is_valid(250));
    }
}
