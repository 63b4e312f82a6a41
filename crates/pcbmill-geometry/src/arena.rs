//! Grouped shape storage.
//!
//! Parsers file every shape under a group key (aperture code, tool id) and a
//! role. All shapes live in one arena; groups only hold indices into it, so a
//! transform applied to the arena reaches every group at once.

use crate::bounds::{try_bounds, Bounds};
use crate::shape::Shape;
use crate::transform::Transform;
use geo::AffineTransform;
use std::collections::BTreeMap;

pub type ShapeId = usize;

/// What a stored shape is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeRole {
    /// Copper (or any material) area.
    Solid,
    /// Zero-width centerline of a trace or flash.
    Follow,
    /// Area removed by clear polarity.
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArenaEntry<K> {
    pub group: K,
    pub role: ShapeRole,
    pub shape: Shape,
}

#[derive(Debug, Clone)]
pub struct ShapeArena<K: Ord + Clone> {
    entries: Vec<ArenaEntry<K>>,
    groups: BTreeMap<K, Vec<ShapeId>>,
}

impl<K: Ord + Clone> Default for ShapeArena<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            groups: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> ShapeArena<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group: K, role: ShapeRole, shape: Shape) -> ShapeId {
        let id = self.entries.len();
        self.groups.entry(group.clone()).or_default().push(id);
        self.entries.push(ArenaEntry { group, role, shape });
        id
    }

    pub fn get(&self, id: ShapeId) -> Option<&ArenaEntry<K>> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ArenaEntry<K>> {
        self.entries.iter()
    }

    pub fn group_keys(&self) -> impl Iterator<Item = &K> {
        self.groups.keys()
    }

    /// Entries of one group in insertion order.
    pub fn group<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a ArenaEntry<K>> + 'a {
        self.groups
            .get(key)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |&id| self.entries.get(id))
    }

    /// Shapes of one role within one group.
    pub fn shapes<'a>(&'a self, key: &K, role: ShapeRole) -> impl Iterator<Item = &'a Shape> + 'a {
        self.group(key)
            .filter(move |e| e.role == role)
            .map(|e| &e.shape)
    }

    /// Shapes of one role across all groups.
    pub fn shapes_with_role(&self, role: ShapeRole) -> impl Iterator<Item = &Shape> {
        self.entries
            .iter()
            .filter(move |e| e.role == role)
            .map(|e| &e.shape)
    }

    /// Drop a group and its shapes, renumbering the rest.
    pub fn remove_group(&mut self, key: &K) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| &e.group != key);
        self.reindex();
        before - self.entries.len()
    }

    fn reindex(&mut self) {
        self.groups.clear();
        for (id, entry) in self.entries.iter().enumerate() {
            self.groups.entry(entry.group.clone()).or_default().push(id);
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        try_bounds(self.entries.iter().map(|e| &e.shape))
    }
}

impl<K: Ord + Clone> Transform for ShapeArena<K> {
    fn affine(&mut self, transform: &AffineTransform<f64>) {
        for entry in self.entries.iter_mut() {
            entry.shape.affine(transform);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Coord};

    #[test]
    fn test_groups_and_roles() {
        let mut arena: ShapeArena<String> = ShapeArena::new();
        arena.insert("10".into(), ShapeRole::Solid, Shape::Point(point!(x: 0.0, y: 0.0)));
        arena.insert("10".into(), ShapeRole::Follow, Shape::Point(point!(x: 1.0, y: 0.0)));
        arena.insert("11".into(), ShapeRole::Solid, Shape::Point(point!(x: 2.0, y: 0.0)));

        assert_eq!(arena.group(&"10".to_string()).count(), 2);
        assert_eq!(arena.shapes(&"10".to_string(), ShapeRole::Follow).count(), 1);
        assert_eq!(arena.shapes_with_role(ShapeRole::Solid).count(), 2);
        assert_eq!(arena.group(&"99".to_string()).count(), 0);

        assert_eq!(arena.remove_group(&"10".to_string()), 2);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.group(&"11".to_string()).count(), 1);
    }

    #[test]
    fn test_transform_reaches_every_group() {
        let mut arena: ShapeArena<u32> = ShapeArena::new();
        arena.insert(1, ShapeRole::Solid, Shape::Point(point!(x: 1.0, y: 1.0)));
        arena.insert(2, ShapeRole::Follow, Shape::Point(point!(x: 2.0, y: 2.0)));
        arena.scale(2.0, 2.0, Coord { x: 0.0, y: 0.0 });
        let b = arena.bounds().unwrap();
        assert_eq!(b.as_tuple(), (2.0, 2.0, 4.0, 4.0));
    }
}
