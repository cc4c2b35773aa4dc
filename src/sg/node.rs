use std::fmt;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use log::trace;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::math::Bounds;
use super::shape::Shape;
use super::uniform_block::UniformBlock;
use crate::error::ParseError;
use crate::parser::{
    downcast, object_addr, quote, Change, Field, FieldValue, Object, ObjectBase, ObjectCast,
    ObjectExt, ObjectListField, ObjectPtr, Scanner, TField,
};

/// Concerns a node can be independently excluded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeFlag {
    /// Node and its subtree are skipped by traversal and bounds.
    Traversal,
    Render,
    Intersect,
}

impl NodeFlag {
    const ALL: [NodeFlag; 3] = [NodeFlag::Traversal, NodeFlag::Render, NodeFlag::Intersect];

    fn bit(self) -> u8 {
        match self {
            NodeFlag::Traversal => 1,
            NodeFlag::Render => 1 << 1,
            NodeFlag::Intersect => 1 << 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeFlag::Traversal => "Traversal",
            NodeFlag::Render => "Render",
            NodeFlag::Intersect => "Intersect",
        }
    }
}

/// Set of [`NodeFlag`]s. Written in the text format as a quoted string of
/// names joined by `|`, for example `"Render|Intersect"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub fn contains(self, flag: NodeFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn with(self, flag: NodeFlag) -> Self {
        Self(self.0 | flag.bit())
    }

    pub fn without(self, flag: NodeFlag) -> Self {
        Self(self.0 & !flag.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<NodeFlag> for NodeFlags {
    fn from_iter<I: IntoIterator<Item = NodeFlag>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), NodeFlags::with)
    }
}

impl FieldValue for NodeFlags {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        let text = scanner.scan_quoted_string()?;
        let mut flags = NodeFlags::default();
        for part in text.split('|').map(str::trim).filter(|part| !part.is_empty()) {
            let flag = NodeFlag::ALL
                .into_iter()
                .find(|flag| flag.name() == part)
                .ok_or_else(|| scanner.error(format!("Invalid NodeFlag value '{part}'")))?;
            flags = flags.with(flag);
        }
        Ok(flags)
    }

    fn to_text(&self) -> String {
        let names: Vec<&str> = NodeFlag::ALL
            .into_iter()
            .filter(|flag| self.contains(*flag))
            .map(NodeFlag::name)
            .collect();
        quote(&names.join("|"))
    }
}

#[derive(Default)]
struct NodeCache {
    matrix: Mat4,
    matrix_valid: bool,
    bounds: Bounds,
    bounds_valid: bool,
    matrix_computations: usize,
    bounds_computations: usize,
}

/// Transformable scene-graph node owning shapes, materials and children.
///
/// The model matrix and bounds are cached and recomputed on the next read
/// after a change notification clears them. A node observes every child,
/// shape and uniform block it owns, so changes anywhere below it reach it
/// and, through its own observers, its ancestors.
pub struct Node {
    base: ObjectBase,
    disabled_flags: TField<NodeFlags>,
    use_bounds_proxy: TField<bool>,
    scale: TField<Vec3>,
    rotation: TField<Quat>,
    translation: TField<Vec3>,
    uniform_blocks: ObjectListField<UniformBlock>,
    shapes: ObjectListField<dyn Shape>,
    children: ObjectListField<Node>,
    cache: Mutex<NodeCache>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            base: ObjectBase::default(),
            disabled_flags: TField::new("disabled_flags", NodeFlags::default()),
            use_bounds_proxy: TField::new("use_bounds_proxy", false),
            scale: TField::new("scale", Vec3::ONE),
            rotation: TField::new("rotation", Quat::IDENTITY),
            translation: TField::new("translation", Vec3::ZERO),
            uniform_blocks: ObjectListField::new("uniform_blocks"),
            shapes: ObjectListField::new("shapes"),
            children: ObjectListField::new("children"),
            cache: Mutex::new(NodeCache::default()),
        }
    }
}

impl Node {
    pub fn scale(&self) -> Vec3 {
        self.scale.get()
    }

    pub fn rotation(&self) -> Quat {
        self.rotation.get()
    }

    pub fn translation(&self) -> Vec3 {
        self.translation.get()
    }

    pub fn set_scale(&self, scale: Vec3) {
        self.scale.set(scale);
        self.process_change(Change::Transform, self);
    }

    pub fn set_rotation(&self, rotation: Quat) {
        self.rotation.set(rotation);
        self.process_change(Change::Transform, self);
    }

    pub fn set_translation(&self, translation: Vec3) {
        self.translation.set(translation);
        self.process_change(Change::Transform, self);
    }

    /// Translation * rotation * scale.
    pub fn model_matrix(&self) -> Mat4 {
        let mut cache = self.cache.lock();
        if !cache.matrix_valid {
            cache.matrix = Mat4::from_scale_rotation_translation(
                self.scale(),
                self.rotation(),
                self.translation(),
            );
            cache.matrix_valid = true;
            cache.matrix_computations += 1;
            trace!("Recomputed model matrix of node '{}'", self.name());
        }
        cache.matrix
    }

    /// Object-space bounds: every shape plus every traversable child's
    /// bounds in this node's space.
    pub fn bounds(&self) -> Bounds {
        {
            let cache = self.cache.lock();
            if cache.bounds_valid {
                return cache.bounds;
            }
        }
        // Children lock their own caches, so compute without holding ours.
        let bounds = self.compute_bounds();
        let mut cache = self.cache.lock();
        cache.bounds = bounds;
        cache.bounds_valid = true;
        cache.bounds_computations += 1;
        trace!("Recomputed bounds of node '{}'", self.name());
        bounds
    }

    /// Bounds with this node's scale applied.
    pub fn scaled_bounds(&self) -> Bounds {
        self.bounds().scaled(self.scale())
    }

    fn compute_bounds(&self) -> Bounds {
        let shape_bounds = self
            .shapes
            .get()
            .iter()
            .fold(Bounds::empty(), |bounds, shape| bounds.union(&shape.bounds()));
        self.children
            .get()
            .iter()
            .filter(|child| child.is_enabled(NodeFlag::Traversal))
            .fold(shape_bounds, |bounds, child| {
                bounds.union(&child.bounds().transformed(&child.model_matrix()))
            })
    }

    pub fn matrix_computations(&self) -> usize {
        self.cache.lock().matrix_computations
    }

    pub fn bounds_computations(&self) -> usize {
        self.cache.lock().bounds_computations
    }

    pub fn is_enabled(&self, flag: NodeFlag) -> bool {
        !self.disabled_flags.get().contains(flag)
    }

    /// Enables or disables one concern. Emits [`Change::Enable`] only when
    /// the state actually changes.
    pub fn set_enabled(&self, flag: NodeFlag, enabled: bool) {
        let flags = self.disabled_flags.get();
        if !flags.contains(flag) == enabled {
            return;
        }
        let flags = if enabled {
            flags.without(flag)
        } else {
            flags.with(flag)
        };
        self.disabled_flags.set(flags);
        self.process_change(Change::Enable, self);
    }

    pub fn disabled_flags(&self) -> NodeFlags {
        self.disabled_flags.get()
    }

    pub fn use_bounds_proxy(&self) -> bool {
        self.use_bounds_proxy.get()
    }

    pub fn set_use_bounds_proxy(&self, use_proxy: bool) {
        self.use_bounds_proxy.set(use_proxy);
        self.process_change(Change::Graph, self);
    }

    pub fn children(&self) -> Vec<Arc<Node>> {
        self.children.get()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, index: usize) -> Option<Arc<Node>> {
        self.children.get_at(index)
    }

    pub fn shapes(&self) -> Vec<Arc<dyn Shape>> {
        self.shapes.get()
    }

    pub fn uniform_blocks(&self) -> Vec<Arc<UniformBlock>> {
        self.uniform_blocks.get()
    }

    pub fn add_child(&self, child: Arc<Node>) {
        self.observe(&*child);
        self.children.add(child);
        self.process_change(Change::Graph, self);
    }

    /// Inserts a child at `index`, appending if the index is past the end.
    pub fn insert_child(&self, index: usize, child: Arc<Node>) {
        self.observe(&*child);
        self.children.insert(index, child);
        self.process_change(Change::Graph, self);
    }

    /// Removes the first occurrence of `child`. Returns false if it is not
    /// a child of this node.
    pub fn remove_child(&self, child: &Arc<Node>) -> bool {
        match self.children.position(child) {
            Some(index) => self.remove_child_at(index).is_some(),
            None => false,
        }
    }

    pub fn remove_child_at(&self, index: usize) -> Option<Arc<Node>> {
        let child = self.children.get_at(index)?;
        if self.children.count_of(&child) == 1 {
            self.unobserve(&*child);
        }
        let removed = self.children.remove_at(index);
        self.process_change(Change::Graph, self);
        removed
    }

    /// Replaces the child at `index`, returning the old child.
    pub fn replace_child(&self, index: usize, child: Arc<Node>) -> Option<Arc<Node>> {
        let old = self.children.get_at(index)?;
        if !Arc::ptr_eq(&old, &child) && self.children.count_of(&old) == 1 {
            self.unobserve(&*old);
        }
        self.observe(&*child);
        let replaced = self.children.replace(index, child);
        self.process_change(Change::Graph, self);
        replaced
    }

    pub fn clear_children(&self) {
        for child in self.children.get() {
            self.unobserve(&*child);
        }
        self.children.clear();
        self.process_change(Change::Graph, self);
    }

    pub fn add_shape(&self, shape: Arc<dyn Shape>) {
        self.observe(shape.as_object());
        self.shapes.add(shape);
        self.process_change(Change::Graph, self);
    }

    pub fn clear_shapes(&self) {
        for shape in self.shapes.get() {
            self.unobserve(shape.as_object());
        }
        self.shapes.clear();
        self.process_change(Change::Graph, self);
    }

    pub fn add_uniform_block(&self, block: Arc<UniformBlock>) {
        self.observe(&*block);
        self.uniform_blocks.add(block);
        self.process_change(Change::Appearance, self);
    }

    fn invalidate(&self, change: Change, origin: &dyn Object) {
        let mut cache = self.cache.lock();
        if change.affects_bounds() {
            cache.bounds_valid = false;
        }
        // A child's transform moves the child, not this node.
        if change == Change::Transform && object_addr(origin) == object_addr(self) {
            cache.matrix_valid = false;
        }
    }
}

impl Object for Node {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn add_fields<'a>(&'a self, fields: &mut Vec<&'a dyn Field>) {
        fields.push(&self.disabled_flags);
        fields.push(&self.use_bounds_proxy);
        fields.push(&self.scale);
        fields.push(&self.rotation);
        fields.push(&self.translation);
        fields.push(&self.uniform_blocks);
        fields.push(&self.shapes);
        fields.push(&self.children);
    }

    fn creation_done(&self) {
        for block in self.uniform_blocks.get() {
            self.observe(&*block);
        }
        for shape in self.shapes.get() {
            self.observe(shape.as_object());
        }
        for child in self.children.get() {
            self.observe(&*child);
        }
    }

    fn process_change(&self, change: Change, origin: &dyn Object) -> bool {
        self.invalidate(change, origin);
        self.base.propagate_change(change, origin)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let addr = object_addr(&*self);
        for block in self.uniform_blocks.get() {
            block.base().remove_observer_at(addr);
        }
        for shape in self.shapes.get() {
            shape.base().remove_observer_at(addr);
        }
        for child in self.children.get() {
            child.base().remove_observer_at(addr);
        }
    }
}

impl ObjectCast for Node {
    fn cast(obj: ObjectPtr) -> Option<Arc<Self>> {
        downcast(&obj)
    }

    fn upcast(this: Arc<Self>) -> ObjectPtr {
        this
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("translation", &self.translation())
            .field("shapes", &self.shapes.len())
            .field("children", &self.children.len())
            .finish()
    }
}
