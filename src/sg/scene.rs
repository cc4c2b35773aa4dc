use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::node::Node;
use crate::parser::{downcast, Field, Object, ObjectBase, ObjectCast, ObjectExt, ObjectField, ObjectPtr};

/// Top-level object of a scene file.
pub struct Scene {
    base: ObjectBase,
    root_node: ObjectField<Node>,
    path: RwLock<PathBuf>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            base: ObjectBase::default(),
            root_node: ObjectField::new("root_node"),
            path: RwLock::new(PathBuf::new()),
        }
    }
}

impl Scene {
    pub fn root_node(&self) -> Option<Arc<Node>> {
        self.root_node.get()
    }

    pub fn set_root_node(&self, node: Option<Arc<Node>>) {
        self.root_node.set(node);
    }

    /// File the scene was read from; empty if it was not read from a file.
    pub fn path(&self) -> PathBuf {
        self.path.read().clone()
    }

    pub fn set_path(&self, path: &Path) {
        *self.path.write() = path.to_path_buf();
    }
}

impl Object for Scene {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn add_fields<'a>(&'a self, fields: &mut Vec<&'a dyn Field>) {
        fields.push(&self.root_node);
    }

    fn is_valid(&self) -> Result<(), String> {
        match self.root_node.get() {
            Some(_) => Ok(()),
            None => Err("Missing root_node".to_string()),
        }
    }
}

impl ObjectCast for Scene {
    fn cast(obj: ObjectPtr) -> Option<Arc<Self>> {
        downcast(&obj)
    }

    fn upcast(this: Arc<Self>) -> ObjectPtr {
        this
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name())
            .field("path", &self.path())
            .field("root_node", &self.root_node())
            .finish()
    }
}
