use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};

use super::file_map::FileMap;
use super::scene::Scene;
use crate::parser::{downcast, ObjectExt, Parser, Registry};

/// Reads scene files, reusing a previously read scene while neither its file
/// nor any file it includes has changed.
pub struct Reader {
    registry: Arc<Registry>,
    file_map: FileMap,
    scenes: HashMap<PathBuf, Arc<Scene>>,
}

impl Reader {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            file_map: FileMap::new(),
            scenes: HashMap::new(),
        }
    }

    pub fn file_map(&self) -> &FileMap {
        &self.file_map
    }

    pub fn file_map_mut(&mut self) -> &mut FileMap {
        &mut self.file_map
    }

    pub fn read_scene(&mut self, path: impl AsRef<Path>) -> Result<Arc<Scene>> {
        let path = path.as_ref();
        let full_path = fs::canonicalize(path)
            .with_context(|| format!("unable to open scene file {}", path.display()))?;

        if self.file_map.find_string(&full_path).is_some() {
            if let Some(scene) = self.scenes.get(&full_path) {
                debug!("Reusing scene read from {}", full_path.display());
                return Ok(Arc::clone(scene));
            }
        }
        self.scenes.remove(&full_path);

        // Every file is stamped with the time reading started, so an edit
        // made while the scene is being parsed invalidates it.
        let started = SystemTime::now();
        let text = fs::read_to_string(&full_path)
            .with_context(|| format!("unable to read scene file {}", full_path.display()))?;
        let mut parser = Parser::new(Arc::clone(&self.registry));
        let obj = parser.parse_source(&full_path, &text)?;
        let scene = downcast::<Scene>(&obj).ok_or_else(|| {
            anyhow!(
                "{} contains a {} object instead of a Scene",
                full_path.display(),
                obj.type_name()
            )
        })?;
        scene.set_path(&full_path);

        self.file_map.add_string_loaded_at(&full_path, text, started);
        for dependency in parser.dependencies() {
            let included = canonical_or_same(&dependency.included_path);
            let owner = if dependency.including_path.as_os_str().is_empty() {
                full_path.clone()
            } else {
                canonical_or_same(&dependency.including_path)
            };
            let included_text = fs::read_to_string(&included)
                .with_context(|| format!("unable to read included file {}", included.display()))?;
            self.file_map
                .add_string_loaded_at(&included, included_text, started);
            self.file_map.add_dependency(&owner, &included);
        }

        info!(
            "Read scene '{}' from {} ({} include(s))",
            scene.name(),
            full_path.display(),
            parser.dependencies().len()
        );
        self.scenes.insert(full_path, Arc::clone(&scene));
        Ok(scene)
    }
}

fn canonical_or_same(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
