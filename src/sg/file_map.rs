use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use log::debug;

/// Decoded image data. The pixel layout is up to the loader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Load times and inter-file dependencies, keyed by full path.
#[derive(Default)]
struct DependencyMap {
    load_times: HashMap<PathBuf, SystemTime>,
    dependencies: HashMap<PathBuf, Vec<PathBuf>>,
}

impl DependencyMap {
    fn add_load_time(&mut self, path: &Path, loaded_at: SystemTime) {
        self.load_times.insert(path.to_path_buf(), loaded_at);
    }

    fn add_dependency(&mut self, owner: &Path, dependency: &Path) {
        let deps = self.dependencies.entry(owner.to_path_buf()).or_default();
        if !deps.iter().any(|existing| existing == dependency) {
            deps.push(dependency.to_path_buf());
        }
    }

    /// A path is valid while its file exists, has not been modified since it
    /// was loaded, and every path it depends on is valid. Invalid paths are
    /// forgotten and appended to `invalid`.
    fn check(
        &mut self,
        path: &Path,
        checked: &mut HashMap<PathBuf, bool>,
        invalid: &mut Vec<PathBuf>,
    ) -> bool {
        if let Some(&result) = checked.get(path) {
            return result;
        }
        // Provisional answer for dependency cycles.
        checked.insert(path.to_path_buf(), true);

        let is_valid = match fs::metadata(path).and_then(|meta| meta.modified()) {
            Err(_) => {
                debug!("Item for path '{}' invalid because no longer exists", path.display());
                false
            }
            Ok(modified) => match self.load_times.get(path).copied() {
                None => {
                    debug!("Item for path '{}' invalid because time never tracked", path.display());
                    false
                }
                Some(loaded) if modified > loaded => {
                    debug!("Item for path '{}' invalid because of modification", path.display());
                    false
                }
                Some(_) => self.dependencies_valid(path, checked, invalid),
            },
        };

        checked.insert(path.to_path_buf(), is_valid);
        if !is_valid {
            self.load_times.remove(path);
            self.dependencies.remove(path);
            invalid.push(path.to_path_buf());
        }
        is_valid
    }

    fn dependencies_valid(
        &mut self,
        path: &Path,
        checked: &mut HashMap<PathBuf, bool>,
        invalid: &mut Vec<PathBuf>,
    ) -> bool {
        let deps = self.dependencies.get(path).cloned().unwrap_or_default();
        let mut all_valid = true;
        // Check every dependency so each invalid one is cleaned up.
        for dep in deps {
            if !self.check(&dep, checked, invalid) {
                if all_valid {
                    debug!(
                        "Item for path '{}' invalid because of modification of '{}'",
                        path.display(),
                        dep.display()
                    );
                }
                all_valid = false;
            }
        }
        all_valid
    }
}

/// Cache of loaded file contents that notices when files change.
///
/// Every entry remembers when it was added. A lookup succeeds only while the
/// file is unmodified since then and all files it depends on are still
/// valid; otherwise the entry is dropped and `None` is returned so the caller
/// reloads it.
#[derive(Default)]
pub struct FileMap {
    strings: HashMap<PathBuf, String>,
    images: HashMap<PathBuf, Arc<Image>>,
    deps: DependencyMap,
}

impl FileMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_string(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        self.add_string_loaded_at(path, text, SystemTime::now());
    }

    /// Adds a string whose file was read at `loaded_at`. Modifications made
    /// after that time invalidate the entry.
    pub fn add_string_loaded_at(
        &mut self,
        path: impl AsRef<Path>,
        text: impl Into<String>,
        loaded_at: SystemTime,
    ) {
        let path = path.as_ref();
        let text = text.into();
        debug!(
            "Adding string with size {} for path '{}'",
            text.len(),
            path.display()
        );
        self.strings.insert(path.to_path_buf(), text);
        self.deps.add_load_time(path, loaded_at);
    }

    pub fn add_image(&mut self, path: impl AsRef<Path>, image: Arc<Image>) {
        let path = path.as_ref();
        debug!(
            "Adding {}x{} image for path '{}'",
            image.width,
            image.height,
            path.display()
        );
        self.images.insert(path.to_path_buf(), image);
        self.deps.add_load_time(path, SystemTime::now());
    }

    pub fn find_string(&mut self, path: impl AsRef<Path>) -> Option<&str> {
        let path = path.as_ref();
        if !self.is_path_valid(path) {
            return None;
        }
        self.strings.get(path).map(String::as_str)
    }

    pub fn find_image(&mut self, path: impl AsRef<Path>) -> Option<Arc<Image>> {
        let path = path.as_ref();
        if !self.is_path_valid(path) {
            return None;
        }
        self.images.get(path).cloned()
    }

    /// Returns when the data for `path` was loaded, if it is tracked.
    pub fn load_time(&self, path: impl AsRef<Path>) -> Option<SystemTime> {
        self.deps.load_times.get(path.as_ref()).copied()
    }

    /// Records that data loaded from `owner` also came from `dependency`.
    pub fn add_dependency(&mut self, owner: impl AsRef<Path>, dependency: impl AsRef<Path>) {
        let (owner, dependency) = (owner.as_ref(), dependency.as_ref());
        debug!(
            "Adding dependency of '{}' on '{}'",
            owner.display(),
            dependency.display()
        );
        self.deps.add_dependency(owner, dependency);
    }

    /// Returns true if data cached for `path` may still be used. Every path
    /// found invalid along the way is purged.
    pub fn is_path_valid(&mut self, path: impl AsRef<Path>) -> bool {
        let mut checked = HashMap::new();
        let mut invalid = Vec::new();
        let is_valid = self.deps.check(path.as_ref(), &mut checked, &mut invalid);
        for path in invalid {
            self.strings.remove(&path);
            self.images.remove(&path);
        }
        is_valid
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::Duration;

    use tempfile::NamedTempFile;

    use super::*;

    fn temp_file() -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "X").unwrap();
        file
    }

    fn touch(path: &Path) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(10))
            .unwrap();
    }

    #[test]
    fn add_and_find() {
        let mut map = FileMap::new();
        assert_eq!(map.find_string("/no/such/path"), None);
        assert!(map.find_image("/no/such/image.jpg").is_none());

        let (tmp1, tmp2) = (temp_file(), temp_file());
        map.add_string(tmp1.path(), "A test string");
        assert_eq!(map.find_string(tmp1.path()), Some("A test string"));

        let image = Arc::new(Image {
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        });
        map.add_image(tmp2.path(), Arc::clone(&image));
        let found = map.find_image(tmp2.path()).unwrap();
        assert!(Arc::ptr_eq(&found, &image));
    }

    #[test]
    fn modified_files_are_invalid() {
        let mut map = FileMap::new();
        let (tmp1, tmp2) = (temp_file(), temp_file());
        map.add_string(tmp1.path(), "A test string");
        map.add_image(tmp2.path(), Arc::new(Image::default()));

        touch(tmp1.path());
        touch(tmp2.path());
        assert_eq!(map.find_string(tmp1.path()), None);
        assert!(map.find_image(tmp2.path()).is_none());
    }

    #[test]
    fn deleted_files_are_invalid() {
        let mut map = FileMap::new();
        let path = {
            let tmp = temp_file();
            map.add_string(tmp.path(), "A test string");
            assert!(map.find_string(tmp.path()).is_some());
            let path = tmp.path().to_path_buf();
            path
        };
        assert_eq!(map.find_string(&path), None);
    }

    #[test]
    fn modified_dependency_invalidates_owner() {
        let mut map = FileMap::new();
        let (tmp1, tmp2, tmp3) = (temp_file(), temp_file(), temp_file());
        map.add_string(tmp1.path(), "String 1");
        map.add_string(tmp2.path(), "String 2");
        map.add_string(tmp3.path(), "String 3");
        map.add_dependency(tmp1.path(), tmp2.path());
        map.add_dependency(tmp1.path(), tmp3.path());

        assert_eq!(map.find_string(tmp1.path()), Some("String 1"));
        assert_eq!(map.find_string(tmp2.path()), Some("String 2"));
        assert_eq!(map.find_string(tmp3.path()), Some("String 3"));

        touch(tmp2.path());
        assert_eq!(map.find_string(tmp1.path()), None);
        assert_eq!(map.find_string(tmp2.path()), None);
        assert_eq!(map.find_string(tmp3.path()), Some("String 3"));
    }

    #[test]
    fn untracked_dependency_invalidates_owner() {
        let mut map = FileMap::new();
        let (tmp1, tmp2) = (temp_file(), temp_file());
        map.add_string(tmp1.path(), "String 1");
        map.add_dependency(tmp1.path(), tmp2.path());
        assert_eq!(map.find_string(tmp1.path()), None);
    }

    #[test]
    fn dependency_cycles_terminate() {
        let mut map = FileMap::new();
        let (tmp1, tmp2) = (temp_file(), temp_file());
        map.add_string(tmp1.path(), "String 1");
        map.add_string(tmp2.path(), "String 2");
        map.add_dependency(tmp1.path(), tmp2.path());
        map.add_dependency(tmp2.path(), tmp1.path());
        assert_eq!(map.find_string(tmp1.path()), Some("String 1"));

        touch(tmp1.path());
        assert_eq!(map.find_string(tmp2.path()), None);
        assert_eq!(map.find_string(tmp1.path()), None);
    }
}
