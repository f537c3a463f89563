//! Directory-backed resolver.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::import::module_path::ModulePath;
use crate::import::resolver::{ImportResolver, ResolvedType};

pub const DEFAULT_SCRIPT_EXTENSION: &str = "rhai";

/// Serves sources from files under a root directory.
///
/// The module `a.b` lives at `<root>/a/b.<ext>`, the package `a.b` at
/// `<root>/a/b/__init__.<ext>`. Script paths that already carry an extension
/// are read as they are.
pub struct FileSystemResolver {
    id: Uuid,
    root: PathBuf,
    extension: String,
}

impl FileSystemResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSystemResolver {
            id: Uuid::new_v4(),
            root: root.into(),
            extension: DEFAULT_SCRIPT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate file for a physical unit path. `None` for paths that would
    /// leave the root directory.
    fn file_for(&self, path: &str) -> Option<PathBuf> {
        let relative = path.trim().trim_start_matches('/');
        let inside_root = Path::new(relative)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !inside_root {
            warn!(resolver = %self.id, path = %path, "path leaves the resolver root");
            return None;
        }

        let file = self.root.join(relative);
        if file.extension().map_or(false, |ext| ext == self.extension.as_str()) {
            Some(file)
        } else {
            Some(self.root.join(format!("{}.{}", relative, self.extension)))
        }
    }

    fn is_file(&self, path: &str) -> bool {
        self.file_for(path).map_or(false, |file| file.is_file())
    }
}

impl ImportResolver for FileSystemResolver {
    fn id(&self) -> Uuid {
        self.id
    }

    fn module_information(&self, path: &ModulePath) -> ResolvedType {
        if self.is_file(&path.init_path()) {
            ResolvedType::Package
        } else if self.is_file(&path.physical()) {
            ResolvedType::Module
        } else {
            ResolvedType::None
        }
    }

    fn script_source(&self, path: &str) -> Option<String> {
        let file = self.file_for(path)?;
        match fs::read_to_string(&file) {
            Ok(source) => Some(source),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(resolver = %self.id, file = %file.display(), error = %e, "failed to read script source");
                None
            }
        }
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}
