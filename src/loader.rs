//! Resolving component names to components: host-registered natives
//! first, then `.chtml` files next to the importing document, then
//! the search path. Parsed files are cached until their metadata
//! changes.

use std::{collections::{BTreeMap, HashMap},
          fmt::Debug,
          path::{Path, PathBuf},
          sync::{Arc, Mutex, Weak}};

use anyhow::{anyhow, Context, Result};
use kstring::KString;

use crate::{cmpfilemeta::{cmpfilemeta_of_path, CmpFileMeta},
            component::{Component, Importer},
            dt,
            easy_fs::FileKind,
            error::ImportError,
            expr::Evaluator,
            info,
            interp::ChtmlComponent,
            parser::parse_document_checked,
            source::Source};

pub const SUFFIX: &str = "chtml";

/// Identifies a version of a source file; the cache entry for a file
/// is reused as long as its stamp is equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stamp {
    File(CmpFileMeta),
    Version(u64),
}

/// Where source texts come from.
pub trait Sources: Debug + Send + Sync {
    /// None if there's no regular file at `path`.
    fn stamp(&self, path: &Path) -> Result<Option<Stamp>>;

    fn read(&self, path: &Path) -> Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsSources;

impl Sources for FsSources {
    fn stamp(&self, path: &Path) -> Result<Option<Stamp>> {
        Ok(cmpfilemeta_of_path(path)?
           .filter(|m| m.kind == FileKind::File)
           .map(Stamp::File))
    }

    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| anyhow!("reading {:?}", path))
    }
}

/// Source files held in memory, for tests and embedding. Every
/// `insert` gives the file a new stamp.
#[derive(Debug, Default)]
pub struct MemSources {
    files: Mutex<(u64, BTreeMap<PathBuf, (u64, Arc<str>)>)>,
}

impl MemSources {
    pub fn new() -> MemSources {
        MemSources::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, text: &str) {
        let mut files = self.files.lock().expect("never poisoned");
        files.0 += 1;
        let version = files.0;
        files.1.insert(path.into(), (version, Arc::from(text)));
    }

    pub fn remove(&self, path: &Path) {
        self.files.lock().expect("never poisoned").1.remove(path);
    }

    /// Paths of all files, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().expect("never poisoned").1.keys().cloned().collect()
    }
}

impl Sources for MemSources {
    fn stamp(&self, path: &Path) -> Result<Option<Stamp>> {
        Ok(self.files.lock().expect("never poisoned").1.get(path)
           .map(|(v, _)| Stamp::Version(*v)))
    }

    fn read(&self, path: &Path) -> Result<String> {
        self.files.lock().expect("never poisoned").1.get(path)
            .map(|(_, text)| text.to_string())
            .ok_or_else(|| anyhow!("no such file: {:?}", path))
    }
}

/// The relative path `a.b.c` maps to (`a/b/c.chtml`); None for names
/// that can't be file names.
pub fn name_to_relpath(name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    let mut segments = name.split('.').peekable();
    while let Some(seg) = segments.next() {
        if seg.is_empty() || seg.contains(['/', '\\', '\0']) {
            return None
        }
        if segments.peek().is_some() {
            path.push(seg);
        } else {
            path.push(format!("{seg}.{SUFFIX}"));
        }
    }
    Some(path)
}

/// What components loaded by a `Loader` import through. Holds the
/// loader weakly, since the loader's cache holds the components.
#[derive(Debug)]
struct LoaderRef(Weak<Loader>);

impl Importer for LoaderRef {
    fn import(&self, name: &str, from: Option<&Path>)
              -> Result<Arc<dyn Component>, ImportError> {
        match self.0.upgrade() {
            Some(loader) => loader.import(name, from),
            None => Err(ImportError::Failed {
                name: KString::from_ref(name),
                source: anyhow!("the loader has been dropped"),
            }),
        }
    }
}

#[derive(Debug)]
pub struct Loader {
    sources: Arc<dyn Sources>,
    search_path: Vec<PathBuf>,
    evaluator: Arc<dyn Evaluator>,
    natives: Mutex<BTreeMap<KString, Arc<dyn Component>>>,
    cache: Mutex<HashMap<PathBuf, (Stamp, Arc<ChtmlComponent>)>>,
    me: Weak<Loader>,
}

impl Loader {
    pub fn new(sources: Arc<dyn Sources>,
               search_path: Vec<PathBuf>,
               evaluator: Arc<dyn Evaluator>) -> Arc<Loader> {
        Arc::new_cyclic(|me| Loader {
            sources,
            search_path,
            evaluator,
            natives: Default::default(),
            cache: Default::default(),
            me: me.clone(),
        })
    }

    pub fn sources(&self) -> &Arc<dyn Sources> {
        &self.sources
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Make `component` importable as `c:NAME`, ahead of any file.
    pub fn register(&self, name: &str, component: Arc<dyn Component>) {
        self.natives.lock().expect("never poisoned")
            .insert(KString::from_ref(name), component);
    }

    fn candidates(&self, name: &str, from: Option<&Path>) -> Vec<PathBuf> {
        let relpath = match name_to_relpath(name) {
            Some(p) => p,
            None => return Vec::new(),
        };
        let mut paths = Vec::new();
        if let Some(from) = from {
            let dir = from.parent().unwrap_or_else(|| Path::new(""));
            paths.push(dir.join(&relpath));
        }
        for dir in &self.search_path {
            paths.push(dir.join(&relpath));
        }
        paths
    }

    /// The file `c:NAME` would load, if any.
    pub fn resolve(&self, name: &str, from: Option<&Path>) -> Result<Option<PathBuf>> {
        for path in self.candidates(name, from) {
            if self.sources.stamp(&path)?.is_some() {
                return Ok(Some(path))
            }
        }
        Ok(None)
    }

    /// Whether `c:NAME` can be resolved, for validating documents.
    pub fn exists(&self, name: &str, from: Option<&Path>) -> bool {
        self.natives.lock().expect("never poisoned").contains_key(name)
            || matches!(self.resolve(name, from), Ok(Some(_)))
    }

    /// Load the file at `path` (cached), named `name` in diagnostics.
    pub fn load_path(&self, name: &str, path: &Path)
                     -> Result<Arc<ChtmlComponent>, ImportError> {
        dt!("load_path", name, path);
        let failed = |source: anyhow::Error| ImportError::Failed {
            name: KString::from_ref(name),
            source,
        };
        let stamp = match self.sources.stamp(path).map_err(failed)? {
            Some(stamp) => stamp,
            None => return Err(ImportError::NotFound { name: KString::from_ref(name) }),
        };
        if let Some((cached, component)) = self.cache.lock().expect("never poisoned").get(path) {
            if *cached == stamp {
                return Ok(component.clone())
            }
        }
        info!("loading {:?}", path);
        let text = self.sources.read(path).map_err(failed)?;
        let source = Arc::new(Source::new(path, text));
        let component = Arc::new(
            ChtmlComponent::parse(name,
                                  source,
                                  Arc::new(LoaderRef(self.me.clone())),
                                  self.evaluator.clone())
                .map_err(|e| failed(e.into()))?);
        self.cache.lock().expect("never poisoned")
            .insert(path.to_owned(), (stamp, component.clone()));
        Ok(component)
    }

    /// Parse the file at `path` without caching it, failing on
    /// references to components that can't be resolved.
    pub fn check_path(&self, path: &Path) -> Result<()> {
        let text = self.sources.read(path)?;
        let source = Source::new(path, text);
        let exists = |name: &str| self.exists(name, Some(path));
        parse_document_checked(&source, &exists)?;
        Ok(())
    }

    /// Drop all cached parses.
    pub fn clear_cache(&self) {
        self.cache.lock().expect("never poisoned").clear();
    }
}

impl Importer for Loader {
    fn import(&self, name: &str, from: Option<&Path>)
              -> Result<Arc<dyn Component>, ImportError> {
        if let Some(c) = self.natives.lock().expect("never poisoned").get(name) {
            return Ok(c.clone())
        }
        let path = self.resolve(name, from).map_err(|source| ImportError::Failed {
            name: KString::from_ref(name),
            source,
        })?;
        match path {
            Some(path) => Ok(self.load_path(name, &path)?),
            None => Err(ImportError::NotFound { name: KString::from_ref(name) }),
        }
    }
}
