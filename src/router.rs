//! File based routing: mapping URL paths to `.chtml` components (or
//! static files) below a root directory.
//!
//! Per directory level, an exact name wins over a dynamic entry
//! (`_NAME`, binding the segment to parameter NAME), which wins over a
//! catch-all file (`__NAME.chtml`, binding the rest of the path). A
//! trailing slash, or a final segment naming a directory, routes to
//! `index`. Entries starting with `.` are never matched.

use std::{collections::BTreeMap,
          fmt::Debug,
          path::{Path, PathBuf}};

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use kstring::KString;
use pct_str::PctStr;
use thiserror::Error;

use crate::{dt,
            easy_fs::{easy_filenames_in_dir, FileKind},
            ident::canonical_name,
            loader::SUFFIX,
            value::{Value, Vars}};

/// The fallback page of a site, never routed to.
pub const ERROR_PAGE: &str = "_error.chtml";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("more than one dynamic {what} in {dir:?}: {}", .names.iter().join(", "))]
    MultipleDynamic { dir: PathBuf, what: &'static str, names: Vec<KString> },
    #[error("more than one catch-all in {dir:?}: {}", .names.iter().join(", "))]
    MultipleCatchAll { dir: PathBuf, names: Vec<KString> },
    #[error("parameter {name:?} bound twice, again in {dir:?}")]
    DuplicateParam { dir: PathBuf, name: KString },
}

/// Read access to the directory tree routed over. Paths are relative
/// to the root.
pub trait Listing: Debug + Send + Sync {
    /// The names and kinds of the entries of `dir`, or None if `dir`
    /// is not a directory.
    fn entries(&self, dir: &Path) -> Result<Option<Vec<(KString, FileKind)>>>;

    /// The path a relative path should be opened with.
    fn full_path(&self, relpath: &Path) -> PathBuf;
}

#[derive(Debug, Clone)]
pub struct FsListing {
    root: PathBuf,
}

impl FsListing {
    pub fn new(root: impl Into<PathBuf>) -> FsListing {
        FsListing { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Listing for FsListing {
    fn entries(&self, dir: &Path) -> Result<Option<Vec<(KString, FileKind)>>> {
        let path = self.root.join(dir);
        if !path.is_dir() {
            return Ok(None)
        }
        let mut entries = Vec::new();
        for entry in easy_filenames_in_dir(&path)? {
            let (name, kind) = entry?;
            // names that aren't unicode can't be routed to
            if let Some(name) = name.to_str() {
                entries.push((KString::from_ref(name), kind));
            }
        }
        Ok(Some(entries))
    }

    fn full_path(&self, relpath: &Path) -> PathBuf {
        self.root.join(relpath)
    }
}

/// A listing of an explicit set of files; directories are implied.
#[derive(Debug, Clone, Default)]
pub struct MemListing {
    dirs: BTreeMap<PathBuf, BTreeMap<KString, FileKind>>,
}

impl MemListing {
    pub fn new() -> MemListing {
        let mut dirs = BTreeMap::new();
        dirs.insert(PathBuf::new(), BTreeMap::new());
        MemListing { dirs }
    }

    pub fn from_paths<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> MemListing {
        let mut listing = MemListing::new();
        for p in paths {
            listing.add_file(p.as_ref());
        }
        listing
    }

    pub fn add_file(&mut self, path: &Path) {
        let mut kind = FileKind::File;
        let mut path = path.to_owned();
        while let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            let name = KString::from_string(name.to_string_lossy().into_owned());
            self.dirs.entry(parent.to_owned()).or_default().insert(name, kind);
            kind = FileKind::Dir;
            path = parent.to_owned();
        }
    }
}

impl Listing for MemListing {
    fn entries(&self, dir: &Path) -> Result<Option<Vec<(KString, FileKind)>>> {
        Ok(self.dirs.get(dir).map(
            |entries| entries.iter().map(|(n, k)| (n.clone(), *k)).collect()))
    }

    fn full_path(&self, relpath: &Path) -> PathBuf {
        relpath.to_owned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteMatch {
    Component {
        path: PathBuf,
        /// In canonical form, including the catch-all's.
        params: BTreeMap<KString, KString>,
    },
    Static(PathBuf),
}

impl RouteMatch {
    /// The parameters as variables for the component.
    pub fn vars(&self) -> Vars {
        match self {
            RouteMatch::Component { params, .. } =>
                params.iter().map(|(k, v)| (k.clone(), Value::from(v.clone()))).collect(),
            RouteMatch::Static(_) => Vars::new(),
        }
    }
}

/// Split and decode a URL path. None for paths that can't match.
pub fn url_path_segments(url_path: &str) -> Option<Vec<KString>> {
    split_url_path(url_path).map(|(segments, _)| segments)
}

/// Also tells whether the last segment is an `index` standing in for
/// an empty path or a trailing slash.
fn split_url_path(url_path: &str) -> Option<(Vec<KString>, bool)> {
    let url_path = url_path.split(['?', '#']).next().unwrap_or("");
    let mut segments = Vec::new();
    for raw in url_path.split('/') {
        if raw.is_empty() {
            continue
        }
        let seg = PctStr::new(raw).ok()?.decode();
        if seg == "." || seg == ".." || seg.contains(['/', '\0']) {
            return None
        }
        segments.push(KString::from_string(seg));
    }
    let implicit_index = url_path.is_empty() || url_path.ends_with('/');
    if implicit_index {
        segments.push(KString::from_static("index"));
    }
    Some((segments, implicit_index))
}

/// The classified entries of one directory.
#[derive(Debug, Default)]
struct Dir {
    exact: BTreeMap<KString, FileKind>,
    dynamic_dir: Option<KString>,
    dynamic_file: Option<KString>,
    catchall: Option<KString>,
}

fn strip_suffix(name: &str) -> Option<&str> {
    name.strip_suffix(SUFFIX)?.strip_suffix('.')
}

#[derive(Debug)]
pub struct Router<L: Listing> {
    listing: L,
}

impl<L: Listing> Router<L> {
    pub fn new(listing: L) -> Router<L> {
        Router { listing }
    }

    pub fn listing(&self) -> &L {
        &self.listing
    }

    fn dir(&self, dir: &Path) -> Result<Option<Dir>> {
        let entries = match self.listing.entries(dir)
            .with_context(|| format!("listing {:?}", dir))? {
                Some(e) => e,
                None => return Ok(None),
            };
        let mut d = Dir::default();
        let mut dynamic_dirs = Vec::new();
        let mut dynamic_files = Vec::new();
        let mut catchalls = Vec::new();
        for (name, kind) in entries {
            if name.starts_with('.') || name == ERROR_PAGE {
                continue
            }
            if let Some(rest) = name.strip_prefix("__") {
                if kind == FileKind::File {
                    if let Some(stem) = strip_suffix(rest) {
                        catchalls.push(KString::from_ref(stem));
                    }
                }
            } else if let Some(rest) = name.strip_prefix('_') {
                match kind {
                    FileKind::Dir => dynamic_dirs.push(KString::from_ref(rest)),
                    FileKind::File => if let Some(stem) = strip_suffix(rest) {
                        dynamic_files.push(KString::from_ref(stem));
                    },
                    FileKind::Other => (),
                }
            } else if kind != FileKind::Other {
                d.exact.insert(name, kind);
            }
        }
        let dir = dir.to_owned();
        if dynamic_dirs.len() > 1 {
            bail!(RouteError::MultipleDynamic { dir, what: "directories", names: dynamic_dirs })
        }
        if dynamic_files.len() > 1 {
            bail!(RouteError::MultipleDynamic { dir, what: "files", names: dynamic_files })
        }
        if catchalls.len() > 1 {
            bail!(RouteError::MultipleCatchAll { dir, names: catchalls })
        }
        d.dynamic_dir = dynamic_dirs.pop();
        d.dynamic_file = dynamic_files.pop();
        d.catchall = catchalls.pop();
        Ok(Some(d))
    }

    /// Resolve `url_path`; Ok(None) means no match, errors are
    /// problems with the directory layout.
    pub fn route(&self, url_path: &str) -> Result<Option<RouteMatch>> {
        dt!("route", url_path);
        let (segments, implicit_index) = match split_url_path(url_path) {
            Some(s) => s,
            None => return Ok(None),
        };
        let mut params = BTreeMap::new();
        self.walk(Path::new(""), &segments, implicit_index, &mut params)
    }

    fn bind(dir: &Path, params: &mut BTreeMap<KString, KString>, name: &str, value: KString)
            -> Result<KString, RouteError> {
        let name = canonical_name(name);
        if params.contains_key(&name) {
            return Err(RouteError::DuplicateParam { dir: dir.to_owned(), name })
        }
        params.insert(name.clone(), value);
        Ok(name)
    }

    fn component(&self, relpath: PathBuf, params: &BTreeMap<KString, KString>) -> RouteMatch {
        RouteMatch::Component {
            path: self.listing.full_path(&relpath),
            params: params.clone(),
        }
    }

    /// `implicit_index`: the last of `segments` is a substituted
    /// `index`, which is never bound to a parameter.
    fn walk(&self,
            dirpath: &Path,
            segments: &[KString],
            implicit_index: bool,
            params: &mut BTreeMap<KString, KString>) -> Result<Option<RouteMatch>> {
        let dir = match self.dir(dirpath)? {
            Some(d) => d,
            None => return Ok(None),
        };
        let (seg, rest) = match segments.split_first() {
            Some(x) => x,
            None => return Ok(None),
        };

        if rest.is_empty() {
            // sources are never served
            if strip_suffix(seg).is_some() {
                return Ok(None)
            }
            let filename = format!("{seg}.{SUFFIX}");
            if !seg.starts_with('_') {
                if dir.exact.get(filename.as_str()) == Some(&FileKind::File) {
                    return Ok(Some(self.component(dirpath.join(&filename), params)))
                }
                match dir.exact.get(seg.as_str()) {
                    Some(FileKind::File) =>
                        return Ok(Some(RouteMatch::Static(
                            self.listing.full_path(&dirpath.join(seg.as_str()))))),
                    Some(FileKind::Dir) => {
                        let index = [KString::from_static("index")];
                        if let Some(m) = self.walk(&dirpath.join(seg.as_str()), &index, true, params)? {
                            return Ok(Some(m))
                        }
                    }
                    _ => ()
                }
            }
            if let (Some(name), false) = (&dir.dynamic_file, implicit_index) {
                let key = Self::bind(dirpath, params, name, seg.clone())?;
                let m = self.component(dirpath.join(format!("_{name}.{SUFFIX}")), params);
                params.remove(&key);
                return Ok(Some(m))
            }
            if let (Some(name), false) = (&dir.dynamic_dir, implicit_index) {
                let key = Self::bind(dirpath, params, name, seg.clone())?;
                let index = [KString::from_static("index")];
                let m = self.walk(&dirpath.join(format!("_{name}")), &index, true, params)?;
                params.remove(&key);
                if m.is_some() {
                    return Ok(m)
                }
            }
        } else {
            let exact = !seg.starts_with('_')
                && dir.exact.get(seg.as_str()) == Some(&FileKind::Dir);
            if exact {
                if let Some(m) = self.walk(&dirpath.join(seg.as_str()), rest, implicit_index,
                                           params)? {
                    return Ok(Some(m))
                }
            } else if let Some(name) = &dir.dynamic_dir {
                let key = Self::bind(dirpath, params, name, seg.clone())?;
                let m = self.walk(&dirpath.join(format!("_{name}")), rest, implicit_index,
                                  params)?;
                params.remove(&key);
                if m.is_some() {
                    return Ok(m)
                }
            }
        }

        if let Some(name) = &dir.catchall {
            let real = if implicit_index { &segments[..segments.len() - 1] } else { segments };
            let remainder = KString::from_string(real.iter().join("/"));
            let key = Self::bind(dirpath, params, name, remainder)?;
            let m = self.component(dirpath.join(format!("__{name}.{SUFFIX}")), params);
            params.remove(&key);
            return Ok(Some(m))
        }
        Ok(None)
    }
}
