//! File metadata that can be used as key to verify (with good chance,
//! given good faith actors) if a file has changed on disk since it
//! was read.

use std::{fs::Metadata, os::unix::prelude::MetadataExt, path::Path, time::SystemTime};

use anyhow::{Context, Result};

use crate::easy_fs::FileKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmpFileMeta {
    pub kind: FileKind,
    pub modified_time: SystemTime,
    pub ino: u64,
    pub len: u64, // size
}

pub trait GetCmpFileMeta {
    fn cmpfilemeta(&self) -> Result<CmpFileMeta>;
}

impl GetCmpFileMeta for Metadata {
    fn cmpfilemeta(&self) -> Result<CmpFileMeta> {
        Ok(CmpFileMeta {
            kind: FileKind::of(&self.file_type()),
            modified_time: self.modified()?,
            ino: self.ino(),
            len: self.len()
        })
    }
}

/// None if there's nothing at `path`.
pub fn cmpfilemeta_of_path(path: &Path) -> Result<Option<CmpFileMeta>> {
    match std::fs::metadata(path) {
        Ok(m) => Ok(Some(m.cmpfilemeta().with_context(
            || format!("getting metadata of {:?}", path))?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("stat {:?}", path)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_cmpfilemeta() {
        let dir = std::env::temp_dir().join(format!("chtml-cmpfilemeta-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("a.chtml");
        std::fs::write(&path, "one").unwrap();
        let m1 = cmpfilemeta_of_path(&path).unwrap().unwrap();
        assert_eq!(m1.kind, FileKind::File);
        assert_eq!(m1.len, 3);
        std::fs::write(&path, "three").unwrap();
        let m2 = cmpfilemeta_of_path(&path).unwrap().unwrap();
        assert_ne!(m1, m2);
        assert_eq!(cmpfilemeta_of_path(&dir.join("nope")).unwrap(), None);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
