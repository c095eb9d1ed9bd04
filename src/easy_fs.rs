use std::{ffi::OsString, fs::{self, FileType}, path::PathBuf};

use anyhow::{Result, Context, anyhow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Dir,
    File,
    Other  // device files, sockets, pipes, ?
}

impl FileKind {
    /// Symlinks count as what they point to only if `ft` came from
    /// following them (`fs::metadata`), otherwise as Other.
    pub fn of(ft: &FileType) -> FileKind {
        if ft.is_dir() {
            FileKind::Dir
        } else if ft.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        }
    }
}

/// The entries of a directory; symlinks are followed.
pub fn easy_filenames_in_dir<P>(
    path: P
) -> Result<impl Iterator<Item = Result<(OsString, FileKind)>>>
where PathBuf: From<P>
{
    let pathbuf: PathBuf = path.into();
    Ok(fs::read_dir(&pathbuf).with_context(
        || anyhow!("can't open directory for reading: {:?}",
                   pathbuf.to_string_lossy()))?
       .map(
           move |entry_result: Result<fs::DirEntry, std::io::Error>|
                                      -> Result<(OsString, FileKind)>
           {
               let entry = entry_result.with_context(
                   || anyhow!("reading directory: {:?}", pathbuf.to_string_lossy()))?;
               let mut ft = entry.file_type().with_context(
                   || anyhow!("file type of {:?}", entry.path()))?;
               if ft.is_symlink() {
                   if let Ok(m) = fs::metadata(entry.path()) {
                       ft = m.file_type();
                   }
               }
               Ok((entry.file_name(), FileKind::of(&ft)))
           }))
}
