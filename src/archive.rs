// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Archives are flat collections of named binary entries where the store keeps its sections and
//! the manifest.

use crate::core::parking_lot::Mutex;
use fxhash::FxHashMap;
use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};

/// Storage of named binary entries.
pub trait SectionArchive: Send + Sync {
    /// Reads the whole entry. Missing entries produce [`ErrorKind::NotFound`].
    fn read_entry(&self, name: &str) -> io::Result<Vec<u8>>;

    /// Creates or overwrites the entry.
    fn write_entry(&self, name: &str, data: &[u8]) -> io::Result<()>;

    /// Deletes the entry. Deleting a missing entry is not an error.
    fn delete_entry(&self, name: &str) -> io::Result<()>;

    fn has_entry(&self, name: &str) -> bool;
}

/// In-memory archive. Clones share the same entries, which allows keeping a handle to the data
/// after passing the archive to a store.
#[derive(Debug, Default, Clone)]
pub struct MemoryArchive {
    entries: Arc<Mutex<FxHashMap<String, Vec<u8>>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted names of every entry.
    pub fn entry_names(&self) -> Vec<String> {
        let mut names = self.entries.lock().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SectionArchive for MemoryArchive {
    fn read_entry(&self, name: &str) -> io::Result<Vec<u8>> {
        self.entries.lock().get(name).cloned().ok_or_else(|| {
            io::Error::new(ErrorKind::NotFound, format!("no such entry: {name}"))
        })
    }

    fn write_entry(&self, name: &str, data: &[u8]) -> io::Result<()> {
        self.entries.lock().insert(name.to_owned(), data.to_vec());
        Ok(())
    }

    fn delete_entry(&self, name: &str) -> io::Result<()> {
        self.entries.lock().remove(name);
        Ok(())
    }

    fn has_entry(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }
}

/// Archive that keeps every entry as a separate file in a directory.
#[derive(Debug, Clone)]
pub struct FsArchive {
    root: PathBuf,
}

impl FsArchive {
    /// Creates the archive, the directory is created if it does not exist.
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> io::Result<PathBuf> {
        // Entry names are flat, anything that could escape the root is rejected.
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid entry name: {name}"),
            ));
        }
        Ok(self.root.join(name))
    }
}

impl SectionArchive for FsArchive {
    fn read_entry(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path(name)?)
    }

    fn write_entry(&self, name: &str, data: &[u8]) -> io::Result<()> {
        fs::write(self.path(name)?, data)
    }

    fn delete_entry(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.path(name)?) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }

    fn has_entry(&self, name: &str) -> bool {
        self.path(name).is_ok_and(|path| path.is_file())
    }
}
