//! Resolves '/'-separated paths against the dirent cache.

use alloc::string::String;
use alloc::vec::Vec;

use crate::fs::FsError;
use crate::fs::dirent::{self, Dirent};

/// A path to resolve, relative to some base directory the caller supplies.
/// Absolute paths (leading `/`) start from the root regardless of the base.
pub struct Path<'a> {
    raw: &'a str,
}

impl<'a> Path<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    pub fn as_str(&self) -> &str {
        self.raw
    }

    fn is_absolute(&self) -> bool {
        self.raw.starts_with('/')
    }

    fn base(&self, cwd: Dirent) -> Dirent {
        if self.is_absolute() { dirent::root() } else { cwd }
    }

    /// Walks every component of the path starting from `base` (root if this
    /// path is absolute, `base` otherwise), returning the final dirent with
    /// an incremented reference count.
    pub fn resolve(&self, base: Dirent) -> Result<Dirent, FsError> {
        let mut cur = self.base(base).dup();
        for comp in self.raw.split('/').filter(|s| !s.is_empty()) {
            cur = step(cur, comp)?;
        }
        Ok(cur)
    }

    /// Walks every component but the last, returning the parent directory
    /// (ref-incremented) and the final component's name. Used by callers
    /// that are about to create or remove an entry in that parent.
    pub fn resolve_parent(&self, base: Dirent) -> Result<(Dirent, String), FsError> {
        let mut comps: Vec<&str> = self.raw.split('/').filter(|s| !s.is_empty()).collect();
        let Some(last) = comps.pop() else {
            return Err(FsError::NotFound);
        };

        let mut cur = self.base(base).dup();
        for comp in comps {
            cur = step(cur, comp)?;
        }
        Ok((cur, String::from(last)))
    }
}

/// Advances past one non-empty path component, consuming the caller's
/// reference to `dir` and returning a fresh reference to the next directory.
fn step(dir: Dirent, comp: &str) -> Result<Dirent, FsError> {
    if comp == "." {
        return Ok(dir);
    }

    if comp == ".." {
        return Ok(match dir.parent() {
            Some(parent) => {
                let parent = parent.dup();
                dir.put();
                parent
            }
            // already at the root; ".." from there stays put
            None => dir,
        });
    }

    match dirent::dirlookup(&dir, comp) {
        Ok((child, _off)) => {
            dir.put();
            Ok(child)
        }
        Err(e) => {
            dir.put();
            Err(e)
        }
    }
}
