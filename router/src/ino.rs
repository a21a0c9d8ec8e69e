// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Inode namespace over the handler plane.
//!
//! External bindings expose every handler as a file in a hierarchy:
//!
//! ```text
//! /                     root
//! /.e/                  elements by number
//! /.e/<n>/<handler>     handler files of element n
//! /.h/<handler>         global handlers
//! /<name>/              one directory per element; '/' in element names
//!                       makes nested directories
//! /<name>/<handler>     handler files
//! ```
//!
//! Inodes are 32-bit: bit 31 marks a handler file (handler index in bits
//! 16..31, element number + 1 in bits 0..16, zero for globals); directories
//! carry a type in bits 28..31 and an entry number below. Inode 0 is
//! reserved. The table is stable for one router generation and rebuilt when
//! the generation moves.

use crate::element::EIndex;
use crate::router::RouterInner;

/// Directory type: `/.e`.
pub const DT_ENUMBERS: u32 = 1;
/// Directory type: `/.h`.
pub const DT_GLOBALH: u32 = 2;
/// Directory type: `/.e/<n>`.
pub const DT_EHANDLERS: u32 = 3;
/// Directory type: `/<name>` (an entry-table index).
pub const DT_NAME: u32 = 4;
/// Directory type: the root.
pub const DT_GLOBAL: u32 = 5;

/// The root directory inode.
pub const INO_ROOT: u32 = DT_GLOBAL << 28;
/// The `/.e` directory inode.
pub const INO_ENUMBERS: u32 = DT_ENUMBERS << 28;
/// The `/.h` directory inode.
pub const INO_GLOBALH: u32 = DT_GLOBALH << 28;

const HANDLER_BIT: u32 = 0x8000_0000;

/// Inode of a handler file. `element` is `None` for global handlers.
///
/// # Panics
///
/// Panics if the handler index exceeds 15 bits or the element number 16
/// bits; routers of that size are rejected at link time.
#[must_use]
pub fn handler_ino(element: Option<EIndex>, hindex: usize) -> u32 {
    let e = element.map_or(0u32, |e| u32::try_from(e + 1).unwrap_or(0));
    assert!(e <= 0xFFFF, "element number out of inode range");
    let h = u32::try_from(hindex).unwrap_or(0);
    assert!(h <= 0x7FFF, "handler index out of inode range");
    HANDLER_BIT | (h << 16) | e
}

/// True for handler-file inodes.
#[must_use]
pub fn is_handler(ino: u32) -> bool {
    ino & HANDLER_BIT != 0
}

/// The element a handler inode belongs to; `None` for globals.
#[must_use]
pub fn handler_element(ino: u32) -> Option<EIndex> {
    match ino & 0xFFFF {
        0 => None,
        e => Some(e as EIndex - 1),
    }
}

/// The handler index inside a handler inode.
#[must_use]
pub fn handler_index(ino: u32) -> usize {
    ((ino >> 16) & 0x7FFF) as usize
}

/// Directory type of a directory inode.
#[must_use]
pub fn dir_type(ino: u32) -> u32 {
    debug_assert!(!is_handler(ino));
    ino >> 28
}

fn dir_payload(ino: u32) -> usize {
    (ino & 0x0FFF_FFFF) as usize
}

#[derive(Debug, Clone)]
struct InoEntry {
    /// Full hierarchical path ("a", "a/b").
    path: String,
    /// The real element at this path, if one exists (compound prefixes are
    /// fake directories).
    eindex: Option<EIndex>,
}

/// The directory table for one router generation.
#[derive(Debug, Default)]
pub struct InoTable {
    entries: Vec<InoEntry>,
    generation: u32,
}

impl InoTable {
    /// An empty table; [`InoTable::prepare`] fills it.
    #[must_use]
    pub fn new() -> Self {
        InoTable::default()
    }

    /// Rebuild if the router's generation moved. Cheap when it did not.
    pub fn prepare(&mut self, router: &RouterInner) {
        if self.generation == router.generation() && !self.entries.is_empty() {
            return;
        }
        let mut entries: Vec<InoEntry> = Vec::new();
        for e in 0..router.nelements() {
            let name = router.name(e);
            entries.push(InoEntry {
                path: name.to_string(),
                eindex: Some(e),
            });
            // fake directories for compound prefixes
            let mut slash = 0;
            while let Some(next) = name[slash..].find('/') {
                let prefix = &name[..slash + next];
                if !entries.iter().any(|x| x.path == prefix) {
                    entries.push(InoEntry {
                        path: prefix.to_string(),
                        eindex: None,
                    });
                }
                slash += next + 1;
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|a, b| {
            if a.path == b.path {
                b.eindex = b.eindex.or(a.eindex);
                true
            } else {
                false
            }
        });
        self.entries = entries;
        self.generation = router.generation();
    }

    /// The router generation this table reflects.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn entry_ino(&self, xindex: usize) -> u32 {
        (DT_NAME << 28) | u32::try_from(xindex + 1).unwrap_or(0)
    }

    fn entry_at(&self, ino: u32) -> Option<&InoEntry> {
        self.entries.get(dir_payload(ino).checked_sub(1)?)
    }

    fn find_path(&self, path: &str) -> Option<usize> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
    }

    fn children<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (usize, &'a InoEntry)> {
        self.entries.iter().enumerate().filter(move |(_, e)| {
            if prefix.is_empty() {
                !e.path.contains('/')
            } else {
                e.path.len() > prefix.len() + 1
                    && e.path.starts_with(prefix)
                    && e.path.as_bytes()[prefix.len()] == b'/'
                    && !e.path[prefix.len() + 1..].contains('/')
            }
        })
    }

    /// Resolve `name` inside directory `dir`. Errors are errno codes.
    pub fn lookup(&self, router: &RouterInner, dir: u32, name: &str) -> Result<u32, i32> {
        if is_handler(dir) {
            return Err(crate::errno::ENOENT);
        }
        match dir_type(dir) {
            DT_GLOBAL => match name {
                ".e" => Ok(INO_ENUMBERS),
                ".h" => Ok(INO_GLOBALH),
                _ => {
                    let xi = self.find_path(name).ok_or(crate::errno::ENOENT)?;
                    Ok(self.entry_ino(xi))
                }
            },
            DT_ENUMBERS => {
                let e: usize = name.parse().map_err(|_| crate::errno::ENOENT)?;
                if e < router.nelements() {
                    Ok((DT_EHANDLERS << 28) | u32::try_from(e + 1).unwrap_or(0))
                } else {
                    Err(crate::errno::ENOENT)
                }
            }
            DT_GLOBALH => router
                .find_handler(None, name)
                .map(|h| handler_ino(None, h))
                .ok_or(crate::errno::ENOENT),
            DT_EHANDLERS => {
                let e = dir_payload(dir).checked_sub(1).ok_or(crate::errno::ENOENT)?;
                router
                    .find_handler(Some(e), name)
                    .map(|h| handler_ino(Some(e), h))
                    .ok_or(crate::errno::ENOENT)
            }
            DT_NAME => {
                let entry = self.entry_at(dir).ok_or(crate::errno::ENOENT)?;
                let child_path = format!("{}/{name}", entry.path);
                if let Some(xi) = self.find_path(&child_path) {
                    return Ok(self.entry_ino(xi));
                }
                let e = entry.eindex.ok_or(crate::errno::ENOENT)?;
                router
                    .find_handler(Some(e), name)
                    .map(|h| handler_ino(Some(e), h))
                    .ok_or(crate::errno::ENOENT)
            }
            _ => Err(crate::errno::ENOENT),
        }
    }

    /// Enumerate directory `dir` starting at `*f_pos`; `out` returns false
    /// to pause (the cursor resumes there). `.` and `..` are the caller's
    /// business.
    pub fn readdir(
        &self,
        router: &RouterInner,
        dir: u32,
        f_pos: &mut usize,
        out: &mut dyn FnMut(&str, u32) -> bool,
    ) -> Result<(), i32> {
        if is_handler(dir) {
            return Err(crate::errno::ENOENT);
        }
        let mut listing: Vec<(String, u32)> = Vec::new();
        match dir_type(dir) {
            DT_GLOBAL => {
                listing.push((".e".to_string(), INO_ENUMBERS));
                listing.push((".h".to_string(), INO_GLOBALH));
                for (xi, entry) in self.children("") {
                    listing.push((entry.path.clone(), self.entry_ino(xi)));
                }
            }
            DT_ENUMBERS => {
                for e in 0..router.nelements() {
                    listing.push((
                        e.to_string(),
                        (DT_EHANDLERS << 28) | u32::try_from(e + 1).unwrap_or(0),
                    ));
                }
            }
            DT_GLOBALH => {
                for (name, h) in router.handler_names(None) {
                    listing.push((name, handler_ino(None, h)));
                }
            }
            DT_EHANDLERS => {
                let e = dir_payload(dir).checked_sub(1).ok_or(crate::errno::ENOENT)?;
                for (name, h) in router.handler_names(Some(e)) {
                    listing.push((name, handler_ino(Some(e), h)));
                }
            }
            DT_NAME => {
                let entry = self.entry_at(dir).ok_or(crate::errno::ENOENT)?;
                let path = entry.path.clone();
                for (xi, child) in self.children(&path) {
                    let short = child.path[path.len() + 1..].to_string();
                    listing.push((short, self.entry_ino(xi)));
                }
                if let Some(e) = entry.eindex {
                    for (name, h) in router.handler_names(Some(e)) {
                        listing.push((name, handler_ino(Some(e), h)));
                    }
                }
            }
            _ => return Err(crate::errno::ENOENT),
        }
        while *f_pos < listing.len() {
            let (name, ino) = &listing[*f_pos];
            if !out(name, *ino) {
                return Ok(());
            }
            *f_pos += 1;
        }
        Ok(())
    }

    /// Link count: directories count their subdirectories plus 2; handler
    /// files are 1.
    pub fn nlink(&self, router: &RouterInner, ino: u32) -> Result<usize, i32> {
        if is_handler(ino) {
            return Ok(1);
        }
        match dir_type(ino) {
            DT_GLOBAL => Ok(2 + 2 + self.children("").count()),
            DT_ENUMBERS => Ok(2 + router.nelements()),
            DT_GLOBALH | DT_EHANDLERS => Ok(2),
            DT_NAME => {
                let entry = self.entry_at(ino).ok_or(crate::errno::ENOENT)?;
                Ok(2 + self.children(&entry.path).count())
            }
            _ => Err(crate::errno::ENOENT),
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handler_ino_round_trip() {
        let ino = handler_ino(Some(7), 42);
        assert!(is_handler(ino));
        assert_eq!(handler_element(ino), Some(7));
        assert_eq!(handler_index(ino), 42);

        let global = handler_ino(None, 3);
        assert_eq!(handler_element(global), None);
        assert_eq!(handler_index(global), 3);
    }

    #[test]
    fn inode_zero_is_never_produced() {
        assert_ne!(INO_ROOT, 0);
        assert_ne!(INO_ENUMBERS, 0);
        assert_ne!(handler_ino(None, 0), 0);
    }

    #[test]
    fn directory_types() {
        assert_eq!(dir_type(INO_ROOT), DT_GLOBAL);
        assert_eq!(dir_type(INO_ENUMBERS), DT_ENUMBERS);
        assert_eq!(dir_type(INO_GLOBALH), DT_GLOBALH);
    }
}
