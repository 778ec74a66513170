//! Name <-> inode table for the flat namespace.
//!
//! Inode numbers are handed out on first sight of a filename and never
//! reused during a mount, so the kernel's cached lookups stay valid even
//! when an emoji disappears from the catalog. Names the kernel holds a
//! lookup reference on are dropped once it forgets all of them.

use std::collections::HashMap;

pub const ROOT_INO: u64 = 1;

#[derive(Debug)]
pub struct InodeTable {
    by_name: HashMap<String, u64>,
    by_ino: HashMap<u64, String>,
    // kernel lookup references per inode
    lookups: HashMap<u64, u64>,
    next: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self {
            by_name: HashMap::new(),
            by_ino: HashMap::new(),
            lookups: HashMap::new(),
            next: ROOT_INO + 1,
        }
    }
}

impl InodeTable {
    pub fn ino_for(&mut self, name: &str) -> u64 {
        if let Some(&ino) = self.by_name.get(name) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_name.insert(name.to_string(), ino);
        self.by_ino.insert(ino, name.to_string());
        ino
    }

    /// `ino_for` plus one kernel lookup reference, as taken by a `lookup`,
    /// `create` or `readdirplus` reply.
    pub fn remember(&mut self, name: &str) -> u64 {
        let ino = self.ino_for(name);
        *self.lookups.entry(ino).or_default() += 1;
        ino
    }

    /// Drop `nlookup` references to `ino`; the name goes with the last one.
    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        let Some(count) = self.lookups.get_mut(&ino) else {
            return;
        };
        *count = count.saturating_sub(nlookup);
        if *count == 0 {
            self.lookups.remove(&ino);
            if let Some(name) = self.by_ino.remove(&ino) {
                self.by_name.remove(&name);
            }
        }
    }

    pub fn name_of(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }

    /// Absolute path of `ino`, `/` for the root.
    pub fn path_of(&self, ino: u64) -> Option<String> {
        if ino == ROOT_INO {
            return Some("/".to_string());
        }
        self.name_of(ino).map(|name| format!("/{name}"))
    }
}
