//! Folder-tree path addressing for the blueprint panel.
//!
//! A folder's position in the tree is an ordered chain of stable folder
//! identifiers, ending in the folder's own id. Renaming a folder changes
//! only its display label; the identifiers in the chain never change.
//! Paths cross the wire as `/`-joined strings ([`FolderPath::to_string`] /
//! [`FolderPath::parse`]); inside the client they stay structured.
//!
//! Reparenting rewrites the moved node's path and recomputes every
//! descendant by prefix replacement. A descendant whose path no longer
//! carries the old prefix (it was moved independently in the meantime)
//! is skipped, so concurrent moves are absorbed rather than reported.

use std::collections::HashMap;
use std::fmt;

/// Ordered folder-identifier chain. Empty = the top-level list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FolderPath {
    segments: Vec<String>,
}

impl FolderPath {
    /// The top-level (empty) path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse the wire form. Empty string parses to the root path.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::root();
        }
        Self {
            segments: raw.split('/').map(str::to_owned).collect(),
        }
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last identifier in the chain — the node's own id.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The containing path (everything but the leaf).
    pub fn parent(&self) -> FolderPath {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// Extend this path with one more identifier.
    pub fn child(&self, id: impl Into<String>) -> FolderPath {
        let mut segments = self.segments.clone();
        segments.push(id.into());
        Self { segments }
    }

    /// Whether `prefix` is a (non-strict) prefix of this path.
    pub fn starts_with(&self, prefix: &FolderPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Replace the `old_prefix` of this path with `new_prefix`.
    ///
    /// Returns `None` when the path is not under `old_prefix` — the
    /// stale-write absorption rule: a rewrite only ever touches paths
    /// still carrying the pre-move prefix.
    pub fn rebase(&self, old_prefix: &FolderPath, new_prefix: &FolderPath) -> Option<FolderPath> {
        if !self.starts_with(old_prefix) {
            return None;
        }
        let mut segments = new_prefix.segments.clone();
        segments.extend_from_slice(&self.segments[old_prefix.segments.len()..]);
        Some(Self { segments })
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// A folder node: stable id, display label, current path.
#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub path: FolderPath,
}

/// The folder tree plus the leaf entries (blueprints) filed under it.
///
/// Folders are addressed by path (their id chain); leaf entries carry the
/// path of the folder that contains them (root for the top-level list).
/// Sibling order is insertion order; a reparented node is placed first
/// among its new siblings.
#[derive(Debug, Default)]
pub struct PathIndex {
    folders: HashMap<String, Folder>,
    entries: HashMap<String, FolderPath>,
    order: HashMap<FolderPath, Vec<String>>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a folder under `parent`. Returns the new folder's path.
    pub fn insert_folder(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        parent: &FolderPath,
    ) -> FolderPath {
        let id = id.into();
        let path = parent.child(id.clone());
        self.folders.insert(
            id.clone(),
            Folder {
                id: id.clone(),
                name: name.into(),
                path: path.clone(),
            },
        );
        self.order.entry(parent.clone()).or_default().push(id);
        path
    }

    /// File a leaf entry under the folder at `folder_path` (root = top level).
    pub fn insert_entry(&mut self, id: impl Into<String>, folder_path: FolderPath) {
        let id = id.into();
        self.order
            .entry(folder_path.clone())
            .or_default()
            .push(id.clone());
        self.entries.insert(id, folder_path);
    }

    pub fn folder(&self, id: &str) -> Option<&Folder> {
        self.folders.get(id)
    }

    /// Look a folder up by its full path.
    pub fn folder_at(&self, path: &FolderPath) -> Option<&Folder> {
        path.leaf().and_then(|id| {
            self.folders
                .get(id)
                .filter(|folder| &folder.path == path)
        })
    }

    pub fn entry_path(&self, id: &str) -> Option<&FolderPath> {
        self.entries.get(id)
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Ordered child ids (folders and entries) directly under `parent`.
    pub fn children_of(&self, parent: &FolderPath) -> &[String] {
        self.order
            .get(parent)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Change a folder's display label. The path is untouched.
    pub fn rename_folder(&mut self, path: &FolderPath, new_name: impl Into<String>) -> bool {
        let Some(id) = path.leaf() else {
            return false;
        };
        match self.folders.get_mut(id) {
            Some(folder) if &folder.path == path => {
                folder.name = new_name.into();
                true
            }
            _ => {
                log::debug!("rename for unknown folder path {path}");
                false
            }
        }
    }

    /// Reparent the folder at `old_path` under `new_parent`, rewriting
    /// every descendant path that still carries the old prefix.
    ///
    /// Returns the folder's new path, or `None` when `old_path` no longer
    /// names a folder (absorbed as stale) or the move would place the
    /// folder inside its own subtree.
    pub fn move_folder(
        &mut self,
        old_path: &FolderPath,
        new_parent: &FolderPath,
    ) -> Option<FolderPath> {
        let folder_id = old_path.leaf()?.to_owned();
        match self.folders.get(&folder_id) {
            Some(folder) if &folder.path == old_path => {}
            _ => {
                log::debug!("move for unknown folder path {old_path}");
                return None;
            }
        }
        if new_parent.starts_with(old_path) {
            log::debug!("refusing to move {old_path} into its own subtree");
            return None;
        }

        let new_path = new_parent.child(folder_id.clone());

        // Rewrite the folder itself and every descendant still under the
        // old prefix. Independently-moved descendants fail the prefix
        // check and are left alone.
        for folder in self.folders.values_mut() {
            if let Some(rebased) = folder.path.rebase(old_path, &new_path) {
                folder.path = rebased;
            }
        }
        for entry_path in self.entries.values_mut() {
            if let Some(rebased) = entry_path.rebase(old_path, &new_path) {
                *entry_path = rebased;
            }
        }

        // Order keys are paths too; carry the buckets across the rename.
        let moved_keys: Vec<FolderPath> = self
            .order
            .keys()
            .filter(|key| key.starts_with(old_path))
            .cloned()
            .collect();
        for key in moved_keys {
            if let Some(bucket) = self.order.remove(&key) {
                // Unwrap is fine: key passed starts_with above.
                let new_key = key.rebase(old_path, &new_path).unwrap();
                self.order.entry(new_key).or_default().extend(bucket);
            }
        }

        // Detach from the old siblings, lead the new ones.
        if let Some(siblings) = self.order.get_mut(&old_path.parent()) {
            siblings.retain(|id| id != &folder_id);
        }
        self.order
            .entry(new_parent.clone())
            .or_default()
            .insert(0, folder_id);

        Some(new_path)
    }

    /// Remove the folder at `path` together with every descendant folder
    /// and entry. Returns the removed entry ids so callers can drop the
    /// matching records.
    pub fn remove_folder(&mut self, path: &FolderPath) -> Vec<String> {
        let Some(folder_id) = path.leaf().map(str::to_owned) else {
            return Vec::new();
        };
        match self.folders.get(&folder_id) {
            Some(folder) if &folder.path == path => {}
            _ => return Vec::new(),
        }

        self.folders
            .retain(|_, folder| !folder.path.starts_with(path));

        let removed_entries: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry_path)| entry_path.starts_with(path))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &removed_entries {
            self.entries.remove(id);
        }

        self.order.retain(|key, _| !key.starts_with(path));
        if let Some(siblings) = self.order.get_mut(&path.parent()) {
            siblings.retain(|id| id != &folder_id);
        }

        removed_entries
    }

    /// Drop a single leaf entry.
    pub fn remove_entry(&mut self, id: &str) -> Option<FolderPath> {
        let path = self.entries.remove(id)?;
        if let Some(siblings) = self.order.get_mut(&path) {
            siblings.retain(|sibling| sibling != id);
        }
        Some(path)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.folders.clear();
        self.entries.clear();
        self.order.clear();
    }
}
