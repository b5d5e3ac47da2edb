//! Vault sandbox: every `file:` path operation must resolve to a descendant
//! of the owning vault root (spec.md §8 "Sandbox" invariant).

use std::path::{Component, Path, PathBuf};

use crate::error::{EngineError, Result};

/// A vault directory root. Cheap to clone; carries no open file handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vault {
    pub name: String,
    pub root: PathBuf,
}

impl Vault {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.root.join("AssistantMD").join("Workflows")
    }

    pub fn context_templates_dir(&self) -> PathBuf {
        self.root.join("AssistantMD").join("ContextTemplates")
    }

    pub fn chat_sessions_dir(&self) -> PathBuf {
        self.root.join("AssistantMD").join("Chat_Sessions")
    }

    pub fn ignore_marker(&self) -> PathBuf {
        self.root.join(".vaultignore")
    }

    pub fn is_ignored(&self) -> bool {
        self.ignore_marker().is_file()
    }

    /// Resolve a vault-relative path, rejecting `..`, absolute prefixes, and
    /// symlink escapes. Returns the absolute path on success.
    ///
    /// Per spec.md §8: any input containing `..` or an absolute prefix fails
    /// (we fail it purely lexically, before ever touching the filesystem,
    /// so a malicious pattern can't even probe existence).
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel_path = Path::new(relative);
        if rel_path.is_absolute() {
            return Err(EngineError::VaultBoundary(format!(
                "absolute path not allowed: {relative}"
            )));
        }
        for component in rel_path.components() {
            match component {
                Component::ParentDir => {
                    return Err(EngineError::VaultBoundary(format!(
                        "parent-dir segment not allowed: {relative}"
                    )));
                }
                Component::Normal(_) | Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => {
                    return Err(EngineError::VaultBoundary(format!(
                        "absolute path not allowed: {relative}"
                    )));
                }
            }
        }

        let candidate = self.root.join(rel_path);
        self.check_symlink_escape(&candidate)?;
        Ok(candidate)
    }

    /// Walk from the deepest existing ancestor of `candidate` and confirm
    /// no symlink hop lands outside `self.root`.
    fn check_symlink_escape(&self, candidate: &Path) -> Result<()> {
        let mut existing = candidate;
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        let canonical_root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let canonical_existing = existing
            .canonicalize()
            .unwrap_or_else(|_| existing.to_path_buf());
        if !canonical_existing.starts_with(&canonical_root) {
            return Err(EngineError::VaultBoundary(format!(
                "symlink escape detected: {}",
                candidate.display()
            )));
        }
        Ok(())
    }
}

/// Stable global identifier: `vault_name/workflow_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub String);

impl GlobalId {
    pub fn new(vault: &str, name: &str) -> Self {
        Self(format!("{vault}/{name}"))
    }

    pub fn vault(&self) -> &str {
        self.0.split_once('/').map(|(v, _)| v).unwrap_or(&self.0)
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or("")
    }
}

impl std::fmt::Display for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Digest of a file's contents, used by Pending State to detect edits.
pub fn digest_bytes(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn digest_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(digest_bytes(&bytes))
}
