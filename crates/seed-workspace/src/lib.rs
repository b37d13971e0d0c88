//! Parses `private:/`, `shared:/`, `public:/` scoped paths and resolves
//! them to sandboxed store paths, enforcing that no resolved path can
//! escape its scope root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use seed_domain::error::{Error, Result};
use seed_domain::scoped_path::{Scope, ScopedPath};

/// The slice of task-ancestry knowledge the resolver needs, kept narrow so
/// it stays ignorant of the event log / projection machinery. Implemented
/// by whatever holds the tasks projection.
pub trait TaskAncestry: Send + Sync {
    /// The id of the top-of-chain ancestor for `task_id` (itself if it has
    /// no parent). `None` if the task is unknown.
    fn root_of(&self, task_id: &str) -> Option<String>;
    /// Whether the root task identified by `root_task_id` has at least one
    /// descendant (child, grandchild, ...).
    fn has_descendant(&self, root_task_id: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub scope: Scope,
    pub scope_root_store_path: PathBuf,
    /// Path relative to `baseDir`.
    pub store_path: PathBuf,
    pub absolute_path: PathBuf,
    pub logical_path: String,
}

pub struct WorkspaceResolver {
    base_dir: PathBuf,
    tasks: Arc<dyn TaskAncestry>,
}

impl WorkspaceResolver {
    pub fn new(base_dir: impl Into<PathBuf>, tasks: Arc<dyn TaskAncestry>) -> Self {
        Self {
            base_dir: base_dir.into(),
            tasks,
        }
    }

    /// Resolves a logical path for a tool acting on behalf of `task_id`.
    /// `default_scope` is used when the logical path carries no `scope:/`
    /// prefix (the caller usually passes `Scope::Private`).
    pub fn resolve(&self, task_id: &str, logical_path: &str) -> Result<ResolvedPath> {
        if logical_path.contains('\0') {
            return Err(Error::InvalidPath(logical_path.to_string()));
        }
        let scoped = ScopedPath::parse(logical_path)?;
        let scope_root_store_path = self.scope_root(task_id, scoped.scope)?;
        let store_path = normalized_join(&scope_root_store_path, &scoped.rel);
        let absolute_path = self.absolute(&store_path);

        let scope_root_abs = self.absolute(&scope_root_store_path);
        let canonical_root = canonicalize_or_self(&scope_root_abs);
        let canonical_target = canonicalize_existing_prefix(&absolute_path);

        if canonical_target != canonical_root && !canonical_target.starts_with(&canonical_root) {
            return Err(Error::PathEscape {
                path: absolute_path.display().to_string(),
                scope_root: canonical_root.display().to_string(),
            });
        }

        Ok(ResolvedPath {
            scope: scoped.scope,
            scope_root_store_path,
            store_path,
            absolute_path,
            logical_path: scoped.to_logical(),
        })
    }

    /// The inverse of `resolve`: given the scope and its store-relative
    /// root, and a concrete store path under it, produce `scope:/rel`.
    pub fn map_store_path_to_logical(&self, scope: Scope, scope_root_store_path: &Path, store_path: &Path) -> Result<String> {
        let rel = store_path
            .strip_prefix(scope_root_store_path)
            .map_err(|_| Error::Validation(format!("{} is not under {}", store_path.display(), scope_root_store_path.display())))?;
        Ok(format!("{scope}:/{}", rel.display()))
    }

    /// Lazily provisions `private`/`shared` roots on first write. `public`
    /// is never auto-created.
    pub fn ensure_root(&self, resolved: &ResolvedPath) -> Result<()> {
        if resolved.scope != Scope::Public {
            std::fs::create_dir_all(self.absolute(&resolved.scope_root_store_path))?;
        }
        Ok(())
    }

    fn scope_root(&self, task_id: &str, scope: Scope) -> Result<PathBuf> {
        match scope {
            Scope::Private => Ok(PathBuf::from("private").join(task_id)),
            Scope::Public => Ok(PathBuf::from("public")),
            Scope::Shared => {
                let root = self
                    .tasks
                    .root_of(task_id)
                    .ok_or_else(|| Error::NotFound(format!("unknown task {task_id}")))?;
                if !self.tasks.has_descendant(&root) {
                    return Err(Error::Validation(format!(
                        "shared:/ is denied for standalone root task {root} with no children"
                    )));
                }
                Ok(PathBuf::from("shared").join(root))
            }
        }
    }

    fn absolute(&self, store_path: &Path) -> PathBuf {
        self.base_dir.join(store_path)
    }
}

/// Joins `rel` onto `base`, dropping `.` components and collapsing `..`
/// against preceding components instead of leaving them for the OS to
/// interpret. Lets a bare `"."` resolve to exactly the scope root rather
/// than `"<root>/."`, and keeps `store_path`/`map_store_path_to_logical`
/// producing clean relative paths.
fn normalized_join(base: &Path, rel: &str) -> PathBuf {
    let mut out = base.to_path_buf();
    for component in Path::new(rel).components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn canonicalize_or_self(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Canonicalizes the nearest existing ancestor of `path` and re-appends the
/// non-existent tail, so a path that doesn't exist yet (e.g. a file about
/// to be created) can still be checked for escape via symlink-free roots.
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                if !existing.pop() {
                    break;
                }
            }
            None => break,
        }
    }
    let mut canonical = canonicalize_or_self(&existing);
    for part in tail.into_iter().rev() {
        canonical.push(part);
    }
    canonical
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct FakeAncestry {
        parent: HashMap<String, String>,
        descendants: HashMap<String, bool>,
    }

    impl TaskAncestry for FakeAncestry {
        fn root_of(&self, task_id: &str) -> Option<String> {
            let mut cur = task_id.to_string();
            loop {
                match self.parent.get(&cur) {
                    Some(p) => cur = p.clone(),
                    None => return Some(cur),
                }
            }
        }
        fn has_descendant(&self, root_task_id: &str) -> bool {
            *self.descendants.get(root_task_id).unwrap_or(&false)
        }
    }

    fn resolver(dir: &Path, ancestry: FakeAncestry) -> WorkspaceResolver {
        WorkspaceResolver::new(dir.to_path_buf(), Arc::new(ancestry))
    }

    #[test]
    fn private_path_resolves_under_task_root() {
        let dir = tempdir().unwrap();
        let r = resolver(
            dir.path(),
            FakeAncestry {
                parent: HashMap::new(),
                descendants: HashMap::new(),
            },
        );
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        let resolved = r.resolve("T1", "private:/notes.md").unwrap();
        assert_eq!(resolved.store_path, PathBuf::from("private/T1/notes.md"));
    }

    #[test]
    fn bare_path_defaults_to_private() {
        let dir = tempdir().unwrap();
        let r = resolver(
            dir.path(),
            FakeAncestry {
                parent: HashMap::new(),
                descendants: HashMap::new(),
            },
        );
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        let resolved = r.resolve("T1", "notes.md").unwrap();
        assert_eq!(resolved.scope, Scope::Private);
    }

    #[test]
    fn shared_denied_on_standalone_root() {
        let dir = tempdir().unwrap();
        let mut descendants = HashMap::new();
        descendants.insert("T1".into(), false);
        let r = resolver(
            dir.path(),
            FakeAncestry {
                parent: HashMap::new(),
                descendants,
            },
        );
        assert!(r.resolve("T1", "shared:/x.txt").is_err());
    }

    #[test]
    fn shared_allowed_once_child_exists() {
        let dir = tempdir().unwrap();
        let mut parent = HashMap::new();
        parent.insert("T_child".to_string(), "T_root".to_string());
        let mut descendants = HashMap::new();
        descendants.insert("T_root".into(), true);
        let r = resolver(dir.path(), FakeAncestry { parent, descendants });
        std::fs::create_dir_all(dir.path().join("shared/T_root")).unwrap();

        let from_root = r.resolve("T_root", "shared:/handoff.txt").unwrap();
        let from_child = r.resolve("T_child", "shared:/handoff.txt").unwrap();
        assert_eq!(from_root.absolute_path, from_child.absolute_path);
    }

    #[test]
    fn escape_via_dotdot_is_rejected() {
        let dir = tempdir().unwrap();
        let r = resolver(
            dir.path(),
            FakeAncestry {
                parent: HashMap::new(),
                descendants: HashMap::new(),
            },
        );
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/secret.txt"), "s").unwrap();
        let err = r.resolve("T1", "private:/../secret.txt").unwrap_err();
        assert!(matches!(err, Error::PathEscape { .. }));
    }

    #[test]
    fn nul_byte_is_invalid_path() {
        let dir = tempdir().unwrap();
        let r = resolver(
            dir.path(),
            FakeAncestry {
                parent: HashMap::new(),
                descendants: HashMap::new(),
            },
        );
        let err = r.resolve("T1", "private:/a\0b").unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn map_store_path_to_logical_round_trips() {
        let dir = tempdir().unwrap();
        let r = resolver(
            dir.path(),
            FakeAncestry {
                parent: HashMap::new(),
                descendants: HashMap::new(),
            },
        );
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        let resolved = r.resolve("T1", "private:/sub/file.txt").unwrap();
        let logical = r
            .map_store_path_to_logical(resolved.scope, &resolved.scope_root_store_path, &resolved.store_path)
            .unwrap();
        assert_eq!(logical, "private:/sub/file.txt");
    }
}
