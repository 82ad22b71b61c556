//! Module loading
//!
//! Resolves same-language and host-language imports before any statement
//! executes. The import graph is walked recursively with a "currently
//! loading" stack for cycle detection; loaded modules are cached by
//! resolved absolute path, so diamond-shaped graphs parse each file once.
//!
//! Imported functions are bound into the run's function table. Module
//! faults are all raised here, during load; execution never starts on a
//! program with unresolved imports.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::executor::types::{FunctionDecl, ImportKind, Program, Stmt};
use crate::executor::vm::{Callable, FunctionOrigin, FunctionTable};
use crate::types::HostExport;

/// Type alias for module system results
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors that can occur in the module system
#[derive(Error, Debug)]
pub enum ModuleError {
    /// Import graph re-entered a path that is still loading
    #[error("circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency {
        /// The cycle, in import order, first and last element equal
        cycle: Vec<String>,
    },

    /// Two different sources were imported into the same local name
    #[error("import conflict: '{name}' is bound by both {existing} and {incoming}")]
    ImportConflict {
        name: String,
        existing: String,
        incoming: String,
    },

    /// Requested export was not found in the module
    #[error("export not found: '{name}' in module {module}")]
    ExportNotFound { name: String, module: String },

    /// Module could not be found at the resolved path
    #[error("module not found: {path}")]
    NotFound { path: PathBuf },

    /// Parse error while reading a module
    #[error("parse error in module {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Host module could not be scanned for exports
    #[error("host scan error in module {path}: {message}")]
    Scan { path: PathBuf, message: String },

    /// I/O error while reading a module
    #[error("io error reading module {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/* ===================== Front-end collaborators ===================== */

/// The external parser contract
///
/// The engine never owns a grammar: the front-end parses program source,
/// and `vibe` hands generated code back through the same interface.
pub trait CodeParser: Send + Sync {
    fn parse_program(&self, source: &str) -> std::result::Result<Program, String>;

    /// Parse one function declaration (the only fragment `vibe` accepts)
    fn parse_function(&self, source: &str) -> std::result::Result<FunctionDecl, String>;
}

/// Scans a host-language module for its callable exports
///
/// Host code is opaque to the engine; the scanner only has to find the
/// exported function names, parameters, and bodies. Evaluation happens in
/// the driver's sandbox when a call suspends on it.
pub trait HostModuleScanner: Send + Sync {
    fn scan(&self, source: &str) -> std::result::Result<HashMap<String, HostExport>, String>;
}

/// Parser for the front-end's serialized AST documents
///
/// The reference front-end emits programs as tagged-JSON statement lists;
/// this parser consumes that wire format directly. Embedders with their
/// own front-end plug in a different [`CodeParser`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl CodeParser for JsonParser {
    fn parse_program(&self, source: &str) -> std::result::Result<Program, String> {
        let body: Vec<Stmt> = serde_json::from_str(source).map_err(|e| e.to_string())?;
        Ok(Program { body })
    }

    fn parse_function(&self, source: &str) -> std::result::Result<FunctionDecl, String> {
        // Accept either a bare declaration or a single-statement document
        if let Ok(decl) = serde_json::from_str::<FunctionDecl>(source) {
            return Ok(decl);
        }
        match serde_json::from_str::<Stmt>(source) {
            Ok(Stmt::FunctionDecl { decl }) => Ok(decl),
            Ok(_) => Err("expected a function declaration".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/* ===================== Module table ===================== */

/// Module source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Aria,
    Host,
}

/// One export of a loaded module
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "t")]
pub enum Export {
    Function { decl: FunctionDecl },
    Host { export: HostExport },
}

/// A loaded module: cached by resolved path, never torn down mid-run
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModuleEntry {
    pub kind: ModuleKind,
    /// Content hash of the module source at load time
    pub version_hash: String,
    pub exports: HashMap<String, Export>,
}

/// Reference to a module in a serialized state document
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModuleRef {
    pub path: String,
    pub kind: ModuleKind,
    pub version_hash: String,
}

/// All modules loaded for one run, keyed by resolved absolute path
///
/// Owned by the engine state, not an ambient singleton: concurrent runs
/// never cross-contaminate. Populated at load time, read-only during
/// stepping.
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    entries: HashMap<String, ModuleEntry>,
}

impl ModuleTable {
    pub fn get(&self, path: &str) -> Option<&ModuleEntry> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: String, entry: ModuleEntry) {
        self.entries.insert(path, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a host export for a suspending call
    pub fn host_export(&self, path: &str, name: &str) -> Option<&HostExport> {
        match self.entries.get(path)?.exports.get(name)? {
            Export::Host { export } => Some(export),
            Export::Function { .. } => None,
        }
    }

    /// Look up an Aria function export (serializer rehydration)
    pub fn function_export(&self, path: &str, name: &str) -> Option<&FunctionDecl> {
        match self.entries.get(path)?.exports.get(name)? {
            Export::Function { decl } => Some(decl),
            Export::Host { .. } => None,
        }
    }

    /// Path references for the serialized state document
    pub fn refs(&self) -> Vec<ModuleRef> {
        let mut refs: Vec<ModuleRef> = self
            .entries
            .iter()
            .map(|(path, entry)| ModuleRef {
                path: path.clone(),
                kind: entry.kind,
                version_hash: entry.version_hash.clone(),
            })
            .collect();
        refs.sort_by(|a, b| a.path.cmp(&b.path));
        refs
    }
}

/// A program with its imports resolved, ready for `Vm::new`
#[derive(Debug, Clone)]
pub struct LoadedProgram {
    pub program: Program,
    pub functions: FunctionTable,
    pub modules: ModuleTable,
}

/* ===================== Loader ===================== */

/// Resolves an entry program and its import graph
pub struct ModuleLoader {
    parser: Arc<dyn CodeParser>,
    scanner: Option<Arc<dyn HostModuleScanner>>,
}

impl ModuleLoader {
    pub fn new(parser: Arc<dyn CodeParser>) -> Self {
        Self {
            parser,
            scanner: None,
        }
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn HostModuleScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Load an entry file and resolve its whole import graph
    pub fn load_program(&self, entry: &Path) -> Result<LoadedProgram> {
        let entry_path = canonicalize(entry)?;
        let source = read(&entry_path)?;
        let program = self
            .parser
            .parse_program(&source)
            .map_err(|message| ModuleError::Parse {
                path: entry_path.clone(),
                message,
            })?;

        let mut functions = FunctionTable::new();
        for stmt in &program.body {
            if let Stmt::FunctionDecl { decl } = stmt {
                functions.insert(
                    decl.name.clone(),
                    Callable::Function {
                        decl: decl.clone(),
                        origin: FunctionOrigin::Local,
                    },
                );
            }
        }

        let mut table = ModuleTable::default();
        let mut loading = vec![path_str(&entry_path)];
        self.resolve_imports(
            &program,
            entry_path.parent().unwrap_or(Path::new(".")),
            &mut table,
            &mut functions,
            &mut loading,
        )?;

        info!(
            modules = table.len(),
            functions = functions.len(),
            "loaded program {}",
            entry_path.display()
        );
        Ok(LoadedProgram {
            program,
            functions,
            modules: table,
        })
    }

    /// Reload one already-resolved module (state-document rehydration)
    pub fn reload_module(&self, path: &str, kind: ModuleKind) -> Result<ModuleEntry> {
        let path_buf = PathBuf::from(path);
        let source = read(&path_buf)?;
        match kind {
            ModuleKind::Aria => {
                let program =
                    self.parser
                        .parse_program(&source)
                        .map_err(|message| ModuleError::Parse {
                            path: path_buf,
                            message,
                        })?;
                Ok(make_aria_entry(&program, &source))
            }
            ModuleKind::Host => self.scan_host(&path_buf, &source),
        }
    }

    fn resolve_imports(
        &self,
        program: &Program,
        base: &Path,
        table: &mut ModuleTable,
        functions: &mut FunctionTable,
        loading: &mut Vec<String>,
    ) -> Result<()> {
        for stmt in &program.body {
            let Stmt::Import { names, from, kind } = stmt else {
                continue;
            };
            let path = resolve_import_path(base, from, *kind)?;
            let key = path_str(&path);

            // Re-entering a path that is still loading is a cycle
            if let Some(pos) = loading.iter().position(|p| p == &key) {
                let mut cycle: Vec<String> = loading[pos..].to_vec();
                cycle.push(key);
                return Err(ModuleError::CircularDependency { cycle });
            }

            if table.get(&key).is_none() {
                let entry = match kind {
                    ImportKind::Aria => {
                        self.load_aria_module(&path, table, functions, loading)?
                    }
                    ImportKind::Host => {
                        let source = read(&path)?;
                        self.scan_host(&path, &source)?
                    }
                };
                table.insert(key.clone(), entry);
            } else {
                debug!("module cache hit: {}", key);
            }

            let entry = table.get(&key).expect("inserted above").clone();
            for binding in names {
                let export = entry.exports.get(&binding.name).ok_or_else(|| {
                    ModuleError::ExportNotFound {
                        name: binding.name.clone(),
                        module: key.clone(),
                    }
                })?;
                let callable = match export {
                    Export::Function { decl } => Callable::Function {
                        decl: decl.clone(),
                        origin: FunctionOrigin::Module { path: key.clone() },
                    },
                    Export::Host { .. } => Callable::Host {
                        path: key.clone(),
                        name: binding.name.clone(),
                    },
                };
                bind(functions, binding.local_name(), callable, &key)?;
            }
        }
        Ok(())
    }

    fn load_aria_module(
        &self,
        path: &Path,
        table: &mut ModuleTable,
        functions: &mut FunctionTable,
        loading: &mut Vec<String>,
    ) -> Result<ModuleEntry> {
        let key = path_str(path);
        loading.push(key);
        let source = read(path)?;
        let program = self
            .parser
            .parse_program(&source)
            .map_err(|message| ModuleError::Parse {
                path: path.to_path_buf(),
                message,
            })?;

        // A module's own imports resolve before its exports are usable
        self.resolve_imports(
            &program,
            path.parent().unwrap_or(Path::new(".")),
            table,
            functions,
            loading,
        )?;

        loading.pop();
        debug!("loaded module {}", path.display());
        Ok(make_aria_entry(&program, &source))
    }

    fn scan_host(&self, path: &Path, source: &str) -> Result<ModuleEntry> {
        let scanner = self.scanner.as_ref().ok_or_else(|| ModuleError::Scan {
            path: path.to_path_buf(),
            message: "no host module scanner configured".to_string(),
        })?;
        let exports = scanner.scan(source).map_err(|message| ModuleError::Scan {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(ModuleEntry {
            kind: ModuleKind::Host,
            version_hash: hash(source),
            exports: exports
                .into_iter()
                .map(|(name, export)| (name, Export::Host { export }))
                .collect(),
        })
    }
}

/* ===================== Helpers ===================== */

fn make_aria_entry(program: &Program, source: &str) -> ModuleEntry {
    let mut exports = HashMap::new();
    for stmt in &program.body {
        if let Stmt::FunctionDecl { decl } = stmt {
            exports.insert(decl.name.clone(), Export::Function { decl: decl.clone() });
        }
    }
    ModuleEntry {
        kind: ModuleKind::Aria,
        version_hash: hash(source),
        exports,
    }
}

/// Bind an imported callable, rejecting collisions eagerly
fn bind(
    functions: &mut FunctionTable,
    local_name: &str,
    callable: Callable,
    module: &str,
) -> Result<()> {
    match functions.get(local_name) {
        None => {
            functions.insert(local_name.to_string(), callable);
            Ok(())
        }
        // Re-importing the identical source is idempotent
        Some(existing) if *existing == callable => Ok(()),
        Some(existing) => Err(ModuleError::ImportConflict {
            name: local_name.to_string(),
            existing: describe(existing),
            incoming: describe(&callable),
        }),
    }
}

fn describe(callable: &Callable) -> String {
    match callable {
        Callable::Function { origin, .. } => match origin {
            FunctionOrigin::Local => "the entry program".to_string(),
            FunctionOrigin::Module { path } => format!("module {}", path),
            FunctionOrigin::Generated => "generated code".to_string(),
        },
        Callable::Host { path, .. } => format!("host module {}", path),
    }
}

fn resolve_import_path(base: &Path, from: &str, kind: ImportKind) -> Result<PathBuf> {
    let mut path = base.join(from);
    if kind == ImportKind::Aria && path.extension().is_none() {
        path.set_extension("aria");
    }
    canonicalize(&path)
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|_| ModuleError::NotFound {
        path: path.to_path_buf(),
    })
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ModuleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_module(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn loader() -> ModuleLoader {
        ModuleLoader::new(Arc::new(JsonParser))
    }

    const HELPER_MODULE: &str = r#"[
        {"t": "FunctionDecl", "decl": {"name": "double", "params": ["n"], "body": [
            {"t": "Return", "value": {"t": "Binary", "op": "Mul",
             "left": {"t": "Ident", "name": "n"},
             "right": {"t": "LitNum", "v": 2}}}
        ]}}
    ]"#;

    #[test]
    fn loads_an_imported_function() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "helper.aria", HELPER_MODULE);
        let entry = write_module(
            dir.path(),
            "main.aria",
            r#"[
                {"t": "Import", "names": [{"name": "double"}], "from": "helper"},
                {"t": "Expr", "expr": {"t": "Call", "callee": "double",
                 "args": [{"t": "LitNum", "v": 4}]}}
            ]"#,
        );

        let loaded = loader().load_program(&entry).unwrap();
        assert_eq!(loaded.modules.len(), 1);
        assert!(matches!(
            loaded.functions.get("double"),
            Some(Callable::Function {
                origin: FunctionOrigin::Module { .. },
                ..
            })
        ));
    }

    #[test]
    fn import_alias_binds_the_local_name() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "helper.aria", HELPER_MODULE);
        let entry = write_module(
            dir.path(),
            "main.aria",
            r#"[{"t": "Import", "names": [{"name": "double", "alias": "twice"}],
                 "from": "helper"}]"#,
        );

        let loaded = loader().load_program(&entry).unwrap();
        assert!(loaded.functions.contains_key("twice"));
        assert!(!loaded.functions.contains_key("double"));
    }

    #[test]
    fn cycle_is_rejected_naming_the_full_path() {
        let dir = TempDir::new().unwrap();
        write_module(
            dir.path(),
            "a.aria",
            r#"[{"t": "Import", "names": [{"name": "f"}], "from": "b"}]"#,
        );
        write_module(
            dir.path(),
            "b.aria",
            r#"[{"t": "Import", "names": [{"name": "g"}], "from": "a"}]"#,
        );
        let entry = write_module(
            dir.path(),
            "main.aria",
            r#"[{"t": "Import", "names": [{"name": "f"}], "from": "a"}]"#,
        );

        let err = loader().load_program(&entry).unwrap_err();
        match err {
            ModuleError::CircularDependency { cycle } => {
                assert_eq!(cycle.len(), 3);
                assert!(cycle[0].ends_with("a.aria"));
                assert!(cycle[1].ends_with("b.aria"));
                assert!(cycle[2].ends_with("a.aria"));
            }
            other => panic!("expected cycle error, got {}", other),
        }
    }

    #[test]
    fn diamond_import_parses_the_shared_module_once() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "shared.aria", HELPER_MODULE);
        write_module(
            dir.path(),
            "left.aria",
            r#"[
                {"t": "Import", "names": [{"name": "double"}], "from": "shared"},
                {"t": "FunctionDecl", "decl": {"name": "left", "params": [], "body": []}}
            ]"#,
        );
        write_module(
            dir.path(),
            "right.aria",
            r#"[
                {"t": "Import", "names": [{"name": "double"}], "from": "shared"},
                {"t": "FunctionDecl", "decl": {"name": "right", "params": [], "body": []}}
            ]"#,
        );
        let entry = write_module(
            dir.path(),
            "main.aria",
            r#"[
                {"t": "Import", "names": [{"name": "left"}], "from": "left"},
                {"t": "Import", "names": [{"name": "right"}], "from": "right"}
            ]"#,
        );

        let loaded = loader().load_program(&entry).unwrap();
        // shared + left + right, each exactly once
        assert_eq!(loaded.modules.len(), 3);
        assert!(loaded.functions.contains_key("double"));
    }

    #[test]
    fn conflicting_bindings_are_rejected_eagerly() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "one.aria", HELPER_MODULE);
        write_module(
            dir.path(),
            "two.aria",
            r#"[{"t": "FunctionDecl", "decl": {"name": "double", "params": ["n"],
                 "body": [{"t": "Return", "value": {"t": "LitNum", "v": 0}}]}}]"#,
        );
        let entry = write_module(
            dir.path(),
            "main.aria",
            r#"[
                {"t": "Import", "names": [{"name": "double"}], "from": "one"},
                {"t": "Import", "names": [{"name": "double"}], "from": "two"}
            ]"#,
        );

        let err = loader().load_program(&entry).unwrap_err();
        assert!(matches!(err, ModuleError::ImportConflict { name, .. } if name == "double"));
    }

    #[test]
    fn missing_export_is_reported_before_execution() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "helper.aria", HELPER_MODULE);
        let entry = write_module(
            dir.path(),
            "main.aria",
            r#"[{"t": "Import", "names": [{"name": "nope"}], "from": "helper"}]"#,
        );

        let err = loader().load_program(&entry).unwrap_err();
        assert!(matches!(err, ModuleError::ExportNotFound { name, .. } if name == "nope"));
    }

    #[test]
    fn host_imports_require_a_scanner_and_bind_host_callables() {
        struct FakeScanner;
        impl HostModuleScanner for FakeScanner {
            fn scan(
                &self,
                _source: &str,
            ) -> std::result::Result<HashMap<String, HostExport>, String> {
                let mut exports = HashMap::new();
                exports.insert(
                    "fetch".to_string(),
                    HostExport {
                        params: vec!["url".to_string()],
                        body: "return http.get(url)".to_string(),
                    },
                );
                Ok(exports)
            }
        }

        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "net.py", "def fetch(url): ...");
        let entry = write_module(
            dir.path(),
            "main.aria",
            r#"[{"t": "Import", "names": [{"name": "fetch"}], "from": "net.py",
                 "kind": "Host"}]"#,
        );

        let err = loader().load_program(&entry).unwrap_err();
        assert!(matches!(err, ModuleError::Scan { .. }));

        let loaded = loader()
            .with_scanner(Arc::new(FakeScanner))
            .load_program(&entry)
            .unwrap();
        assert!(matches!(
            loaded.functions.get("fetch"),
            Some(Callable::Host { .. })
        ));
        let (path, _) = match loaded.functions.get("fetch") {
            Some(Callable::Host { path, name }) => (path.clone(), name.clone()),
            _ => unreachable!(),
        };
        assert!(loaded.modules.host_export(&path, "fetch").is_some());
    }
}
