//! Runtime command composition
//
// Each runtime gets a handler that turns a staged workspace (and an optional
// network guard) into the single shell command the executor runs, plus any
// support files that must be written before it.

use crate::config::types::{RuntimeSettings, RuntimesConfig};
use crate::core_types::Runtime;
use crate::executors::{shell_quote, workspace_path};
use crate::guard::GuardModule;
use crate::workspace::StagedWorkspace;

/// File name of the Python wrapper that imports the guard before the entrypoint.
pub const PYTHON_WRAPPER_NAME: &str = "__main_wrapper__.py";

/// A composed command and the extra files it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    /// `(relative_path, content)` pairs to write before executing.
    pub support_files: Vec<(String, String)>,
}

impl Invocation {
    fn plain(command: String) -> Self {
        Self {
            command,
            support_files: Vec::new(),
        }
    }
}

// ----------------- RuntimeHandler Trait and Implementations -----------------

trait RuntimeHandler {
    fn compose(&self, staged: &StagedWorkspace, guard: Option<&GuardModule>) -> Invocation;
}

struct PythonRuntime<'a> {
    settings: &'a RuntimeSettings,
}

impl RuntimeHandler for PythonRuntime<'_> {
    fn compose(&self, staged: &StagedWorkspace, guard: Option<&GuardModule>) -> Invocation {
        let entrypoint = staged.entrypoint_path();
        if guard.is_none() {
            return Invocation::plain(format!(
                "{} {}",
                self.settings.interpreter,
                shell_quote(&entrypoint)
            ));
        }

        let wrapper = python_wrapper_source(&entrypoint);
        let wrapper_path = workspace_path(&staged.root, PYTHON_WRAPPER_NAME);
        Invocation {
            command: format!(
                "{} {}",
                self.settings.interpreter,
                shell_quote(&wrapper_path)
            ),
            support_files: vec![(PYTHON_WRAPPER_NAME.to_string(), wrapper)],
        }
    }
}

struct NodeRuntime<'a> {
    settings: &'a RuntimeSettings,
}

impl RuntimeHandler for NodeRuntime<'_> {
    fn compose(&self, staged: &StagedWorkspace, guard: Option<&GuardModule>) -> Invocation {
        let entrypoint = staged.entrypoint_path();
        match guard {
            Some(module) => Invocation::plain(format!(
                "{} -r {} {}",
                self.settings.interpreter,
                shell_quote(&workspace_path(&staged.root, &module.file_name)),
                shell_quote(&entrypoint)
            )),
            None => Invocation::plain(format!(
                "{} {}",
                self.settings.interpreter,
                shell_quote(&entrypoint)
            )),
        }
    }
}

const ENTRYPOINT_PLACEHOLDER: &str = "__DOCLE_ENTRYPOINT__";

// The entrypoint runs as `__main__` with its own directory first on
// `sys.path`, the same as `python <entrypoint>` would set up.
const PYTHON_WRAPPER_TEMPLATE: &str = r#"import os
import sys

import __network_guard__

_docle_entry = __DOCLE_ENTRYPOINT__
sys.path.insert(0, os.path.dirname(_docle_entry))
sys.argv[0] = _docle_entry
_docle_globals = {"__name__": "__main__", "__file__": _docle_entry, "__builtins__": __builtins__}
with open(_docle_entry, "rb") as _docle_file:
    _docle_code = compile(_docle_file.read(), _docle_entry, "exec")
exec(_docle_code, _docle_globals)
"#;

/// Wrapper that imports the guard module and then runs the entrypoint in
/// the same interpreter. The path is embedded as a JSON string, which is
/// also a valid Python string literal.
fn python_wrapper_source(entrypoint: &str) -> String {
    let quoted =
        serde_json::to_string(entrypoint).unwrap_or_else(|_| format!("{:?}", entrypoint));
    PYTHON_WRAPPER_TEMPLATE.replacen(ENTRYPOINT_PLACEHOLDER, &quoted, 1)
}

// ----------------- CommandComposer -----------------

#[derive(Debug, Clone, Default)]
pub struct CommandComposer {
    runtimes: RuntimesConfig,
}

impl CommandComposer {
    pub fn new(runtimes: RuntimesConfig) -> Self {
        Self { runtimes }
    }

    pub fn runtimes(&self) -> &RuntimesConfig {
        &self.runtimes
    }

    pub fn compose(
        &self,
        runtime: Runtime,
        staged: &StagedWorkspace,
        guard: Option<&GuardModule>,
    ) -> Invocation {
        let invocation = self.handler(runtime).compose(staged, guard);
        log::debug!(
            "Composed {} invocation: '{}' ({} support file(s))",
            runtime,
            invocation.command,
            invocation.support_files.len()
        );
        invocation
    }

    fn handler(&self, runtime: Runtime) -> Box<dyn RuntimeHandler + '_> {
        let settings = self.runtimes.for_runtime(runtime);
        match runtime {
            Runtime::Python => Box::new(PythonRuntime { settings }),
            Runtime::Node => Box::new(NodeRuntime { settings }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{GuardTemplate, GUARD_MODULE_NAME};

    fn staged(entrypoint: &str) -> StagedWorkspace {
        StagedWorkspace {
            root: "/workspace".to_string(),
            entrypoint: entrypoint.to_string(),
            written: vec![entrypoint.to_string()],
        }
    }

    fn guard(runtime: Runtime) -> GuardModule {
        GuardTemplate::for_runtime(runtime, &["example.com".to_string()]).render()
    }

    #[test]
    fn test_unguarded_commands() {
        let composer = CommandComposer::default();

        let python = composer.compose(Runtime::Python, &staged("main.py"), None);
        assert_eq!(python.command, "python3 /workspace/main.py");
        assert!(python.support_files.is_empty());

        let node = composer.compose(Runtime::Node, &staged("src/index.js"), None);
        assert_eq!(node.command, "node /workspace/src/index.js");
        assert!(node.support_files.is_empty());
    }

    #[test]
    fn test_guarded_python_uses_wrapper() {
        let composer = CommandComposer::default();
        let guard = guard(Runtime::Python);

        let invocation = composer.compose(Runtime::Python, &staged("app.py"), Some(&guard));
        assert_eq!(invocation.command, "python3 /workspace/__main_wrapper__.py");
        assert_eq!(invocation.support_files.len(), 1);

        let (path, source) = &invocation.support_files[0];
        assert_eq!(path, PYTHON_WRAPPER_NAME);
        assert!(source.contains(&format!("import {}\n", GUARD_MODULE_NAME)));
        assert!(source.contains(r#"_docle_entry = "/workspace/app.py""#));
        assert!(!source.contains(ENTRYPOINT_PLACEHOLDER));
    }

    #[test]
    fn test_wrapper_runs_entrypoint_like_the_interpreter() {
        let source = python_wrapper_source("/workspace/src/app.py");

        // Guard first, while the workspace root is still sys.path[0].
        let guard_import = source.find("import __network_guard__").unwrap();
        let path_insert = source
            .find("sys.path.insert(0, os.path.dirname(_docle_entry))")
            .unwrap();
        assert!(guard_import < path_insert);

        assert!(source.contains(r#""__name__": "__main__""#));
        assert!(source.contains(r#""__file__": _docle_entry"#));
        assert!(source.contains("exec(_docle_code, _docle_globals)"));
    }

    #[test]
    fn test_paths_with_shell_metacharacters_are_quoted() {
        let composer = CommandComposer::default();

        let python = composer.compose(Runtime::Python, &staged("my app.py"), None);
        assert_eq!(python.command, "python3 '/workspace/my app.py'");

        let node = composer.compose(Runtime::Node, &staged("x;rm -rf $HOME.js"), None);
        assert_eq!(node.command, "node '/workspace/x;rm -rf $HOME.js'");

        let guard = guard(Runtime::Node);
        let guarded = composer.compose(Runtime::Node, &staged("it's.js"), Some(&guard));
        assert_eq!(
            guarded.command,
            r#"node -r /workspace/__network_guard__.js '/workspace/it'\''s.js'"#
        );
    }

    #[test]
    fn test_guarded_node_preloads_guard() {
        let composer = CommandComposer::default();
        let guard = guard(Runtime::Node);

        let invocation = composer.compose(Runtime::Node, &staged("main.js"), Some(&guard));
        assert_eq!(
            invocation.command,
            "node -r /workspace/__network_guard__.js /workspace/main.js"
        );
        assert!(invocation.support_files.is_empty());
    }

    #[test]
    fn test_wrapper_quotes_awkward_paths() {
        let source = python_wrapper_source("/workspace/it's \"here\".py");
        assert!(source.contains(r#"_docle_entry = "/workspace/it's \"here\".py""#));
    }

    #[test]
    fn test_configured_interpreter_is_used() {
        let mut runtimes = RuntimesConfig::default();
        runtimes.python.interpreter = "/opt/python/bin/python3.12".to_string();
        let composer = CommandComposer::new(runtimes);

        let invocation = composer.compose(Runtime::Python, &staged("main.py"), None);
        assert_eq!(invocation.command, "/opt/python/bin/python3.12 /workspace/main.py");
    }
}
