//! Entry-point resolution for unpacked bundles.

use bundlevisor_core::RunSpec;
use std::path::{Path, PathBuf};
use tracing::debug;

const PREFERRED_SCRIPTS: [&str; 3] = ["bot.py", "main.py", "run.py"];
const PACKAGE_MANIFEST: &str = "package.json";
const START_SCRIPT: &str = "start.sh";

/// Programs used to run each bundle kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub python_interpreter: String,
    pub package_manager: String,
    pub shell: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            python_interpreter: if cfg!(windows) { "python" } else { "python3" }.to_string(),
            package_manager: "npm".to_string(),
            shell: if cfg!(unix) { "sh" } else { "bash" }.to_string(),
        }
    }
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            python_interpreter: std::env::var("BUNDLEVISOR_PYTHON")
                .unwrap_or(defaults.python_interpreter),
            package_manager: std::env::var("BUNDLEVISOR_NPM").unwrap_or(defaults.package_manager),
            shell: std::env::var("BUNDLEVISOR_SHELL").unwrap_or(defaults.shell),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryPointResolver {
    config: ResolverConfig,
}

impl EntryPointResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Decide how to run the bundle in `bundle_dir`. Pure inspection.
    ///
    /// Policy, first match wins: a preferred Python script, a Node
    /// `package.json`, any other `*.py`, then `start.sh`.
    pub fn resolve(&self, bundle_dir: &Path) -> Option<RunSpec> {
        for name in PREFERRED_SCRIPTS {
            if bundle_dir.join(name).is_file() {
                return Some(self.python(name));
            }
        }

        if bundle_dir.join(PACKAGE_MANIFEST).is_file() {
            return Some(RunSpec::PackageManagerStart {
                program: self.config.package_manager.clone(),
            });
        }

        if let Some(script) = first_python_script(bundle_dir) {
            return Some(self.python(&script));
        }

        if bundle_dir.join(START_SCRIPT).is_file() {
            return Some(RunSpec::ShellScript {
                shell: self.config.shell.clone(),
                script: PathBuf::from(START_SCRIPT),
            });
        }

        debug!(bundle_dir = %bundle_dir.display(), "No entry point found");
        None
    }

    fn python(&self, script: &str) -> RunSpec {
        RunSpec::InterpretedScript {
            interpreter: self.config.python_interpreter.clone(),
            script: PathBuf::from(script),
        }
    }
}

// Sorted so the pick is stable across platforms.
fn first_python_script(bundle_dir: &Path) -> Option<String> {
    let entries = std::fs::read_dir(bundle_dir).ok()?;
    let mut scripts: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".py"))
        .collect();
    scripts.sort();
    scripts.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn bundle(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            fs::write(dir.path().join(file), "").unwrap();
        }
        dir
    }

    fn resolver() -> EntryPointResolver {
        EntryPointResolver::new(ResolverConfig {
            python_interpreter: "python3".to_string(),
            package_manager: "npm".to_string(),
            shell: "sh".to_string(),
        })
    }

    #[test]
    fn test_preferred_script_order() {
        let dir = bundle(&["run.py", "main.py", "bot.py"]);
        let spec = resolver().resolve(dir.path()).unwrap();
        assert_eq!(spec.argv(), vec!["python3", "bot.py"]);

        let dir = bundle(&["run.py", "main.py"]);
        let spec = resolver().resolve(dir.path()).unwrap();
        assert_eq!(spec.argv(), vec!["python3", "main.py"]);
    }

    #[test]
    fn test_package_json_beats_arbitrary_python() {
        let dir = bundle(&["package.json", "helper.py"]);
        let spec = resolver().resolve(dir.path()).unwrap();
        assert_eq!(spec.argv(), vec!["npm", "start"]);
    }

    #[test]
    fn test_preferred_python_beats_package_json() {
        let dir = bundle(&["package.json", "main.py"]);
        let spec = resolver().resolve(dir.path()).unwrap();
        assert_eq!(spec.argv(), vec!["python3", "main.py"]);
    }

    #[test]
    fn test_any_python_script_fallback() {
        let dir = bundle(&["zeta.py", "alpha.py", "start.sh"]);
        let spec = resolver().resolve(dir.path()).unwrap();
        assert_eq!(spec.argv(), vec!["python3", "alpha.py"]);
    }

    #[test]
    fn test_start_sh_resolves_to_shell() {
        let dir = bundle(&["start.sh", "README.md"]);
        let spec = resolver().resolve(dir.path()).unwrap();
        assert_eq!(spec.argv(), vec!["sh", "start.sh"]);
        assert_eq!(
            spec.execution_mode(),
            bundlevisor_core::ExecutionMode::ShellInterpreted
        );
    }

    #[test]
    fn test_nothing_runnable() {
        let dir = bundle(&["README.md", "data.json"]);
        assert!(resolver().resolve(dir.path()).is_none());
    }

    #[test]
    fn test_directories_named_like_scripts_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("main.py")).unwrap();
        assert!(resolver().resolve(dir.path()).is_none());
    }

    #[test]
    fn test_nested_scripts_are_not_considered() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src").join("main.py"), "").unwrap();
        assert!(resolver().resolve(dir.path()).is_none());
    }

    #[test]
    fn test_configured_interpreter_is_used() {
        let dir = bundle(&["bot.py"]);
        let resolver = EntryPointResolver::new(ResolverConfig {
            python_interpreter: "/opt/python/bin/python3.12".to_string(),
            ..ResolverConfig::default()
        });
        let spec = resolver.resolve(dir.path()).unwrap();
        assert_eq!(spec.program(), "/opt/python/bin/python3.12");
    }
}
