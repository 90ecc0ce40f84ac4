//! Resolved invocation for a bundle.
//!
//! A bundle kind is a closed set of variants so that a new kind is an
//! additive change that every `match` has to acknowledge.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// The program is exec'd directly with the argument list.
    Direct,
    /// The entry point is a shell script handed to a shell interpreter.
    ShellInterpreted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunSpec {
    /// `<interpreter> <script>`, e.g. `python3 main.py`.
    InterpretedScript { interpreter: String, script: PathBuf },
    /// `<shell> <script>`, e.g. `sh start.sh`.
    ShellScript { shell: String, script: PathBuf },
    /// `<package manager> start`, run from the bundle root.
    PackageManagerStart { program: String },
}

impl RunSpec {
    /// Ordered argument list; the first element is the program.
    pub fn argv(&self) -> Vec<String> {
        match self {
            RunSpec::InterpretedScript {
                interpreter,
                script,
            } => vec![interpreter.clone(), script.to_string_lossy().into_owned()],
            RunSpec::ShellScript { shell, script } => {
                vec![shell.clone(), script.to_string_lossy().into_owned()]
            }
            RunSpec::PackageManagerStart { program } => vec![program.clone(), "start".to_string()],
        }
    }

    pub fn program(&self) -> &str {
        match self {
            RunSpec::InterpretedScript { interpreter, .. } => interpreter,
            RunSpec::ShellScript { shell, .. } => shell,
            RunSpec::PackageManagerStart { program } => program,
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        match self {
            RunSpec::ShellScript { .. } => ExecutionMode::ShellInterpreted,
            RunSpec::InterpretedScript { .. } | RunSpec::PackageManagerStart { .. } => {
                ExecutionMode::Direct
            }
        }
    }
}

impl std::fmt::Display for RunSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpreted_script_argv() {
        let spec = RunSpec::InterpretedScript {
            interpreter: "python3".to_string(),
            script: PathBuf::from("main.py"),
        };
        assert_eq!(spec.argv(), vec!["python3", "main.py"]);
        assert_eq!(spec.program(), "python3");
        assert_eq!(spec.execution_mode(), ExecutionMode::Direct);
    }

    #[test]
    fn test_shell_script_argv() {
        let spec = RunSpec::ShellScript {
            shell: "sh".to_string(),
            script: PathBuf::from("start.sh"),
        };
        assert_eq!(spec.argv(), vec!["sh", "start.sh"]);
        assert_eq!(spec.execution_mode(), ExecutionMode::ShellInterpreted);
        assert_eq!(spec.to_string(), "sh start.sh");
    }

    #[test]
    fn test_package_manager_argv() {
        let spec = RunSpec::PackageManagerStart {
            program: "npm".to_string(),
        };
        assert_eq!(spec.argv(), vec!["npm", "start"]);
    }

    #[test]
    fn test_run_spec_serialization_is_tagged() {
        let spec = RunSpec::PackageManagerStart {
            program: "npm".to_string(),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["kind"], "package_manager_start");
    }
}
