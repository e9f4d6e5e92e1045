//! Script bundler adapter.
//!
//! Bundling is delegated to an external command configured in
//! `[scripts].bundler`. The command receives the entry script's path through
//! the `{entry}` placeholder and must print the bundle to stdout, e.g.
//! `["esbuild", "{entry}", "--bundle"]`. With no command configured the entry
//! script is emitted unchanged.

use super::{Adapter, AdapterError, Transformed};
use crate::fileset::{FileSet, SourceFile};
use crate::layout::SCRIPT_OUTPUT;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct ScriptBundler {
    command: Vec<String>,
    entry_dir: PathBuf,
}

impl ScriptBundler {
    /// `entry_dir` is the directory the input set's paths are relative to.
    pub fn new(command: Vec<String>, entry_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            entry_dir: entry_dir.into(),
        }
    }

    fn bundle(&self, program: &str, args: &[String], entry: &Path) -> Result<Vec<u8>, AdapterError> {
        let entry_str = entry.to_string_lossy();
        let output = Command::new(program)
            .args(args.iter().map(|a| a.replace("{entry}", &entry_str)))
            .current_dir(&self.entry_dir)
            .output()
            .map_err(|source| AdapterError::Spawn {
                tool: self.name(),
                program: program.to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(AdapterError::Failed {
                tool: self.name(),
                file: entry.to_path_buf(),
                message: format!(
                    "`{program}` exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output.stdout)
    }
}

impl Adapter for ScriptBundler {
    fn name(&self) -> &'static str {
        "bundler"
    }

    fn apply(&self, input: FileSet) -> Result<Transformed, AdapterError> {
        let mut out = FileSet::new();
        for file in input {
            let contents = match self.command.split_first() {
                Some((program, args)) => {
                    self.bundle(program, args, &self.entry_dir.join(&file.path))?
                }
                None => file.contents,
            };
            out.push(SourceFile::new(SCRIPT_OUTPUT, contents));
        }
        Ok(out.into())
    }
}
