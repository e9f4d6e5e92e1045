//! File transform adapters.
//!
//! Every external tool the pipeline drives sits behind the [`Adapter`] trait:
//! it consumes a [`FileSet`] and produces a [`FileSet`]. Tasks never talk to
//! a tool directly, so each one can be swapped for a recording mock in tests.
//!
//! | Adapter | Tool | Used by |
//! |---|---|---|
//! | [`TemplateCompiler`] | minijinja | `template-compile` |
//! | [`StyleCompiler`] | grass | `style-compile` |
//! | [`ScriptBundler`] | external command (stdout) | `script-bundle` |
//! | [`ImageOptimizer`] | `image` crate | `image-optimize` |
//! | [`FaviconGenerator`] | `image` crate | `favicon-generate` |
//! | [`UrlRewriter`] | regex | `rewrite-urls`, `release` |
//! | [`Passthrough`] | none | `static-image-copy` |

pub mod favicon;
pub mod images;
pub mod replace;
pub mod scripts;
pub mod styles;
pub mod templates;

pub use favicon::FaviconGenerator;
pub use images::ImageOptimizer;
pub use replace::UrlRewriter;
pub use scripts::ScriptBundler;
pub use styles::StyleCompiler;
pub use templates::TemplateCompiler;

use crate::fileset::FileSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{tool}: {} failed: {message}", .file.display())]
    Failed {
        tool: &'static str,
        file: PathBuf,
        message: String,
    },
    #[error("{tool}: could not run `{program}`: {source}")]
    Spawn {
        tool: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A recoverable problem in one input file. The file is dropped from the
/// output; the rest of the set is still transformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintError {
    pub file: PathBuf,
    pub message: String,
}

/// Result of a transform: the produced files plus any lint errors for
/// inputs that were skipped.
#[derive(Debug, Default)]
pub struct Transformed {
    pub files: FileSet,
    pub lint: Vec<LintError>,
}

impl From<FileSet> for Transformed {
    fn from(files: FileSet) -> Self {
        Self {
            files,
            lint: Vec::new(),
        }
    }
}

/// Uniform "file set in, file set out" contract around one external tool.
pub trait Adapter: Sync {
    /// Short tool name used in error messages.
    fn name(&self) -> &'static str;

    fn apply(&self, input: FileSet) -> Result<Transformed, AdapterError>;
}

/// Identity adapter: the output set is the input set.
pub struct Passthrough;

impl Adapter for Passthrough {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn apply(&self, input: FileSet) -> Result<Transformed, AdapterError> {
        Ok(input.into())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::fileset::SourceFile;
    use std::sync::Mutex;

    /// Mock adapter that records the inputs it saw and optionally fails.
    /// Uses Mutex (not RefCell) so it is Sync like the real adapters.
    #[derive(Default)]
    pub struct MockAdapter {
        pub seen: Mutex<Vec<PathBuf>>,
        pub fail_on: Option<PathBuf>,
    }

    impl MockAdapter {
        pub fn failing_on(path: impl Into<PathBuf>) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail_on: Some(path.into()),
            }
        }

        pub fn seen(&self) -> Vec<PathBuf> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Adapter for MockAdapter {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn apply(&self, input: FileSet) -> Result<Transformed, AdapterError> {
            let mut out = FileSet::new();
            for file in input {
                self.seen.lock().unwrap().push(file.path.clone());
                if self.fail_on.as_ref() == Some(&file.path) {
                    return Err(AdapterError::Failed {
                        tool: "mock",
                        file: file.path,
                        message: "boom".into(),
                    });
                }
                out.push(SourceFile::new(file.path, file.contents));
            }
            Ok(out.into())
        }
    }

    #[test]
    fn passthrough_returns_input() {
        let input = FileSet::from(vec![SourceFile::new("a.png", vec![1, 2, 3])]);
        let out = Passthrough.apply(input.clone()).unwrap();
        assert_eq!(out.files, input);
        assert!(out.lint.is_empty());
    }

    #[test]
    fn mock_records_and_fails() {
        let mock = MockAdapter::failing_on("b.css");
        let input = FileSet::from(vec![
            SourceFile::new("a.css", "a"),
            SourceFile::new("b.css", "b"),
        ]);
        let err = mock.apply(input).unwrap_err();
        assert!(err.to_string().contains("b.css"));
        assert_eq!(mock.seen(), vec![PathBuf::from("a.css"), PathBuf::from("b.css")]);
    }
}
