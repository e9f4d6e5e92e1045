//! Style compiler adapter (grass).
//!
//! Compiles the SCSS entry into a single stylesheet. Before compilation,
//! glob imports such as `@import "components/*";` are expanded into one
//! `@import` per matching `.scss` file (sorted), matched relative to the styles
//! directory. Each match is imported by its absolute path in canonical Sass
//! form, without the partial `_` prefix or the extension:
//!
//! ```text
//! @import "components/*";
//!   →  @import "/site/src/styles/components/button";
//!      @import "/site/src/styles/components/card";
//! ```
//!
//! Plain imports are left to the compiler.
//!
//! `pretty` selects expanded output, otherwise compressed.

use super::{Adapter, AdapterError, Transformed};
use crate::fileset::{FileSet, SourceFile};
use crate::layout::has_extension;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static GLOB_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+["']([^"']*\*[^"']*)["']\s*;"#).expect("static regex")
});

pub struct StyleCompiler {
    load_dir: PathBuf,
    pretty: bool,
}

impl StyleCompiler {
    pub fn new(load_dir: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            load_dir: load_dir.into(),
            pretty,
        }
    }

    fn options(&self) -> grass::Options<'_> {
        let style = if self.pretty {
            grass::OutputStyle::Expanded
        } else {
            grass::OutputStyle::Compressed
        };
        grass::Options::default()
            .style(style)
            .load_path(&self.load_dir)
    }
}

impl Adapter for StyleCompiler {
    fn name(&self) -> &'static str {
        "grass"
    }

    fn apply(&self, input: FileSet) -> Result<Transformed, AdapterError> {
        let options = self.options();
        let mut out = FileSet::new();
        for file in input {
            let fail = |message: String| AdapterError::Failed {
                tool: "grass",
                file: file.path.clone(),
                message,
            };
            let source = file
                .text()
                .ok_or_else(|| fail("stylesheet is not valid UTF-8".into()))?;
            let expanded = expand_glob_imports(source, &self.load_dir).map_err(fail)?;
            let css = grass::from_string(expanded, &options).map_err(|e| fail(e.to_string()))?;
            out.push(SourceFile::new(file.path.with_extension("css"), css));
        }
        Ok(out.into())
    }
}

/// Replace every glob `@import` with one import per matching file.
///
/// A glob matching nothing expands to nothing, like an empty directory.
pub fn expand_glob_imports(source: &str, base: &Path) -> Result<String, String> {
    let mut error = None;
    let expanded = GLOB_IMPORT.replace_all(source, |caps: &Captures| {
        match resolve_glob(base, &caps[1]) {
            Ok(imports) => imports
                .iter()
                .map(|p| format!("@import \"{p}\";"))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                error.get_or_insert(e);
                String::new()
            }
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

fn resolve_glob(base: &Path, pattern: &str) -> Result<Vec<String>, String> {
    let full = base.join(pattern);
    let full = full.to_string_lossy();
    let paths = glob::glob(&full).map_err(|e| format!("bad import glob {pattern:?}: {e}"))?;
    let mut imports = Vec::new();
    for path in paths {
        let path = path.map_err(|e| e.to_string())?;
        if path.is_file() && has_extension(&path, "scss") {
            imports.push(canonical_import(&path));
        }
    }
    imports.sort();
    Ok(imports)
}

/// `/a/components/_button.scss` → `/a/components/button`.
fn canonical_import(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let name = stem.strip_prefix('_').unwrap_or(&stem);
    let canonical = match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    };
    canonical.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn styles_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("components")).unwrap();
        fs::write(
            tmp.path().join("components/_button.scss"),
            ".button { color: red; }\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("components/_card.scss"),
            ".card { margin: 0; }\n",
        )
        .unwrap();
        tmp
    }

    #[test]
    fn glob_imports_expand_sorted() {
        let tmp = styles_dir();
        let out = expand_glob_imports("@import \"components/*.scss\";\nbody{}", tmp.path()).unwrap();
        let base = tmp.path().join("components");
        assert_eq!(
            out,
            format!(
                "@import \"{}\";\n@import \"{}\";\nbody{{}}",
                canonical_import(&base.join("_button.scss")),
                canonical_import(&base.join("_card.scss")),
            )
        );
    }

    #[test]
    fn plain_imports_untouched() {
        let tmp = styles_dir();
        let src = "@import \"variables\";";
        assert_eq!(expand_glob_imports(src, tmp.path()).unwrap(), src);
    }

    #[test]
    fn compiles_entry_with_glob_imports() {
        let tmp = styles_dir();
        let compiler = StyleCompiler::new(tmp.path(), false);
        let input = FileSet::from(vec![SourceFile::new(
            "style.scss",
            "@import \"components/*\";\n$gap: 2px;\nmain { padding: $gap; }\n",
        )]);

        let out = compiler.apply(input).unwrap();
        let css = out.files.get("style.css").unwrap().text().unwrap();
        assert!(css.contains(".button{color:red}"));
        assert!(css.contains(".card{margin:0}"));
        assert!(css.contains("main{padding:2px}"));
    }

    #[test]
    fn canonical_import_drops_partial_prefix_and_extension() {
        assert_eq!(
            canonical_import(Path::new("/site/styles/components/_button.scss")),
            "/site/styles/components/button"
        );
        assert_eq!(canonical_import(Path::new("/s/reset.scss")), "/s/reset");
    }

    #[test]
    fn glob_skips_non_stylesheets() {
        let tmp = styles_dir();
        fs::write(tmp.path().join("components/README.md"), "notes").unwrap();
        let out = expand_glob_imports("@import \"components/*\";", tmp.path()).unwrap();
        assert!(!out.contains("README"));
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn nested_glob_import_shares_variables() {
        let tmp = styles_dir();
        fs::write(
            tmp.path().join("components/_accent.scss"),
            ".accent { color: $accent; }\n",
        )
        .unwrap();
        let compiler = StyleCompiler::new(tmp.path(), false);
        let input = FileSet::from(vec![SourceFile::new(
            "style.scss",
            "$accent: #c33;\n@import \"components/*\";\n",
        )]);

        let out = compiler.apply(input).unwrap();
        let css = out.files.get("style.css").unwrap().text().unwrap();
        assert!(css.contains(".accent{color:#c33}"));
    }

    #[test]
    fn pretty_output_is_expanded() {
        let tmp = styles_dir();
        let compiler = StyleCompiler::new(tmp.path(), true);
        let input = FileSet::from(vec![SourceFile::new("style.scss", "@import \"components/*\";")]);

        let out = compiler.apply(input).unwrap();
        let css = out.files.get("style.css").unwrap().text().unwrap();
        assert!(css.contains(".button {\n  color: red;\n}"));
    }

    #[test]
    fn syntax_error_fails_with_file_name() {
        let tmp = styles_dir();
        let compiler = StyleCompiler::new(tmp.path(), true);
        let input = FileSet::from(vec![SourceFile::new("style.scss", "main { color: ; ")]);
        let err = compiler.apply(input).unwrap_err();
        assert!(err.to_string().contains("style.scss"));
    }
}
