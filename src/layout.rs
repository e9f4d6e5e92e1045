//! Fixed project layout.
//!
//! Every path the pipeline reads or writes is derived from the project root.
//! The layout is a contract; it is not configurable beyond choosing the root.
//!
//! ```text
//! <root>/
//! ├── site.toml
//! ├── pages.csv
//! ├── src/
//! │   ├── templates/
//! │   │   ├── pages/           # compiled pages (_partials excluded)
//! │   │   └── lib/_template.html
//! │   ├── styles/style.scss
//! │   ├── scripts/entry.js
//! │   ├── images/
//! │   └── favicon.png
//! ├── dist/                    # preview output
//! │   └── imgs/                # raw images
//! └── public/                  # publish output
//!     └── imgs/                # optimized images
//! ```

use std::path::{Path, PathBuf};

/// Subdirectory of both output directories that holds images.
pub const IMAGES_SUBDIR: &str = "imgs";
/// File name given to every scaffolded page.
pub const PAGE_FILENAME: &str = "index.html";
/// Output name of the compiled stylesheet.
pub const STYLE_OUTPUT: &str = "style.css";
/// Output name of the bundled script.
pub const SCRIPT_OUTPUT: &str = "script.js";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn src(&self) -> PathBuf {
        self.root.join("src")
    }

    /// Base directory for template lookups (`extends`, `include`).
    pub fn templates(&self) -> PathBuf {
        self.src().join("templates")
    }

    pub fn pages(&self) -> PathBuf {
        self.templates().join("pages")
    }

    pub fn blank_page_template(&self) -> PathBuf {
        self.templates().join("lib").join("_template.html")
    }

    pub fn styles(&self) -> PathBuf {
        self.src().join("styles")
    }

    pub fn style_entry(&self) -> PathBuf {
        self.styles().join("style.scss")
    }

    pub fn scripts(&self) -> PathBuf {
        self.src().join("scripts")
    }

    pub fn script_entry(&self) -> PathBuf {
        self.scripts().join("entry.js")
    }

    pub fn images(&self) -> PathBuf {
        self.src().join("images")
    }

    pub fn page_list(&self) -> PathBuf {
        self.root.join("pages.csv")
    }

    /// Preview output directory.
    pub fn dist(&self) -> PathBuf {
        self.root.join("dist")
    }

    pub fn dist_images(&self) -> PathBuf {
        self.dist().join(IMAGES_SUBDIR)
    }

    /// Publish output directory.
    pub fn public(&self) -> PathBuf {
        self.root.join("public")
    }

    pub fn public_images(&self) -> PathBuf {
        self.public().join(IMAGES_SUBDIR)
    }
}

/// True for page templates that should be compiled: `.html` files whose
/// name does not start with `_`.
pub fn is_page_template(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('_') && has_extension(path, "html")
}

/// Case-insensitive extension check.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// True for files named `favicon` or `favicon.*` directly under `src/`.
pub fn is_favicon_source(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.starts_with("favicon"))
}

/// Relative path with `/` separators, as template names, URLs and cache
/// keys use them.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
