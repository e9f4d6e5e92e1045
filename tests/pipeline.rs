//! End-to-end runs of the task graph over the fixture project.
//!
//! Each test copies `fixtures/project/` into a temp dir, adjusts `site.toml`
//! where needed, and drives the public library API the way the CLI does.

use sitepipe::config::load_config;
use sitepipe::layout::Layout;
use sitepipe::scaffold;
use sitepipe::tasks::{self, Pipeline, PipelineEvent, TaskId};
use sitepipe::watch::{self, Target};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::mpsc;
use tempfile::TempDir;

// ===========================================================================
// Helpers
// ===========================================================================

fn copy_dir(src: &Path, dst: &Path) {
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let to = dst.join(entry.file_name());
        if entry.path().is_dir() {
            fs::create_dir_all(&to).unwrap();
            copy_dir(&entry.path(), &to);
        } else {
            fs::copy(entry.path(), to).unwrap();
        }
    }
}

fn png(size: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(size, size, |x, y| image::Rgb([x as u8, y as u8, 90]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    copy_dir(
        &Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/project"),
        tmp.path(),
    );
    fs::create_dir_all(tmp.path().join("src/images")).unwrap();
    fs::write(tmp.path().join("src/images/photo.png"), png(40)).unwrap();
    fs::write(tmp.path().join("src/favicon.png"), png(64)).unwrap();
    tmp
}

fn append_config(root: &Path, extra: &str) {
    let path = root.join("site.toml");
    let mut config = fs::read_to_string(&path).unwrap();
    // Top-level keys must precede the [data] table.
    config = format!("{extra}\n{config}");
    fs::write(path, config).unwrap();
}

fn run(root: &Path, target: TaskId) -> Vec<PipelineEvent> {
    let (tx, rx) = mpsc::channel();
    let config = load_config(root).unwrap();
    let pipeline = Pipeline::new(Layout::new(root), config, target).with_events(tx);
    pipeline.run(&tasks::registry().unwrap(), target).unwrap();
    drop(pipeline);
    rx.iter().collect()
}

fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).unwrap()
}

// ===========================================================================
// Release
// ===========================================================================

#[test]
fn relative_release_rewrites_urls_into_public() {
    let tmp = project();
    let root = tmp.path();
    append_config(root, "is_relative = true");

    run(root, TaskId::Release);

    let index = read(root, "public/index.html");
    assert!(index.contains(r#"href="https://example.com/site/style.css""#));
    assert!(index.contains(r#"src="https://example.com/site/script.js""#));
    assert!(index.contains(r#"src="https://example.com/site/imgs/photo.png""#));
    let about = read(root, "public/about/index.html");
    assert!(about.contains(r#"href="https://example.com/site/about/index.html""#));
    assert!(root.join("public/style.css").exists());
    assert!(root.join("public/script.js").exists());
    assert!(root.join("public/imgs/photo.png").exists());
    assert!(root.join("public/favicon-32x32.png").exists());
}

#[test]
fn absolute_release_keeps_urls_and_uses_optimized_images() {
    let tmp = project();
    let root = tmp.path();

    let events = run(root, TaskId::Release);

    let index = read(root, "public/index.html");
    assert!(index.contains(r#"href="/style.css""#));
    assert!(root.join("public/imgs/photo.png").exists());
    assert!(root.join("public/imgs/.optimize-cache.json").exists());
    assert!(
        events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Optimized(stats) if stats.misses == 1))
    );
}

#[test]
fn pre_release_copies_preview_verbatim() {
    let tmp = project();
    let root = tmp.path();

    run(root, TaskId::PreRelease);

    assert_eq!(read(root, "public/index.html"), read(root, "dist/index.html"));
    assert_eq!(
        fs::read(root.join("public/imgs/photo.png")).unwrap(),
        fs::read(root.join("dist/imgs/photo.png")).unwrap()
    );
    assert!(!root.join("public/favicon.ico").exists());
}

#[test]
fn relative_release_without_url_is_rejected_at_load() {
    let tmp = project();
    let root = tmp.path();
    fs::write(root.join("site.toml"), "is_relative = true\n").unwrap();

    assert!(load_config(root).is_err());
}

// ===========================================================================
// Scaffold
// ===========================================================================

#[test]
fn scaffold_creates_missing_pages_once() {
    let tmp = project();
    let layout = Layout::new(tmp.path());

    let first = scaffold::scaffold(&layout).unwrap();
    assert_eq!(first.created.len(), 2);
    assert_eq!(first.skipped.len(), 1);
    let contact = read(tmp.path(), "src/templates/pages/contact/index.html");
    assert!(contact.contains("<h1>Contact Us</h1>"));

    let second = scaffold::scaffold(&layout).unwrap();
    assert!(second.created.is_empty());
    assert_eq!(second.skipped.len(), 3);
}

#[test]
fn scaffolded_pages_build() {
    let tmp = project();
    let root = tmp.path();

    run(root, TaskId::ScaffoldPages);
    run(root, TaskId::Build);

    let post = read(root, "dist/blog/first-post/index.html");
    assert!(post.contains("<h1>First Post</h1>"));
    assert!(post.contains("<title>Fixture Site</title>"));
}

// ===========================================================================
// Watch routing
// ===========================================================================

#[test]
fn watch_bindings_route_source_changes_to_their_task() {
    let tmp = project();
    let layout = Layout::new(tmp.path());
    let bindings = watch::bindings(&layout);

    let targets: Vec<Target> = watch::route(
        &bindings,
        &[
            layout.styles().join("components/_button.scss"),
            layout.pages().join("about/index.html"),
            layout.dist().join("style.css"),
            layout.scripts().join("notes.txt"),
            layout.styles().join("style.scss"),
        ],
    )
    .into_iter()
    .map(|trigger| trigger.target)
    .collect();

    assert_eq!(
        targets,
        vec![
            Target::Task(TaskId::StyleCompile),
            Target::Task(TaskId::TemplateCompile),
            Target::Reload,
            Target::Task(TaskId::StyleCompile),
        ]
    );
}
