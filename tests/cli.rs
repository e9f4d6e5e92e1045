//! Tests of the `sitepipe` binary itself: argument handling and exit codes.

use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn sitepipe() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sitepipe"))
}

#[test]
fn gen_config_prints_a_loadable_site_toml() {
    let output = sitepipe().arg("--gen-config").output().unwrap();
    assert!(output.status.success());

    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("is_relative = false"));

    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("site.toml"), &text).unwrap();
    assert!(sitepipe::config::load_config(tmp.path()).is_ok());
}

#[test]
fn invalid_config_exits_with_failure() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("site.toml"), "is_relative = true\n").unwrap();

    let output = sitepipe()
        .args(["build", "--root"])
        .arg(tmp.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error:"), "stderr: {stderr}");
}

#[test]
fn failing_task_exits_with_failure_and_names_it() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("src/templates/pages")).unwrap();

    // No src/styles/style.scss: style-compile cannot read its entry.
    let output = sitepipe()
        .args(["style-compile", "--root"])
        .arg(tmp.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("task 'style-compile' failed"), "stderr: {stderr}");
}

#[test]
fn unknown_task_is_a_usage_error() {
    let output = sitepipe().arg("deploy").output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn scaffold_pages_runs_standalone() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("src/templates/lib")).unwrap();
    fs::write(root.join("src/templates/lib/_template.html"), "<h1><%= title %></h1>\n").unwrap();
    fs::write(root.join("pages.csv"), "path,title\n/faq,FAQ\n").unwrap();

    let output = sitepipe()
        .args(["scaffold-pages", "--root"])
        .arg(root)
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(root.join("src/templates/pages/faq/index.html")).unwrap(),
        "<h1>FAQ</h1>\n"
    );
    assert!(!root.join("dist").exists());
}
