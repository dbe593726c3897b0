//! Sandboxed file access through the application context

use lansync::discovery::{MemoryBrowser, MemoryPublisher};
use lansync::files::FileError;
use lansync::{AppContext, Config};
use std::sync::Arc;
use tempfile::TempDir;

fn context_with_root(root: &std::path::Path) -> AppContext {
    let toml_str = format!(
        r#"
        [files]
        root = "{}"
        "#,
        root.display()
    );
    let config = Config::from_toml(&toml_str).unwrap();
    AppContext::new(
        config,
        Arc::new(MemoryBrowser::new()),
        Arc::new(MemoryPublisher::new()),
    )
}

#[test]
fn test_file_accessor_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("files");
    let ctx = context_with_root(&root);

    let files = ctx.file_accessor().unwrap();
    assert!(root.is_dir());

    std::fs::write(root.join("hello.txt"), "hi there").unwrap();
    assert_eq!(files.read("/hello.txt").unwrap(), "hi there");

    let entries = files.list("/").unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].ends_with("/hello.txt"));
}

#[test]
fn test_escape_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("outside.txt"), "secret").unwrap();
    let ctx = context_with_root(&temp_dir.path().join("files"));

    let files = ctx.file_accessor().unwrap();
    let err = files.read("../outside.txt").unwrap_err();
    assert!(matches!(err, FileError::Security(_)));

    let err: lansync::Error = err.into();
    assert!(err.to_string().contains("outside.txt"));
}

#[cfg(unix)]
#[test]
fn test_symlink_out_of_root_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let outside = temp_dir.path().join("outside");
    std::fs::create_dir_all(&outside).unwrap();
    std::fs::write(outside.join("secret.txt"), "secret").unwrap();

    let root = temp_dir.path().join("files");
    let ctx = context_with_root(&root);
    let files = ctx.file_accessor().unwrap();
    std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

    assert!(matches!(
        files.read("link/secret.txt"),
        Err(FileError::Security(_))
    ));
}
