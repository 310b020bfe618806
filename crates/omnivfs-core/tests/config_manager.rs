//! Managers built from TOML config, mounting local and in-memory trees.

use std::sync::Arc;

use omnivfs_core::{
    AllFileSelector, CachePolicy, CacheStrategy, FileSystemManager, FileType, LocalProvider,
    VfsConfig,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_mounts_from_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "on disk").unwrap();

    let toml = format!(
        r#"
        [cache]
        policy = "lru"
        capacity = 10
        strategy = "on-call"

        [[mount]]
        point = "/disk"
        target = "file://{}"

        [[mount]]
        point = "/scratch"
        target = "ram:///"
        "#,
        dir.path().display()
    );
    let config = VfsConfig::from_toml_str(&toml).unwrap();
    let manager = FileSystemManager::from_config(&config).await.unwrap();
    assert_eq!(manager.files_cache().policy(), CachePolicy::Lru);
    assert_eq!(manager.strategy(), CacheStrategy::OnCall);

    let notes = manager.resolve_file("vfs:/disk/notes.txt").await.unwrap();
    assert_eq!(notes.content().await.unwrap().read_to_end().await.unwrap(), b"on disk");

    let scratch = manager.resolve_file("vfs:/scratch/tmp.txt").await.unwrap();
    scratch.content().await.unwrap().write_all(b"in memory").await.unwrap();
    let backing = manager.resolve_file("ram:///tmp.txt").await.unwrap();
    assert_eq!(backing.content().await.unwrap().read_to_end().await.unwrap(), b"in memory");

    let root = manager.resolve_file("vfs:/").await.unwrap();
    assert_eq!(root.child_names().await.unwrap(), vec!["disk", "scratch"]);
}

#[tokio::test]
async fn test_bad_mount_target_fails_build() {
    let config = VfsConfig::from_toml_str(
        r#"
        [[mount]]
        point = "/x"
        target = "nosuch:///"
        "#,
    )
    .unwrap();
    let err = FileSystemManager::from_config(&config).await.err().unwrap();
    assert_eq!(err.message_key(), "unknown-scheme");
}

#[tokio::test]
async fn test_sandboxed_local_provider() {
    let dir = TempDir::new().unwrap();
    let manager = FileSystemManager::standard(CachePolicy::Weak.build(0), CacheStrategy::OnResolve);
    manager
        .add_provider(&["sandbox"], Arc::new(LocalProvider::rooted(dir.path())))
        .unwrap();

    let file = manager.resolve_file("sandbox:///a/b/c.txt").await.unwrap();
    file.content().await.unwrap().write_all(b"local").await.unwrap();
    assert_eq!(std::fs::read(dir.path().join("a/b/c.txt")).unwrap(), b"local");

    let folder = manager.resolve_file("sandbox:///a").await.unwrap();
    assert_eq!(folder.get_type().await.unwrap(), FileType::Folder);
    assert_eq!(folder.delete_all(&AllFileSelector).await.unwrap(), 3);
    assert!(!dir.path().join("a").exists());
}

#[tokio::test]
async fn test_move_between_providers() {
    let dir = TempDir::new().unwrap();
    let manager = FileSystemManager::standard(CachePolicy::Unbounded.build(0), CacheStrategy::OnResolve);
    manager
        .add_provider(&["sandbox"], Arc::new(LocalProvider::rooted(dir.path())))
        .unwrap();

    let src = manager.resolve_file("ram:///docs/report.txt").await.unwrap();
    src.content().await.unwrap().write_all(b"quarterly").await.unwrap();
    let dest = manager.resolve_file("sandbox:///archive/report.txt").await.unwrap();

    src.move_to(&dest).await.unwrap();
    assert!(!src.exists().await.unwrap());
    assert_eq!(std::fs::read(dir.path().join("archive/report.txt")).unwrap(), b"quarterly");
}
