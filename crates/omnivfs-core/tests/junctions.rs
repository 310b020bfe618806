//! Virtual file systems assembled from junctions.

use std::sync::Arc;

use omnivfs_core::{
    CachePolicy, CacheStrategy, ChangeKind, ChannelListener, FileListener, FileSystemManager,
    FileType,
};

fn manager(strategy: CacheStrategy) -> FileSystemManager {
    FileSystemManager::standard(CachePolicy::Unbounded.build(0), strategy)
}

async fn seeded_target(manager: &FileSystemManager) -> Arc<omnivfs_core::FileObject> {
    let file = manager.resolve_file("ram:///data/f.txt").await.unwrap();
    file.content().await.unwrap().write_all(b"hi").await.unwrap();
    manager.resolve_file("ram:///data").await.unwrap()
}

#[tokio::test]
async fn test_ancestors_exist_only_while_a_junction_is_below() {
    let manager = manager(CacheStrategy::Manual);
    let target = seeded_target(&manager).await;

    let ancestor = manager.resolve_file("vfs:/a/b").await.unwrap();
    assert!(!ancestor.exists().await.unwrap());

    manager.add_junction("/a/b/c", target).unwrap();
    assert!(ancestor.exists().await.unwrap());
    assert!(ancestor.is_folder().await.unwrap());
    let root = manager.resolve_file("vfs:/").await.unwrap();
    assert_eq!(root.child_names().await.unwrap(), vec!["a"]);

    assert!(manager.remove_junction("/a/b/c").unwrap());
    assert!(!ancestor.exists().await.unwrap());
    assert!(!manager.remove_junction("/a/b/c").unwrap());
}

#[tokio::test]
async fn test_single_level_mount_and_its_root() {
    let manager = manager(CacheStrategy::OnResolve);
    let target = seeded_target(&manager).await;

    for uri in ["vfs:/a", "vfs:/"] {
        assert!(!manager.resolve_file(uri).await.unwrap().exists().await.unwrap(), "{uri}");
    }
    manager.add_junction("/a", target.clone()).unwrap();
    let err = manager.add_junction("/a/b", target).unwrap_err();
    assert_eq!(err.message_key(), "nested-junction");
    for uri in ["vfs:/a", "vfs:/"] {
        assert!(manager.resolve_file(uri).await.unwrap().exists().await.unwrap(), "{uri}");
    }
}

#[tokio::test]
async fn test_nested_junctions_rejected() {
    let manager = manager(CacheStrategy::OnResolve);
    let target = seeded_target(&manager).await;
    manager.add_junction("/a/b/c", target.clone()).unwrap();

    for point in ["/a/b", "/a/b/c/d", "/a/b/c", "/a/b/c/"] {
        let err = manager.add_junction(point, target.clone()).unwrap_err();
        assert_eq!(err.message_key(), "nested-junction", "{point}");
    }
    manager.add_junction("/a/x", target).unwrap();
    assert_eq!(manager.virtual_file_system().junctions().unwrap().len(), 2);
}

#[tokio::test]
async fn test_operations_delegate_into_the_mounted_tree() {
    let manager = manager(CacheStrategy::OnResolve);
    let target = seeded_target(&manager).await;
    manager.add_junction("/mnt", target).unwrap();

    let file = manager.resolve_file("vfs:/mnt/f.txt").await.unwrap();
    assert_eq!(file.name().uri(), "vfs:/mnt/f.txt");
    assert!(file.file_system().is_virtual());
    assert_eq!(file.content().await.unwrap().read_to_end().await.unwrap(), b"hi");

    let created = manager.resolve_file("vfs:/mnt/sub/new.txt").await.unwrap();
    created.content().await.unwrap().write_all(b"new").await.unwrap();
    let backing = manager.resolve_file("ram:///data/sub/new.txt").await.unwrap();
    assert_eq!(backing.get_type().await.unwrap(), FileType::File);
    assert_eq!(backing.content().await.unwrap().read_to_end().await.unwrap(), b"new");

    let mount = manager.resolve_file("vfs:/mnt").await.unwrap();
    assert_eq!(mount.child_names().await.unwrap(), vec!["f.txt", "sub"]);
    assert!(!mount.delete().await.is_ok_and(|deleted| deleted));
}

#[tokio::test]
async fn test_changes_are_seen_from_both_sides_of_a_junction() {
    let manager = manager(CacheStrategy::Manual);
    let target = seeded_target(&manager).await;
    manager.add_junction("/m", target).unwrap();
    let vfs = manager.virtual_file_system();
    let ram = manager.resolve_file("ram:///").await.unwrap().file_system().clone();

    // Target side first: a held virtual handle must notice.
    let virtual_f = manager.resolve_file("vfs:/m/f").await.unwrap();
    assert!(!virtual_f.exists().await.unwrap());
    let (listener, mut virtual_rx) = ChannelListener::new();
    vfs.add_listener(virtual_f.name(), Arc::new(listener));

    let target_f = manager.resolve_file("ram:///data/f").await.unwrap();
    target_f.content().await.unwrap().write_all(b"1").await.unwrap();
    assert!(virtual_f.exists().await.unwrap());
    let event = virtual_rx.try_recv().unwrap();
    assert_eq!(event.kind, ChangeKind::Created);
    assert_eq!(event.name, *virtual_f.name());

    target_f.delete().await.unwrap();
    assert!(!virtual_f.exists().await.unwrap());
    assert_eq!(virtual_rx.try_recv().unwrap().kind, ChangeKind::Deleted);
    assert!(virtual_rx.try_recv().is_err());

    // Virtual side: the target handle and its listeners must notice.
    let target_g = manager.resolve_file("ram:///data/g").await.unwrap();
    assert!(!target_g.exists().await.unwrap());
    let (listener, mut target_rx) = ChannelListener::new();
    let listener: Arc<dyn FileListener> = Arc::new(listener);
    ram.add_listener(target_g.name(), listener);

    let virtual_g = manager.resolve_file("vfs:/m/g").await.unwrap();
    let (listener, mut virtual_rx) = ChannelListener::new();
    vfs.add_listener(virtual_g.name(), Arc::new(listener));
    let content = virtual_g.content().await.unwrap();
    content.write_all(b"2").await.unwrap();
    content.append(b"3").await.unwrap();
    drop(content);
    assert!(target_g.exists().await.unwrap());

    let target_kinds: Vec<_> = std::iter::from_fn(|| target_rx.try_recv().ok())
        .map(|e| e.kind)
        .collect();
    assert_eq!(target_kinds, vec![ChangeKind::Created, ChangeKind::Changed]);
    let virtual_kinds: Vec<_> = std::iter::from_fn(|| virtual_rx.try_recv().ok())
        .map(|e| e.kind)
        .collect();
    assert_eq!(virtual_kinds, vec![ChangeKind::Created, ChangeKind::Changed]);

    let data = manager.resolve_file("ram:///data").await.unwrap();
    assert_eq!(data.child_names().await.unwrap(), vec!["f.txt", "g"]);

    virtual_g.delete().await.unwrap();
    assert!(!target_g.exists().await.unwrap());
    assert_eq!(target_rx.try_recv().unwrap().kind, ChangeKind::Deleted);
    assert_eq!(virtual_rx.try_recv().unwrap().kind, ChangeKind::Deleted);
}

#[tokio::test]
async fn test_writes_outside_junctions_are_refused() {
    let manager = manager(CacheStrategy::OnResolve);
    let target = seeded_target(&manager).await;
    manager.add_junction("/mnt", target).unwrap();

    let stray = manager.resolve_file("vfs:/elsewhere.txt").await.unwrap();
    assert!(!stray.exists().await.unwrap());
    let err = stray.content().await.unwrap().write_all(b"x").await.unwrap_err();
    assert_eq!(err.message_key(), "write-content");
}

#[tokio::test]
async fn test_layered_virtual_file_system() {
    let manager = manager(CacheStrategy::OnResolve);
    let target = seeded_target(&manager).await;

    let root = manager.create_virtual_file_system(target.clone()).unwrap();
    assert!(root.name().is_root());
    assert_eq!(root.child_names().await.unwrap(), vec!["f.txt"]);

    let parent = root.parent().unwrap().unwrap();
    assert_eq!(parent.name().uri(), "ram:///");
    assert!(Arc::ptr_eq(
        root.file_system().parent_layer().unwrap(),
        &target
    ));
}
