//! # File Keystore Tests

use super::*;
use crate::domain::identity::NodeIdentity;
use crate::domain::keystore::ExtensionMapping;

fn store(base: &Path) -> FileKeyStore {
    let identity = NodeIdentity::new("/talker").unwrap();
    FileKeyStore::new(KeystoreLayout::new(base, &identity, ExtensionMapping::default()))
}

#[test]
fn test_empty_store_is_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    assert!(!store.is_complete());
    assert_eq!(store.missing_files().len(), 7);
}

#[test]
fn test_write_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());

    let first = store.write(StoreScope::Node, "talker.client.cert", b"first").unwrap();
    let second = store.write(StoreScope::Node, "talker.client.cert", b"second").unwrap();

    assert_eq!(first, WriteOutcome::Created);
    assert_eq!(second, WriteOutcome::AlreadyPresent);
    assert_eq!(
        store.read(StoreScope::Node, "talker.client.cert").unwrap(),
        b"first"
    );
}

#[test]
fn test_write_rejects_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let err = store
        .write(StoreScope::Node, "../../root.cert", b"x")
        .unwrap_err();
    assert!(matches!(err, SecurityError::InvalidName { .. }));
    assert!(!dir.path().join("root.cert").exists());
}

#[test]
fn test_read_missing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    assert!(matches!(
        store.read(StoreScope::Shared, "root.cert"),
        Err(SecurityError::NotFound { .. })
    ));
}

#[test]
fn test_scope_routing() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    assert_eq!(store.scope_for("root.cert"), StoreScope::Shared);
    assert_eq!(store.scope_for("master.client.cert"), StoreScope::Shared);
    assert_eq!(store.scope_for("talker.server.key"), StoreScope::Node);
}

#[test]
fn test_directory_counts_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    for path in store.required_files() {
        fs::create_dir_all(&path).unwrap();
    }
    assert!(!store.is_complete());
}

#[cfg(unix)]
#[test]
fn test_owner_only_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    store.write(StoreScope::Node, "talker.server.key", b"key").unwrap();

    let node_dir = store.layout().node_dir();
    let file = node_dir.join("talker.server.key");
    assert_eq!(fs::metadata(&node_dir).unwrap().permissions().mode() & 0o777, 0o700);
    assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o600);
}

#[test]
fn test_completeness_over_every_subset() {
    let probe_dir = tempfile::tempdir().unwrap();
    let count = store(probe_dir.path()).required_files().len();

    for mask in 0u32..(1 << count) {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for (i, path) in store.required_files().iter().enumerate() {
            if mask & (1 << i) != 0 {
                create_private_dir(path.parent().unwrap()).unwrap();
                fs::write(path, b"pem").unwrap();
            }
        }
        assert_eq!(store.is_complete(), mask == (1 << count) - 1, "subset {mask:#b}");
    }
}

#[test]
fn test_failed_write_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let node_dir = store.ensure_dir(StoreScope::Node).unwrap();
    let path = node_dir.join("talker.client.cert");

    let err = write_exclusive(&path, |file| {
        file.write_all(b"-----BEGIN CERT")?;
        Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
    })
    .unwrap_err();
    assert!(matches!(err, SecurityError::Io { .. }));
    assert!(!path.exists());
    assert_eq!(fs::read_dir(&node_dir).unwrap().count(), 0);

    // A retry starts from scratch instead of keeping a truncated file
    let retried = store.write(StoreScope::Node, "talker.client.cert", b"full").unwrap();
    assert_eq!(retried, WriteOutcome::Created);
    assert_eq!(store.read(StoreScope::Node, "talker.client.cert").unwrap(), b"full");
}

#[test]
fn test_successful_write_leaves_no_staging_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    store.write(StoreScope::Node, "talker.client.cert", b"pem").unwrap();
    store.write(StoreScope::Node, "talker.client.cert", b"again").unwrap();

    let node_dir = store.layout().scope_dir(StoreScope::Node);
    let names: Vec<_> = fs::read_dir(&node_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("talker.client.cert")]);
}
