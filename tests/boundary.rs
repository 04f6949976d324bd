use cryptofs::{Access, ErrorKind, FsOptions, Identity, MasterKey};

async fn mount() -> (cryptofs::Filesystem, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let options = FsOptions::new(dir.path(), MasterKey::new([1u8; 32]));
    let fs = cryptofs::Filesystem::mount(options).await.unwrap();
    (fs, dir)
}

#[tokio::test]
async fn race_on_create_exactly_one_winner() {
    let (fs, _dir) = mount().await;
    let a = fs.clone();
    let b = fs.clone();

    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { a.mkdir("/a", 0o755).await }),
        tokio::spawn(async move { b.mkdir("/a", 0o755).await }),
    );
    let (r1, r2) = (r1.unwrap(), r2.unwrap());

    let successes = [r1.is_ok(), r2.is_ok()].iter().filter(|x| **x).count();
    assert_eq!(successes, 1, "exactly one racer should create /a");
    let failure = if r1.is_ok() { r2 } else { r1 };
    assert_eq!(failure.unwrap_err().kind, ErrorKind::Exists);

    let stat = fs.stat("/a").await.unwrap();
    assert!(stat.is_dir());

    let entries = fs.readdir("/").await.unwrap();
    let mut names: Vec<_> = entries.into_iter().filter(|n| n != "." && n != "..").collect();
    names.sort();
    assert_eq!(names, vec!["a".to_string()]);
}

#[tokio::test]
async fn symlink_loop_is_detected() {
    let (fs, _dir) = mount().await;
    fs.symlink("b", "/a").await.unwrap();
    fs.symlink("a", "/b").await.unwrap();

    let err = fs.read_file("/a").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SymlinkLoop);
}

#[tokio::test]
async fn rename_replaces_destination_file() {
    let (fs, _dir) = mount().await;
    fs.write_file("/x", b"X").await.unwrap();
    fs.write_file("/y", b"Y").await.unwrap();

    fs.rename("/x", "/y").await.unwrap();

    assert!(!fs.exists("/x").await);
    assert_eq!(fs.read_file("/y").await.unwrap(), b"X");
}

#[tokio::test]
async fn truncate_then_read_past_old_size() {
    let (fs, _dir) = mount().await;
    fs.write_file("/f", b"ABCDEFGH").await.unwrap();

    let fd = fs.open("/f", "r+").await.unwrap();
    fs.ftruncate(fd, 3).await.unwrap();
    fs.close(fd).await.unwrap();
    assert_eq!(fs.read_file("/f").await.unwrap(), b"ABC");

    let fd = fs.open("/f", "r+").await.unwrap();
    fs.ftruncate(fd, 6).await.unwrap();
    fs.close(fd).await.unwrap();
    assert_eq!(fs.read_file("/f").await.unwrap(), b"ABC\0\0\0");
}

#[tokio::test]
async fn permission_denied_for_non_owner() {
    let (fs, _dir) = mount().await;
    fs.write_file("/secret", b"top secret").await.unwrap();
    fs.chmod("/secret", 0o600).await.unwrap();

    let other = fs.as_identity(Identity::new(1000, 1000));
    let err = other.open("/secret", "r").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AccessDenied);

    assert!(other.access("/secret", Access::READ).await.is_err());
}

#[tokio::test]
async fn block_boundary_write_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let options = FsOptions::new(dir.path(), MasterKey::new([2u8; 32])).block_size(16);
    let fs = cryptofs::Filesystem::mount(options).await.unwrap();

    let payload = b"0123456789ABCDEF0123";
    fs.write_file("/blocks", payload).await.unwrap();
    assert_eq!(fs.read_file("/blocks").await.unwrap(), payload.to_vec());

    let stat = fs.stat("/blocks").await.unwrap();
    assert_eq!(stat.size, payload.len() as u64);
}

#[tokio::test]
async fn mkdir_without_recursive_rejects_duplicate() {
    let (fs, _dir) = mount().await;
    fs.mkdir("/p", 0o755).await.unwrap();
    let err = fs.mkdir("/p", 0o755).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Exists);
}

#[tokio::test]
async fn mkdir_all_creates_missing_ancestors_and_is_idempotent() {
    let (fs, _dir) = mount().await;
    fs.mkdir_all("/a/b/c", 0o755).await.unwrap();
    assert!(fs.stat("/a").await.unwrap().is_dir());
    assert!(fs.stat("/a/b").await.unwrap().is_dir());
    assert!(fs.stat("/a/b/c").await.unwrap().is_dir());

    // Recreating the same tree, including an already-existing prefix, must
    // succeed rather than failing with EEXIST.
    fs.mkdir_all("/a/b/c", 0o755).await.unwrap();

    fs.write_file("/a/not-a-dir", b"x").await.unwrap();
    let err = fs.mkdir_all("/a/not-a-dir/child", 0o755).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotDirectory);
}

#[tokio::test]
async fn rmdir_all_removes_nested_contents() {
    let (fs, _dir) = mount().await;
    fs.mkdir_all("/a/b", 0o755).await.unwrap();
    fs.write_file("/a/top", b"x").await.unwrap();
    fs.write_file("/a/b/leaf", b"y").await.unwrap();

    fs.rmdir_all("/a").await.unwrap();
    assert!(!fs.exists("/a").await);
}

#[tokio::test]
async fn chdir_dot_is_a_no_op() {
    let (fs, _dir) = mount().await;
    fs.mkdir("/dir", 0o755).await.unwrap();
    fs.chdir("/dir").await.unwrap();
    let before = fs.realpath(".").await.unwrap();
    fs.chdir(".").await.unwrap();
    let after = fs.realpath(".").await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn readdir_includes_dot_and_dotdot() {
    let (fs, _dir) = mount().await;
    fs.mkdir("/dir", 0o755).await.unwrap();
    fs.write_file("/dir/file", b"hi").await.unwrap();

    let mut names = fs.readdir("/dir").await.unwrap();
    names.sort();
    assert_eq!(names, vec![".".to_string(), "..".to_string(), "file".to_string()]);
}

#[tokio::test]
async fn rmdir_fails_when_not_empty() {
    let (fs, _dir) = mount().await;
    fs.mkdir("/dir", 0o755).await.unwrap();
    fs.write_file("/dir/file", b"hi").await.unwrap();

    let err = fs.rmdir("/dir").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotEmpty);
}

#[tokio::test]
async fn unlink_removes_file_and_frees_space() {
    let (fs, _dir) = mount().await;
    fs.write_file("/f", b"data").await.unwrap();
    fs.unlink("/f").await.unwrap();
    assert!(!fs.exists("/f").await);
}

#[tokio::test]
async fn rename_into_own_descendant_is_rejected() {
    let (fs, _dir) = mount().await;
    fs.mkdir_all("/a/b", 0o755).await.unwrap();

    let err = fs.rename("/a", "/a/b/a").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn chroot_does_not_affect_sibling_handles() {
    let (fs, _dir) = mount().await;
    fs.mkdir("/jail", 0o755).await.unwrap();
    fs.write_file("/jail/inside", b"in").await.unwrap();
    fs.write_file("/outside", b"out").await.unwrap();

    let jailed = fs.chroot("/jail").await.unwrap();
    assert_eq!(jailed.read_file("/inside").await.unwrap(), b"in");
    assert!(jailed.read_file("/outside").await.is_err());

    // The handle chroot was called on keeps seeing the full tree.
    assert_eq!(fs.read_file("/outside").await.unwrap(), b"out");
    assert!(fs.exists("/jail/inside").await);
}

#[tokio::test]
async fn reopening_store_with_wrong_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    {
        let options = FsOptions::new(dir.path(), MasterKey::new([9u8; 32]));
        let _fs = cryptofs::Filesystem::mount(options).await.unwrap();
    }
    let options = FsOptions::new(dir.path(), MasterKey::new([8u8; 32]));
    let err = cryptofs::Filesystem::mount(options).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::KeyIncorrect);
}
