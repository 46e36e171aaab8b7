// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::{mount, new_flaky_root, new_root, put_file, test_config};
use crate::dag::{DagNode, FsData};
use crate::error::Error;
use crate::importer::import_bytes;
use crate::node::{Node, NodeKind};
use crate::ops::lookup;
use crate::root::Root;
use crate::store::{MemoryStore, NodeStore};

#[tokio::test]
async fn test_add_and_unlink_net_listing() {
    let fx = new_root().await;
    let dir = fx.root.value().as_dir().unwrap();

    let a = DagNode::empty_file().unwrap();
    let b1 = import_bytes(fx.store.as_ref(), b"first", &test_config().import).await.unwrap();
    let b2 = import_bytes(fx.store.as_ref(), b"second", &test_config().import).await.unwrap();

    dir.add_child("a", &a).await.unwrap();
    dir.add_child("b", &b1).await.unwrap();
    dir.add_child("c", &DagNode::empty_dir().unwrap()).await.unwrap();
    dir.add_child("b", &b2).await.unwrap();
    dir.unlink("a").await.unwrap();

    let listing = dir.list().await.unwrap();
    let names: Vec<_> = listing.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["b", "c"]);
    assert_eq!(listing[0].cid, b2.cid().unwrap());
    assert_eq!(listing[0].kind, NodeKind::File);
    assert_eq!(listing[0].size, 6);
    assert_eq!(listing[1].kind, NodeKind::Directory);
    assert_eq!(dir.child_names().await, vec!["b", "c"]);
}

#[tokio::test]
async fn test_directory_errors() {
    let fx = new_root().await;
    let dir = fx.root.value().as_dir().unwrap();

    assert!(matches!(
        dir.add_child("", &DagNode::empty_file().unwrap()).await,
        Err(Error::EmptyName)
    ));
    assert!(matches!(dir.unlink("missing").await, Err(Error::NotFound(_))));

    match dir.child("missing").await {
        Err(Error::NotFound(path)) => assert_eq!(path.to_str(), Some("/missing")),
        other => panic!("unexpected {:?}", other.map(|n| n.kind())),
    }

    _ = dir.mkdir("sub").await.unwrap();
    assert!(matches!(dir.mkdir("sub").await, Err(Error::AlreadyExists(_))));
}

#[tokio::test]
async fn test_child_is_cached_until_replaced() {
    let fx = new_root().await;
    put_file(&fx.root, "/f", b"hello").await;
    let dir = fx.root.value().as_dir().unwrap();

    let first = dir.child("f").await.unwrap();
    let again = dir.child("f").await.unwrap();
    assert!(first.ptr_eq(&again));

    dir.add_child("f", &DagNode::empty_file().unwrap()).await.unwrap();
    let replaced = dir.child("f").await.unwrap();
    assert!(!first.ptr_eq(&replaced));
}

#[tokio::test]
async fn test_undecodable_child() {
    let fx = new_root().await;
    let dir = fx.root.value().as_dir().unwrap();
    let junk = DagNode::new(vec![], b"junk".to_vec());
    dir.add_child("junk", &junk).await.unwrap();
    assert!(matches!(dir.child("junk").await, Err(Error::Codec(_))));

    let link = DagNode::from_fs_data(&FsData::symlink("/elsewhere"), vec![]).unwrap();
    dir.add_child("link", &link).await.unwrap();
    assert!(matches!(
        dir.child("link").await,
        Err(Error::UnsupportedNodeType(_))
    ));
}

#[tokio::test]
async fn test_file_read_write_seek() {
    let fx = new_root().await;
    put_file(&fx.root, "/f", b"0123456789").await;
    let file = lookup(&fx.root, "/f").await.unwrap().as_file().unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(file.read(&mut buf).await.unwrap(), 4);
    assert_eq!(&buf, b"0123");

    assert_eq!(file.seek(SeekFrom::End(-2)).await.unwrap(), 8);
    assert_eq!(file.read_to_end().await.unwrap(), b"89");
    assert_eq!(file.read(&mut buf).await.unwrap(), 0);

    assert!(matches!(
        file.seek(SeekFrom::Current(-100)).await,
        Err(Error::InvalidArgument(_))
    ));

    _ = file.seek(SeekFrom::Start(12)).await.unwrap();
    _ = file.write(b"xy").await.unwrap();
    assert_eq!(file.size().await.unwrap(), 14);
    _ = file.seek(SeekFrom::Start(0)).await.unwrap();
    assert_eq!(file.read_to_end().await.unwrap(), b"0123456789\0\0xy");
}

#[tokio::test]
async fn test_truncate() {
    let fx = new_root().await;
    put_file(&fx.root, "/f", b"0123456789").await;
    let file = lookup(&fx.root, "/f").await.unwrap().as_file().unwrap();

    file.truncate(4).await.unwrap();
    assert_eq!(file.size().await.unwrap(), 4);
    file.truncate(6).await.unwrap();
    assert_eq!(file.read_to_end().await.unwrap(), b"0123\0\0");
    assert!(file.is_dirty().await);

    file.close().await.unwrap();
    assert!(!file.is_dirty().await);
    let stored = lookup(&fx.root, "/f").await.unwrap().materialize().await.unwrap();
    assert_eq!(stored.fs_data().unwrap().filesize, Some(6));
}

#[tokio::test]
async fn test_huge_extension_fails_cleanly() {
    let fx = new_root().await;
    put_file(&fx.root, "/f", b"abc").await;
    let file = lookup(&fx.root, "/f").await.unwrap().as_file().unwrap();

    _ = file.seek(SeekFrom::Start(1u64 << 63)).await.unwrap();
    assert!(matches!(file.write(b"x").await, Err(Error::InvalidArgument(_))));
    assert!(matches!(
        file.truncate(1u64 << 63).await,
        Err(Error::InvalidArgument(_))
    ));

    // Still usable afterwards
    assert_eq!(file.size().await.unwrap(), 3);
    _ = file.seek(SeekFrom::End(0)).await.unwrap();
    _ = file.write(b"d").await.unwrap();
    _ = file.seek(SeekFrom::Start(0)).await.unwrap();
    assert_eq!(file.read_to_end().await.unwrap(), b"abcd");
}

#[tokio::test]
async fn test_second_close_does_not_persist() {
    let fx = new_root().await;
    put_file(&fx.root, "/f", b"abc").await;
    let file = lookup(&fx.root, "/f").await.unwrap().as_file().unwrap();

    _ = file.write(b"xyz").await.unwrap();
    file.close().await.unwrap();
    let puts = fx.store.put_count();

    file.close().await.unwrap();
    assert_eq!(fx.store.put_count(), puts);
}

#[tokio::test]
async fn test_close_without_write_is_noop() {
    let fx = new_root().await;
    put_file(&fx.root, "/f", b"abc").await;
    let file = lookup(&fx.root, "/f").await.unwrap().as_file().unwrap();
    let cid = fx.root.cid().await;
    let puts = fx.store.put_count();

    file.close().await.unwrap();
    assert_eq!(fx.store.put_count(), puts);
    assert_eq!(fx.root.cid().await, cid);
}

#[tokio::test]
async fn test_commit_propagates_to_root() {
    let fx = new_root().await;
    _ = crate::ops::mkdir(&fx.root, "/a/b", true).await.unwrap();
    put_file(&fx.root, "/a/b/f", b"old").await;
    let before = fx.root.cid().await;

    let file = lookup(&fx.root, "/a/b/f").await.unwrap().as_file().unwrap();
    _ = file.write(b"new").await.unwrap();
    // Nothing is committed before close
    assert_eq!(fx.root.cid().await, before);

    file.close().await.unwrap();
    let after = fx.root.cid().await;
    assert_ne!(after, before);
    assert_eq!(after, fx.root.value().cid().await.unwrap());
    assert_eq!(fx.root.republisher().latest(), after);

    let stored = fx.store.get(&after).await.unwrap();
    let a = stored.link("a").unwrap();
    assert!(fx.store.contains(&a.cid).await);
}

#[tokio::test]
async fn test_chunked_file_matches_import() {
    let fx = new_root().await;
    put_file(&fx.root, "/big", b"").await;
    let file = lookup(&fx.root, "/big").await.unwrap().as_file().unwrap();

    let data: Vec<u8> = (0..200u8).collect();
    _ = file.write(&data).await.unwrap();
    file.close().await.unwrap();

    let imported = import_bytes(fx.store.as_ref(), &data, &test_config().import).await.unwrap();
    let node = file.materialize().await.unwrap();
    assert_eq!(node.cid().unwrap(), imported.cid().unwrap());
    assert!(!node.links.is_empty());

    // Reopened from the store, reads back through the chunk tree
    let root = Root::new(
        fx.store.clone(),
        fx.root.value().materialize().await.unwrap(),
        fx.publisher.clone(),
        test_config(),
    )
    .unwrap();
    let reopened = lookup(&root, "/big").await.unwrap().as_file().unwrap();
    assert_eq!(reopened.size().await.unwrap(), 200);
    assert_eq!(reopened.read_to_end().await.unwrap(), data);
}

#[tokio::test]
async fn test_storage_failure_leaves_file_dirty() {
    let fx = new_flaky_root().await;
    put_file(&fx.root, "/f", b"abc").await;
    let file = lookup(&fx.root, "/f").await.unwrap().as_file().unwrap();
    let before = fx.root.cid().await;

    _ = file.write(b"xyz").await.unwrap();
    fx.store.fail_puts(true);
    assert!(matches!(file.close().await, Err(Error::Storage(_))));
    assert!(file.is_dirty().await);
    assert_eq!(fx.root.cid().await, before);

    fx.store.fail_puts(false);
    file.close().await.unwrap();
    assert!(!file.is_dirty().await);
    assert_ne!(fx.root.cid().await, before);
}

#[tokio::test]
async fn test_failed_parent_commit_is_retried() {
    let fx = new_flaky_root().await;
    put_file(&fx.root, "/f", b"abc").await;
    let file = lookup(&fx.root, "/f").await.unwrap().as_file().unwrap();
    let before = fx.root.cid().await;

    _ = file.write(b"xyz").await.unwrap();
    fx.store
        .fail_when(|node| node.fs_data().is_ok_and(|fs| fs.kind == crate::dag::DataKind::Directory));
    assert!(matches!(file.close().await, Err(Error::Storage(_))));
    assert!(!file.is_dirty().await);
    assert_eq!(fx.root.cid().await, before);

    fx.store.fail_when(|_| false);
    file.close().await.unwrap();
    assert_ne!(fx.root.cid().await, before);
}

#[tokio::test]
async fn test_stale_child_commit_is_ignored() {
    let fx = new_root().await;
    put_file(&fx.root, "/f", b"abc").await;
    let dir = fx.root.value().as_dir().unwrap();
    let old = dir.child("f").await.unwrap().as_file().unwrap();

    let replacement = put_file(&fx.root, "/f", b"replacement").await;
    let cid = fx.root.cid().await;

    _ = old.write(b"stale").await.unwrap();
    old.close().await.unwrap();

    assert_eq!(fx.root.cid().await, cid);
    let listing = dir.list().await.unwrap();
    assert_eq!(listing[0].cid, replacement.cid().unwrap());
}

#[tokio::test]
async fn test_unlinked_file_commit_is_dropped() {
    let fx = new_root().await;
    _ = crate::ops::mkdir(&fx.root, "/d", false).await.unwrap();
    put_file(&fx.root, "/d/f", b"abc").await;
    let d = lookup(&fx.root, "/d").await.unwrap().as_dir().unwrap();
    let f = d.child("f").await.unwrap().as_file().unwrap();

    fx.root.value().as_dir().unwrap().unlink("d").await.unwrap();
    drop(d);
    let cid = fx.root.cid().await;

    _ = f.write(b"orphan").await.unwrap();
    f.close().await.unwrap();
    assert_eq!(fx.root.cid().await, cid);
}

#[tokio::test]
async fn test_root_rejects_unsupported_kind() {
    let store = Arc::new(MemoryStore::new());
    let link = DagNode::from_fs_data(&FsData::symlink("/x"), vec![]).unwrap();
    let publisher = Arc::new(super::RecordingPublisher::default());
    assert!(matches!(
        Root::new(store, link, publisher, test_config()),
        Err(Error::UnsupportedNodeType(_))
    ));
}

#[tokio::test]
async fn test_file_root() {
    let store = Arc::new(MemoryStore::new());
    let node = import_bytes(store.as_ref(), b"solo", &test_config().import).await.unwrap();
    let fx = mount(store, node).await;

    let value = lookup(&fx.root, "/").await.unwrap();
    assert_eq!(value.kind(), NodeKind::File);
    assert!(matches!(lookup(&fx.root, "/x").await, Err(Error::NotADirectory(_))));

    let file = value.as_file().unwrap();
    _ = file.seek(SeekFrom::End(0)).await.unwrap();
    _ = file.write(b"!").await.unwrap();
    file.close().await.unwrap();
    assert_eq!(fx.root.cid().await, file.materialize().await.unwrap().cid().unwrap());
}

#[tokio::test]
async fn test_root_close_publishes_final_state() {
    let fx = new_root().await;
    put_file(&fx.root, "/f", b"abc").await;
    let file = lookup(&fx.root, "/f").await.unwrap().as_file().unwrap();
    _ = file.write(b"unflushed").await.unwrap();

    fx.root.close().await.unwrap();
    let published = fx.publisher.values();
    assert_eq!(published.last(), Some(&fx.root.cid().await));
    assert!(!file.is_dirty().await);

    // Idempotent
    fx.root.close().await.unwrap();
    assert_eq!(fx.publisher.values().len(), published.len());
}

#[tokio::test]
async fn test_root_close_reports_publish_error() {
    let fx = new_root().await;
    put_file(&fx.root, "/f", b"abc").await;
    fx.publisher.fail.store(true, Ordering::SeqCst);
    assert!(matches!(fx.root.close().await, Err(Error::Publish(_))));

    fx.publisher.fail.store(false, Ordering::SeqCst);
    fx.root.close().await.unwrap();
    assert_eq!(fx.publisher.values(), vec![fx.root.cid().await]);
}

#[tokio::test]
async fn test_root_close_publishes_despite_flush_failure() {
    let fx = new_flaky_root().await;
    _ = crate::ops::mkdir(&fx.root, "/a", false).await.unwrap();
    put_file(&fx.root, "/a/f", b"abc").await;
    let committed = fx.root.cid().await;

    let file = lookup(&fx.root, "/a/f").await.unwrap().as_file().unwrap();
    _ = file.write(b"dirty").await.unwrap();
    fx.store.fail_puts(true);

    assert!(matches!(fx.root.close().await, Err(Error::Storage(_))));
    assert_eq!(fx.publisher.values(), vec![committed]);

    // Retrying once the store recovers publishes the dirty state
    fx.store.fail_puts(false);
    fx.root.close().await.unwrap();
    let published = fx.publisher.values();
    assert_eq!(published.len(), 2);
    assert_ne!(published[1], committed);
    assert_eq!(published[1], fx.root.cid().await);
}

#[tokio::test(start_paused = true)]
async fn test_mutations_are_republished() {
    let fx = new_root().await;
    for n in 0..5u8 {
        put_file(&fx.root, &format!("/f{}", n), &[n]).await;
    }
    assert!(fx.publisher.values().is_empty());

    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert_eq!(fx.publisher.values(), vec![fx.root.cid().await]);
}

#[tokio::test]
async fn test_concurrent_writers_in_sibling_directories() {
    let fx = new_root().await;
    _ = crate::ops::mkdir(&fx.root, "/x", false).await.unwrap();
    _ = crate::ops::mkdir(&fx.root, "/y", false).await.unwrap();
    put_file(&fx.root, "/x/f", b"").await;
    put_file(&fx.root, "/y/f", b"").await;

    let fx_file = lookup(&fx.root, "/x/f").await.unwrap().as_file().unwrap();
    let fy_file = lookup(&fx.root, "/y/f").await.unwrap().as_file().unwrap();
    let listing_dir = fx.root.value().as_dir().unwrap();

    let writer = |file: crate::file::File, tag: u8| async move {
        for _ in 0..20 {
            _ = file.seek(SeekFrom::End(0)).await.unwrap();
            _ = file.write(&[tag]).await.unwrap();
            file.close().await.unwrap();
        }
    };
    let lister = async {
        for _ in 0..20 {
            _ = listing_dir.list().await.unwrap();
        }
    };
    tokio::join!(writer(fx_file.clone(), b'x'), writer(fy_file.clone(), b'y'), lister);

    let root_node = fx.root.value().materialize().await.unwrap();
    assert_eq!(fx.root.cid().await, root_node.cid().unwrap());
    let x = lookup(&fx.root, "/x/f").await.unwrap();
    assert!(matches!(x, Node::File(_)));
    assert_eq!(x.as_file().unwrap().size().await.unwrap(), 20);
}
