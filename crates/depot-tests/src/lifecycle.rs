//! End-to-end lifecycle suites: upload, dedup, tree, commit, clone, GC.

#[cfg(test)]
mod tests {
    use crate::harness::{v1, TestNode, TEST_BLOCK_SIZE};
    use depot_chunk::{ChunkHash, StoreScheme};
    use depot_fs::{decode_tree, encode_tree, export_tar, FileStream, TreeFormat};
    use depot_meta::DatasetKind;
    use std::io::{Cursor, Read, SeekFrom};

    #[tokio::test]
    async fn test_catalog_scenario_end_to_end() {
        let node = TestNode::start().await.unwrap();
        let payload = b"dummy content";

        // Two files, identical content, one version.
        for path in ["file1.txt", "file2.txt"] {
            node.manager
                .upload_file(
                    DatasetKind::Dataset,
                    &v1(),
                    path,
                    Cursor::new(payload.to_vec()),
                )
                .await
                .unwrap();
        }

        // Exactly one blob and one chunk row per distinct block; two file
        // rows reference them.
        let head = ChunkHash::digest(&payload[..TEST_BLOCK_SIZE]);
        let row = node
            .meta
            .chunk_by_hash(StoreScheme::V1, &head)
            .unwrap()
            .unwrap();
        assert_eq!(node.meta.chunk_ref_count(row.id).unwrap(), 2);
        assert_eq!(node.chunks.stats().puts_written, 2); // 13 bytes -> 2 blocks
        assert_eq!(node.chunks.stats().puts_deduped, 2); // second file dedups both

        let files = node.meta.files_of_version(&v1(), false).unwrap();
        assert_eq!(files.len(), 2);

        // The virtual root lists both names with equal size.
        let tree = node.builder().build(&v1()).unwrap();
        let listing = tree.readdir("/", 0).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].name, "file1.txt");
        assert_eq!(listing[1].name, "file2.txt");
        assert_eq!(listing[0].size, listing[1].size);
        assert_eq!(listing[0].size, payload.len() as u64);

        // Commit, then further writes are forbidden but reads still work.
        node.manager.commit(&v1()).await.unwrap();
        let err = node
            .manager
            .upload_file(
                DatasetKind::Dataset,
                &v1(),
                "file3.txt",
                Cursor::new(payload.to_vec()),
            )
            .await
            .unwrap_err();
        assert!(err.is_forbidden());

        let tree = node.builder().build(&v1()).unwrap();
        assert_eq!(tree.readdir("/", 0).unwrap().len(), 2);

        // No delete has happened, so a GC pass reclaims nothing.
        let report = node.gc.run_pass().await;
        assert!(report.is_noop());
        assert!(node
            .chunks
            .check(&head, StoreScheme::V1)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_chunk_roundtrip_across_boundaries() {
        let node = TestNode::start().await.unwrap();
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        node.manager
            .upload_file(
                DatasetKind::Dataset,
                &v1(),
                "blob.bin",
                Cursor::new(payload.clone()),
            )
            .await
            .unwrap();

        let tree = node.builder().build(&v1()).unwrap();
        let file = tree.lookup("blob.bin").unwrap();
        assert_eq!(file.size, 1000);
        assert_eq!(file.chunks().unwrap().len(), 1000 / TEST_BLOCK_SIZE);

        let mut stream = FileStream::new(node.chunks.clone(), file.chunks().unwrap().to_vec());
        let rebuilt = stream.read_to_end().await.unwrap();
        assert_eq!(rebuilt, payload);

        // Seek into the middle and reread.
        stream.seek(SeekFrom::Start(500)).await.unwrap();
        let tail = stream.read_to_end().await.unwrap();
        assert_eq!(tail, payload[500..]);
    }

    #[tokio::test]
    async fn test_delete_then_gc_respects_shared_chunks() {
        let node = TestNode::start().await.unwrap();
        let shared = b"shared across versions";
        let lone = b"only in the doomed one";

        node.manager
            .upload_file(DatasetKind::Dataset, &v1(), "shared.bin", Cursor::new(shared.to_vec()))
            .await
            .unwrap();
        let v2 = v1().at_version("2.0.0");
        node.manager
            .upload_file(DatasetKind::Dataset, &v2, "shared.bin", Cursor::new(shared.to_vec()))
            .await
            .unwrap();
        node.manager
            .upload_file(DatasetKind::Dataset, &v2, "lone.bin", Cursor::new(lone.to_vec()))
            .await
            .unwrap();

        node.manager.delete_version(&v2).await.unwrap();
        let report = node.gc.run_pass().await;
        assert_eq!(report.versions_purged, 1);
        assert_eq!(report.files_purged, 2);

        // Shared chunks survive; the lone file's chunks are gone.
        let shared_head = ChunkHash::digest(&shared[..TEST_BLOCK_SIZE]);
        assert!(node
            .chunks
            .check(&shared_head, StoreScheme::V1)
            .await
            .unwrap()
            .is_some());
        let lone_head = ChunkHash::digest(&lone[..TEST_BLOCK_SIZE]);
        assert!(node
            .chunks
            .check(&lone_head, StoreScheme::V1)
            .await
            .unwrap()
            .is_none());

        // The surviving version still reads back fully.
        let tree = node.builder().build(&v1()).unwrap();
        let mut stream = FileStream::new(
            node.chunks.clone(),
            tree.lookup("shared.bin").unwrap().chunks().unwrap().to_vec(),
        );
        assert_eq!(stream.read_to_end().await.unwrap(), shared);
    }

    #[tokio::test]
    async fn test_clone_trees_equal_then_diverge() {
        let node = TestNode::start().await.unwrap();
        for (path, data) in [("a.txt", b"alpha bits".as_slice()), ("b/c.txt", b"beta")] {
            node.manager
                .upload_file(DatasetKind::Dataset, &v1(), path, Cursor::new(data.to_vec()))
                .await
                .unwrap();
        }

        let v2 = v1().at_version("2.0.0");
        node.manager.clone_version(&v1(), &v2, "fork").await.unwrap();

        let tree1 = node.builder().build(&v1()).unwrap();
        let tree2 = node.builder().build(&v2).unwrap();
        assert_eq!(tree1.root(), tree2.root());

        // Mutating the source does not alter the clone.
        node.manager.delete_file(&v1(), "a.txt").await.unwrap();
        let tree1 = node.builder().build(&v1()).unwrap();
        let tree2 = node.builder().build(&v2).unwrap();
        assert!(tree1.lookup("a.txt").is_none());
        assert!(tree2.lookup("a.txt").is_some());
        assert_ne!(tree1.root(), tree2.root());
    }

    #[tokio::test]
    async fn test_tree_formats_and_tar_export() {
        let node = TestNode::start().await.unwrap();
        node.manager
            .upload_file(
                DatasetKind::Dataset,
                &v1(),
                "docs/readme.md",
                Cursor::new(b"# depot\nversioned datasets\n".to_vec()),
            )
            .await
            .unwrap();

        let tree = node.builder().build(&v1()).unwrap();

        // All three wire formats carry the identical tree.
        for &format in TreeFormat::all() {
            let bytes = encode_tree(&tree, format).unwrap();
            assert_eq!(decode_tree(&bytes, format).unwrap(), tree);
        }

        // Tar export reproduces path, mode and content.
        let archive_bytes = export_tar(&tree, node.chunks.clone()).await.unwrap();
        let mut archive = tar::Archive::new(&archive_bytes[..]);
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(
            entry.path().unwrap().to_string_lossy(),
            "docs/readme.md"
        );
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"# depot\nversioned datasets\n");
    }

    #[tokio::test]
    async fn test_gc_background_loop_reclaims_after_delete() {
        let node = TestNode::start().await.unwrap();
        node.manager
            .upload_file(
                DatasetKind::Dataset,
                &v1(),
                "a.bin",
                Cursor::new(b"temporary".to_vec()),
            )
            .await
            .unwrap();

        let handle = node
            .gc
            .clone()
            .spawn(depot_version::GcConfig { interval_secs: 3600 });

        // delete_version signals the collector.
        node.manager.delete_version(&v1()).await.unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if node.meta.get_version(&v1()).unwrap().is_none() {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "gc loop never reclaimed the version"
            );
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        handle.abort();
    }
}
