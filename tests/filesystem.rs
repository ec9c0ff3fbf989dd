mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use rangefs::drivers::memory::MemoryBackend;
use rangefs::{
    BackendConfig, BlockingFileSystem, ErrorKind, FileSystem, ObjectBackend, UploadState, DEFAULT_BLOCK_SIZE,
};

use common::{payload, quick_config, FlakyUploads, SlowFirstInit};

fn memory_fs(config: BackendConfig) -> (Arc<MemoryBackend>, FileSystem) {
    let backend = Arc::new(MemoryBackend::new());
    (backend.clone(), FileSystem::with_backend(backend, config))
}

#[tokio::test]
async fn pipe_then_cat_round_trip() {
    let (_, fs) = memory_fs(quick_config());
    for len in [0usize, 1, 1000, DEFAULT_BLOCK_SIZE + 17] {
        let data = payload(len);
        let path = format!("b/obj-{}", len);
        fs.pipe(&path, Bytes::from(data.clone())).await.unwrap();
        assert_eq!(&fs.cat(&path, 0, 0).await.unwrap()[..], &data[..]);
        assert_eq!(fs.stat(&path).await.unwrap().size, len as u64);
    }
}

#[tokio::test]
async fn writer_round_trip_below_and_above_threshold() {
    let (backend, fs) = memory_fs(quick_config());

    let small = payload(1234);
    let mut writer = fs.open_write("b/small").unwrap();
    writer.write(&small).await.unwrap();
    writer.close().await.unwrap();
    assert_eq!(writer.state(), UploadState::OneShotComplete);
    assert_eq!(&fs.cat("b/small", 0, 0).await.unwrap()[..], &small[..]);

    let large = payload(2 * DEFAULT_BLOCK_SIZE + 3);
    let mut writer = fs.open_write("b/large").unwrap();
    for chunk in large.chunks(1 << 20) {
        writer.write(chunk).await.unwrap();
    }
    writer.close().await.unwrap();
    assert_eq!(writer.state(), UploadState::MultipartComplete);
    assert_eq!(writer.parts().len(), 3);
    assert_eq!(&fs.cat("b/large", 0, 0).await.unwrap()[..], &large[..]);
    assert!(backend.pending_uploads().is_empty());
}

#[tokio::test]
async fn block_plus_one_then_block_minus_one_makes_two_parts() {
    let (_, fs) = memory_fs(quick_config());
    let bs = DEFAULT_BLOCK_SIZE;
    let first = payload(bs + 1);
    let second: Vec<u8> = payload(bs - 1).into_iter().map(|b| b.wrapping_add(7)).collect();

    let mut writer = fs.open_write("b/two").unwrap();
    writer.write(&first).await.unwrap();
    writer.write(&second).await.unwrap();
    writer.close().await.unwrap();

    let total = first.len() + second.len();
    assert_eq!(writer.parts().len(), (total + bs - 1) / bs);
    assert_eq!(writer.parts().len(), 2);
    let mut expected = first.clone();
    expected.extend_from_slice(&second);
    assert_eq!(&fs.cat("b/two", 0, 0).await.unwrap()[..], &expected[..]);
}

#[tokio::test]
async fn failed_part_keeps_bytes_for_retry() {
    let failing = Arc::new(AtomicBool::new(true));
    let memory = Arc::new(MemoryBackend::new());
    let backend = Arc::new(FlakyUploads {
        inner: memory.clone(),
        failing: failing.clone(),
    });
    let config = BackendConfig {
        block_size: 4,
        ..quick_config()
    };
    let fs = FileSystem::with_backend(backend, config);

    let mut writer = fs.open_write("b/retry").unwrap();
    let err = writer.write(b"abcdefghij").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UploadState);
    assert_eq!(err.root_kind(), ErrorKind::Auth);
    assert_eq!(writer.state(), UploadState::MultipartActive);
    assert!(writer.upload_id().is_some());
    assert_eq!(writer.buffered(), 10);

    failing.store(false, Ordering::SeqCst);
    writer.close().await.unwrap();
    assert_eq!(writer.state(), UploadState::MultipartComplete);
    let data = memory.range_fetch("b/retry", rangefs::ByteRange::whole()).await.unwrap();
    assert_eq!(&data[..], b"abcdefghij");
}

#[tokio::test]
async fn timed_out_init_is_not_repeated() {
    let memory = Arc::new(MemoryBackend::new());
    let backend = Arc::new(SlowFirstInit::new(memory.clone(), std::time::Duration::from_secs(3)));
    let config = BackendConfig {
        block_size: 4,
        request_timeout_secs: 1,
        ..quick_config()
    };
    let fs = FileSystem::with_backend(backend.clone(), config);

    let mut writer = fs.open_write("b/slow-init").unwrap();
    let err = writer.write(b"abcdefghij").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UploadState);
    assert_eq!(err.root_kind(), ErrorKind::TransientNetwork);
    assert_eq!(backend.init_count(), 1);
    assert_eq!(writer.upload_id(), None);
    assert_eq!(writer.state(), UploadState::Buffering);
    assert_eq!(writer.buffered(), 10);
    let orphaned = memory.pending_uploads();
    assert_eq!(orphaned.len(), 1);

    writer.close().await.unwrap();
    assert_eq!(backend.init_count(), 2);
    assert_eq!(writer.state(), UploadState::MultipartComplete);
    assert_eq!(memory.pending_uploads(), orphaned);
    assert_eq!(&fs.cat("b/slow-init", 0, 0).await.unwrap()[..], b"abcdefghij");
}

#[tokio::test]
async fn dangling_upload_is_left_for_cleanup() {
    let (backend, fs) = memory_fs(BackendConfig {
        block_size: 4,
        ..quick_config()
    });
    let upload_id = {
        let mut writer = fs.open_write("b/dangling").unwrap();
        writer.write(b"0123456789").await.unwrap();
        writer.upload_id().map(str::to_string)
    };
    let upload_id = upload_id.unwrap();
    assert_eq!(backend.pending_uploads(), vec![upload_id.clone()]);
    backend.abort_upload("b/dangling", &upload_id).await.unwrap();
    assert!(backend.pending_uploads().is_empty());
}

#[tokio::test]
async fn find_follows_pages_and_filters_prefix() {
    let backend = Arc::new(MemoryBackend::with_page_size(3));
    let fs = FileSystem::with_backend(backend, quick_config());
    let mut expected = Vec::new();
    for i in 0..10 {
        let path = format!("b/dir/{:02}.bin", i);
        fs.pipe(&path, Bytes::from(payload(i))).await.unwrap();
        expected.push(path);
    }
    fs.pipe("b/dir2/x.bin", Bytes::from_static(b"x")).await.unwrap();
    fs.pipe("b/other.bin", Bytes::from_static(b"x")).await.unwrap();

    let found = fs.find("memory://b/dir/").await.unwrap();
    assert_eq!(found, expected);
    assert_eq!(fs.find("b/dir/").await.unwrap(), found);

    let detail = fs.find_detail("b/dir/").await.unwrap();
    assert_eq!(detail.len(), 10);
    assert_eq!(detail[4].size, 4);
    assert!(fs.find("b/nothing/").await.unwrap().is_empty());
}

#[tokio::test]
async fn pipe_many_and_cat_many() {
    let (_, fs) = memory_fs(quick_config());
    let objects: HashMap<String, Bytes> = (0..20)
        .map(|i| (format!("b/many/{}", i), Bytes::from(payload(i * 3))))
        .collect();
    fs.pipe_many(objects.clone()).await.unwrap();

    let paths: Vec<String> = objects.keys().cloned().collect();
    let fetched = fs.cat_many(&paths).await.unwrap();
    assert_eq!(fetched, objects);
}

#[tokio::test]
async fn get_downloads_to_local_files() {
    let (_, fs) = memory_fs(quick_config());
    fs.pipe("b/one", Bytes::from_static(b"first")).await.unwrap();
    fs.pipe("b/two", Bytes::from(payload(5000))).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let locals = vec![dir.path().join("one.txt"), dir.path().join("nested/two.bin")];
    fs.get(&["b/one".to_string(), "b/two".to_string()], &locals).await.unwrap();
    assert_eq!(std::fs::read(&locals[0]).unwrap(), b"first");
    assert_eq!(std::fs::read(&locals[1]).unwrap(), payload(5000));

    let err = fs.get(&["b/one".to_string()], &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn five_threads_share_one_blocking_filesystem() -> anyhow::Result<()> {
    let data = payload(3 * 1024 * 1024 + 11);
    let fs = Arc::new(BlockingFileSystem::with_backend(
        Arc::new(MemoryBackend::new()),
        quick_config(),
    )?);
    fs.pipe("b/shared", data.clone())?;

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let fs = fs.clone();
            std::thread::spawn(move || fs.cat("b/shared", 0, 0))
        })
        .collect();
    for handle in handles {
        let got = handle.join().map_err(|_| anyhow::anyhow!("reader thread panicked"))??;
        assert_eq!(&got[..], &data[..]);
    }
    Ok(())
}

#[test]
fn construction_rejects_bad_configuration() {
    let err = BackendConfig::from_json_str(r#"{"anon": true, "bogus_option": 1}"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let err = FileSystem::new("s3", BackendConfig::default()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);

    let err = FileSystem::new("ftp", BackendConfig::default()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);

    // S3 parts below 5 MiB are rejected when the writer is opened
    let config = BackendConfig::from_json_str(
        r#"{"anon": true, "endpoint_url": "http://127.0.0.1:9", "block_size": 1048576}"#,
    )
    .unwrap();
    let fs = FileSystem::new("s3", config).unwrap();
    let err = fs.open_write("bucket/key").err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
}
