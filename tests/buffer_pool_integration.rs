//! Integration tests for the buffer pool manager against a real
//! tablespace file, covering cross-component behavior its own unit
//! tests don't: persistence across process restarts and eviction under
//! concurrent access from multiple threads.

use innocore::buffer::BufferPoolManager;
use innocore::common::SpaceId;
use innocore::storage::page::PageType;
use innocore::storage::tablespace::Tablespace;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn create_bpm(pool_size: usize, path: &std::path::Path, space_id: SpaceId) -> BufferPoolManager {
    let ts = Tablespace::create(path, space_id).unwrap();
    let bpm = BufferPoolManager::new(pool_size, Duration::from_secs(3600));
    bpm.register_tablespace(ts);
    bpm
}

#[test]
fn test_data_persistence_across_evictions() {
    let dir = tempdir().unwrap();
    let space_id = SpaceId::new(1);
    let bpm = create_bpm(2, &dir.path().join("t.ibd"), space_id);

    let mut page_ids = Vec::new();
    for i in 0u8..5 {
        let mut guard = bpm.new_page(space_id, 1, PageType::Index).unwrap();
        guard.as_mut_slice()[100] = i;
        guard.as_mut_slice()[101] = i.wrapping_mul(3);
        page_ids.push(guard.page_id());
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(space_id, pid).unwrap();
        assert_eq!(guard.as_slice()[100], i as u8);
        assert_eq!(guard.as_slice()[101], (i as u8).wrapping_mul(3));
    }
}

#[test]
fn test_flush_and_reload_across_bpm_instances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.ibd");
    let space_id = SpaceId::new(1);
    let data = b"persistent!";
    let pid;

    {
        let bpm = create_bpm(10, &path, space_id);
        let mut guard = bpm.new_page(space_id, 1, PageType::Index).unwrap();
        pid = guard.page_id();
        guard.as_mut_slice()[100..100 + data.len()].copy_from_slice(data);
        drop(guard);
        bpm.flush_all_pages().unwrap();
        bpm.close().unwrap();
    }

    {
        let ts = Tablespace::open(&path, space_id).unwrap();
        let bpm = BufferPoolManager::new(10, Duration::from_secs(3600));
        bpm.register_tablespace(ts);

        let guard = bpm.fetch_page_read(space_id, pid).unwrap();
        assert_eq!(&guard.as_slice()[100..100 + data.len()], data);
    }
}

#[test]
fn test_concurrent_writers_to_distinct_pages() {
    let dir = tempdir().unwrap();
    let space_id = SpaceId::new(1);
    let bpm = Arc::new(create_bpm(10, &dir.path().join("t.ibd"), space_id));

    let page_ids: Vec<_> = (0..5)
        .map(|_| bpm.new_page(space_id, 1, PageType::Index).unwrap().page_id())
        .collect();

    let mut handles = Vec::new();
    for (i, pid) in page_ids.iter().enumerate() {
        let bpm = Arc::clone(&bpm);
        let pid = *pid;
        handles.push(thread::spawn(move || {
            for j in 0..50 {
                let mut guard = bpm.fetch_page_write(space_id, pid).unwrap();
                guard.as_mut_slice()[100] = ((i * 50 + j) % 256) as u8;
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(space_id, pid).unwrap();
        assert_eq!(guard.as_slice()[100], ((i * 50 + 49) % 256) as u8);
    }
}

#[test]
fn test_stats_accuracy_under_eviction() {
    let dir = tempdir().unwrap();
    let space_id = SpaceId::new(1);
    let bpm = create_bpm(2, &dir.path().join("t.ibd"), space_id);

    let pid = bpm.new_page(space_id, 1, PageType::Index).unwrap().page_id();
    for _ in 0..5 {
        let _ = bpm.fetch_page_read(space_id, pid).unwrap();
    }
    let stats = bpm.stats().snapshot();
    assert!(stats.cache_hits >= 5);

    let _ = bpm.new_page(space_id, 1, PageType::Index).unwrap();
    let _ = bpm.new_page(space_id, 1, PageType::Index).unwrap();
    let stats = bpm.stats().snapshot();
    assert!(stats.evictions >= 1);
}
