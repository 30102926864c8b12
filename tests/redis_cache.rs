//! Live Redis tests.
//!
//! - Marked `#[ignore]`; run with `ROWCACHE_TEST_REDIS_URL` pointing at a
//!   disposable server and `cargo test -- --ignored`.

use std::time::Duration;

use bytes::Bytes;
use rowcache::cache::CacheStore;
use rowcache::infra::redis::RedisCache;
use uuid::Uuid;

fn live_cache() -> RedisCache {
    let url = std::env::var("ROWCACHE_TEST_REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    RedisCache::connect(&url, 4)
        .expect("redis pool")
        .namespace(format!("rowcache-test:{}:", Uuid::new_v4()))
        .scan_batch(10)
}

#[tokio::test]
#[ignore]
async fn set_get_delete_round_trip() {
    let cache = live_cache();
    cache.ping().await.expect("ping");

    cache
        .set("user:1", Bytes::from_static(b"{\"id\":1}"), Duration::from_secs(30))
        .await
        .expect("set");
    let value = cache.get("user:1").await.expect("get");
    assert_eq!(value.as_deref(), Some(&b"{\"id\":1}"[..]));

    cache.delete("user:1").await.expect("delete");
    cache.delete("user:1").await.expect("deleting an absent key");
    assert_eq!(cache.get("user:1").await.expect("get"), None);
}

#[tokio::test]
#[ignore]
async fn delete_matching_scans_every_batch() {
    let cache = live_cache();
    for n in 0..25 {
        cache
            .set(
                &format!("user:list:10:{n}"),
                Bytes::from_static(b"[]"),
                Duration::from_secs(30),
            )
            .await
            .expect("set");
    }
    cache
        .set("user:email:a@x.io", Bytes::from_static(b"{}"), Duration::from_secs(30))
        .await
        .expect("set");

    let removed = cache.delete_matching("user:list:*").await.expect("scan");
    assert_eq!(removed, 25);
    assert!(cache.get("user:email:a@x.io").await.expect("get").is_some());
    assert_eq!(cache.delete_matching("user:list:*").await.expect("scan"), 0);

    cache.delete("user:email:a@x.io").await.expect("cleanup");
}

#[tokio::test]
#[ignore]
async fn entries_expire_after_ttl() {
    let cache = live_cache();
    cache
        .set("short", Bytes::from_static(b"1"), Duration::from_secs(1))
        .await
        .expect("set");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(cache.get("short").await.expect("get"), None);
}
