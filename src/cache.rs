use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// 带过期时间的并发缓存
///
/// 条目到期后由下一次 get_or_refresh 惰性刷新。并发情况下可能
/// 出现重复刷新，刷新是幂等的，重复只是浪费一次调用。
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// 读取未过期的缓存值
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// 写入缓存，过期时间从现在起算
    pub fn put(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// 读取或刷新：命中有效缓存直接返回，否则调用 loader 并回填
    ///
    /// loader 失败时不写缓存，错误原样返回给调用方。
    pub async fn get_or_refresh<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = loader().await?;
        self.put(key, value.clone());
        Ok(value)
    }

    /// 失效单个条目
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }
}
