/// Read-through caching for engine responses.
///
/// Returns the value cached under `$key` when present. Otherwise awaits
/// `$block` (a future yielding a `Result`), queues the value for a
/// background write with `$ttl` seconds to live, and returns it.
///
/// Expands to an `AppResult<T>` expression, so it is meant to be the tail
/// of a function returning `AppResult<T>`.
///
/// ```rust,ignore
/// let key = CacheKey::Recommendations { snapshot, user: 42, n: 10 };
/// cached!(cache, key, 3600, async { build_recommendations(&engine, 42, 10) })
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key).await? {
            tracing::debug!(key = %$key, "Cache hit");
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}
