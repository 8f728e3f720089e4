use turnstile_state::StateKey;

/// Render a [`StateKey`] into a Redis key string with the given prefix.
///
/// The format is `prefix:kind:{name}`. The braces form a Redis Cluster hash
/// tag, so every key of one resource hashes to the same slot and can take
/// part in the same `MULTI` block.
pub fn render_key(prefix: &str, key: &StateKey) -> String {
    format!("{}:{}:{{{}}}", prefix, key.kind, key.name)
}
