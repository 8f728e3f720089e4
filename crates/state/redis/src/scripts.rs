/// Lua script for set-if-absent with a lease (SET NX PX).
///
/// KEYS\[1\] = record key
/// ARGV\[1\] = value (holder token)
/// ARGV\[2\] = TTL in milliseconds
///
/// Returns 1 if set, 0 if a live value already exists.
pub const CHECK_AND_SET: &str = r"
local ok = redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2])
if ok then
    return 1
end
return 0
";

/// Lua script for deleting a record only while it holds the expected value.
///
/// KEYS\[1\] = record key
/// ARGV\[1\] = expected value
///
/// Returns 1 if deleted, 0 otherwise.
pub const COMPARE_AND_DELETE: &str = r"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return 0
";

/// Lua script for resetting a record's TTL only while it holds the expected
/// value.
///
/// KEYS\[1\] = record key
/// ARGV\[1\] = expected value
/// ARGV\[2\] = new TTL in milliseconds
///
/// Returns 1 if extended, 0 otherwise.
pub const COMPARE_AND_EXPIRE: &str = r"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
end
return 0
";

/// Lua script that scores a sorted-set member by a freshly incremented
/// counter. Queued with `EVAL` inside `MULTI`, since a plain transaction
/// cannot feed the `INCR` result into `ZADD`.
///
/// KEYS\[1\] = sorted set key
/// KEYS\[2\] = counter key
/// ARGV\[1\] = member
///
/// Returns the new counter value.
pub const ADD_SEQUENCED: &str = r"
local seq = redis.call('INCR', KEYS[2])
redis.call('ZADD', KEYS[1], seq, ARGV[1])
return seq
";
