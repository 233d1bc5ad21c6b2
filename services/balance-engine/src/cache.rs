use async_trait::async_trait;
use ledger_core::codec::{balance_key, cached_key, decode_fields, encode_fields};
use ledger_core::{Amount, BalanceMap, CacheLookup, CacheStore, DeltaOutcome, UserId};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Applies deltas only when the populated marker exists
///
/// KEYS[1] balance hash, KEYS[2] marker; ARGV holds counterparty/delta pairs.
/// Returns 0 when not populated, -1 when a target field is not an integer,
/// 1 once every delta is applied. The hash inherits the marker's expiry, so a
/// hash first created here never outlives the entry it belongs to.
const APPLY_DELTA_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 0 then
    return 0
end
for i = 1, #ARGV, 2 do
    local current = redis.call('HGET', KEYS[1], ARGV[i])
    if current and not string.match(current, '^%-?%d+$') then
        return -1
    end
end
for i = 1, #ARGV, 2 do
    redis.call('HINCRBY', KEYS[1], ARGV[i], ARGV[i + 1])
end
local ttl = redis.call('PTTL', KEYS[2])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return 1
"#;

fn cache_error(err: redis::RedisError) -> ledger_core::Error {
    ledger_core::Error::Cache(err.to_string())
}

/// Redis-backed balance cache
#[derive(Clone)]
pub struct BalanceCache {
    redis: ConnectionManager,
    apply_delta: Script,
    ttl_secs: Option<u64>,
}

impl BalanceCache {
    pub fn new(redis: ConnectionManager, ttl_secs: Option<u64>) -> Self {
        BalanceCache {
            redis,
            apply_delta: Script::new(APPLY_DELTA_SCRIPT),
            ttl_secs,
        }
    }

    /// Check connectivity
    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for BalanceCache {
    async fn exists(&self, user: UserId) -> ledger_core::Result<bool> {
        let mut conn = self.redis.clone();
        conn.exists::<_, bool>(cached_key(user))
            .await
            .map_err(cache_error)
    }

    async fn get(&self, user: UserId) -> ledger_core::Result<CacheLookup> {
        let mut conn = self.redis.clone();

        let (marked, fields): (bool, HashMap<String, String>) = redis::pipe()
            .atomic()
            .exists(cached_key(user))
            .hgetall(balance_key(user))
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;

        if !marked {
            return Ok(CacheLookup::NotCached);
        }

        match decode_fields(&fields) {
            Ok(balance) => Ok(CacheLookup::Hit(balance)),
            Err(e) => {
                warn!(user_id = %user, error = %e, "Dropping corrupted balance cache entry");
                self.clear(user).await?;
                Ok(CacheLookup::NotCached)
            }
        }
    }

    async fn populate(&self, user: UserId, balance: &BalanceMap) -> ledger_core::Result<()> {
        let mut conn = self.redis.clone();
        let balance_key = balance_key(user);
        let cached_key = cached_key(user);
        let fields = encode_fields(balance);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&balance_key)
            .ignore()
            .del(&cached_key)
            .ignore();
        if !fields.is_empty() {
            pipe.hset_multiple(&balance_key, fields.as_slice()).ignore();
        }
        pipe.set(&cached_key, 1).ignore();
        if let Some(ttl) = self.ttl_secs {
            pipe.cmd("EXPIRE").arg(&balance_key).arg(ttl).ignore();
            pipe.cmd("EXPIRE").arg(&cached_key).arg(ttl).ignore();
        }

        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(cache_error)?;

        debug!(user_id = %user, counterparties = fields.len(), "Populated balance cache");
        Ok(())
    }

    async fn apply_delta(
        &self,
        user: UserId,
        deltas: &[(UserId, Amount)],
    ) -> ledger_core::Result<DeltaOutcome> {
        let mut conn = self.redis.clone();

        let mut invocation = self.apply_delta.prepare_invoke();
        invocation.key(balance_key(user)).key(cached_key(user));
        for (counterparty, delta) in deltas {
            invocation.arg(counterparty.to_string()).arg(*delta);
        }

        let status: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(cache_error)?;

        match status {
            0 => Ok(DeltaOutcome::Skipped),
            1 => Ok(DeltaOutcome::Applied),
            _ => Err(ledger_core::Error::Corrupted(format!(
                "balance entry for user {} holds a non-integer field",
                user
            ))),
        }
    }

    async fn clear(&self, user: UserId) -> ledger_core::Result<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(vec![balance_key(user), cached_key(user)])
            .await
            .map_err(cache_error)
    }
}
