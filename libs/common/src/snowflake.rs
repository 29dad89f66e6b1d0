use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};

/// Custom epoch: 2026-01-01T00:00:00Z in milliseconds since Unix epoch.
const NIKAH_EPOCH_MS: u64 = 1_767_225_600_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1; // 4095

struct State {
    last_ms: u64,
    sequence: u64,
}

/// 64-bit snowflake ID generator used for message identifiers.
///
/// Layout (MSB → LSB):
/// - Bits 63–22: Timestamp (42 bits), ms since the service epoch
/// - Bits 21–12: Worker ID (10 bits)
/// - Bits 11–0:  Sequence (12 bits), per-ms counter, max 4096/ms
///
/// IDs from one generator are strictly increasing. If the wall clock steps
/// backwards the generator keeps issuing from the last observed millisecond
/// instead of going back in time.
pub struct SnowflakeGenerator {
    worker_id: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: u16) -> Self {
        assert!(
            (worker_id as u64) < (1 << WORKER_BITS),
            "worker_id must fit in {WORKER_BITS} bits"
        );
        Self {
            worker_id: worker_id as u64,
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut now_ms = current_ms().max(state.last_ms);

        if now_ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond. Wait for the clock,
                // or borrow the next millisecond if the clock is lagging.
                now_ms = wait_next_ms(state.last_ms);
            }
        } else {
            state.sequence = 0;
        }

        state.last_ms = now_ms;

        let ts = now_ms - NIKAH_EPOCH_MS;
        let id = (ts << (WORKER_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence;

        id as i64
    }
}

fn wait_next_ms(last_ms: u64) -> u64 {
    for _ in 0..1_000 {
        let now = current_ms();
        if now > last_ms {
            return now;
        }
        std::hint::spin_loop();
    }
    last_ms + 1
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(NIKAH_EPOCH_MS)
        .max(NIKAH_EPOCH_MS)
}

/// Extract the creation timestamp (ms since Unix epoch) from a snowflake ID.
pub fn snowflake_timestamp_ms(id: i64) -> u64 {
    let ts = (id as u64) >> (WORKER_BITS + SEQUENCE_BITS);
    ts + NIKAH_EPOCH_MS
}

/// Extract the creation time of a snowflake ID as a UTC datetime.
pub fn snowflake_datetime(id: i64) -> DateTime<Utc> {
    let ms = snowflake_timestamp_ms(id) as i64;
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generates_unique_ids() {
        let gen = SnowflakeGenerator::new(0);
        let mut ids = HashSet::new();
        for _ in 0..10_000 {
            let id = gen.generate();
            assert!(ids.insert(id), "duplicate snowflake: {id}");
        }
    }

    #[test]
    fn ids_are_monotonically_increasing() {
        let gen = SnowflakeGenerator::new(0);
        let mut prev = 0i64;
        for _ in 0..1_000 {
            let id = gen.generate();
            assert!(id > prev, "not monotonic: {prev} >= {id}");
            prev = id;
        }
    }

    #[test]
    fn clock_regression_does_not_go_backwards() {
        let gen = SnowflakeGenerator::new(3);
        let first = gen.generate();

        // Pretend the last issued ID came from a millisecond far in the future.
        {
            let mut state = gen.state.lock().unwrap();
            state.last_ms += 60_000;
        }

        let second = gen.generate();
        assert!(second > first);
        assert!(snowflake_timestamp_ms(second) >= snowflake_timestamp_ms(first) + 60_000);
    }

    #[test]
    fn timestamp_extraction_round_trips() {
        let gen = SnowflakeGenerator::new(0);
        let before = current_ms();
        let id = gen.generate();
        let after = current_ms();

        let extracted = snowflake_timestamp_ms(id);
        assert!(
            extracted >= before && extracted <= after,
            "extracted={extracted}, before={before}, after={after}"
        );
        assert_eq!(snowflake_datetime(id).timestamp_millis() as u64, extracted);
    }

    #[test]
    fn ids_are_positive() {
        let gen = SnowflakeGenerator::new(0);
        for _ in 0..100 {
            assert!(gen.generate() > 0);
        }
    }
}
