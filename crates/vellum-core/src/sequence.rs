use parking_lot::Mutex;
use tracing::debug;
use vellum_codec::{decode_value, encode_value};
use vellum_engine::Store;
use vellum_error::{Result, VellumError};
use vellum_types::Value;

/// Number of values leased from persistent storage at a time.
const LEASE: i64 = 64;

#[derive(Debug)]
struct SeqState {
    /// Last value handed out.
    current: i64,
    /// Persisted watermark: values up to here are burned even on a crash.
    leased: i64,
}

/// A named monotonically-increasing int64 counter.
///
/// Values are leased from the persisted watermark in blocks, so most calls
/// to [`Sequence::next`] touch only memory. The watermark is written within
/// the allocating transaction; a crash burns at most the unleased remainder,
/// never reissues a value that was handed out. [`Sequence::release`] writes
/// the unused remainder back at database close.
#[derive(Debug)]
pub struct Sequence {
    name: String,
    state: Mutex<SeqState>,
}

impl Sequence {
    /// A sequence resuming from a persisted watermark (`0` for a fresh one).
    pub fn new(name: impl Into<String>, watermark: i64) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SeqState {
                current: watermark,
                leased: watermark,
            }),
        }
    }

    /// The sequence name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the next value, extending the persisted lease through `store`
    /// when the cached range is exhausted.
    pub fn next(&self, store: &dyn Store) -> Result<i64> {
        let mut state = self.state.lock();
        if state.current == state.leased {
            let leased = state
                .leased
                .checked_add(LEASE)
                .ok_or(VellumError::IntegerOverflow)?;
            store.put(self.name.as_bytes(), &encode_value(&Value::Int(leased)))?;
            state.leased = leased;
            debug!(sequence = %self.name, watermark = leased, "sequence lease extended");
        }
        state.current += 1;
        Ok(state.current)
    }

    /// Write the unused cached range back: persisted watermark := current.
    pub fn release(&self, store: &dyn Store) -> Result<()> {
        let mut state = self.state.lock();
        store.put(self.name.as_bytes(), &encode_value(&Value::Int(state.current)))?;
        state.leased = state.current;
        debug!(sequence = %self.name, watermark = state.current, "sequence released");
        Ok(())
    }
}

/// Decode a persisted watermark value.
pub(crate) fn decode_watermark(bytes: &[u8]) -> Result<i64> {
    match decode_value(bytes)? {
        Value::Int(v) => Ok(v),
        other => Err(VellumError::corrupted(format!(
            "sequence watermark is a {}, expected an int",
            other.type_name()
        ))),
    }
}
