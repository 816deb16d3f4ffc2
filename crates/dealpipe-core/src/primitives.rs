//! # Limits
//!
//! Hardcoded field limits for pipeline records.
//!
//! These are compiled into the binary and are immutable at runtime.
//! Every limit is checked before anything is written to the store.

/// Maximum length of a stage name in bytes, after trimming.
pub const MAX_STAGE_NAME_LENGTH: usize = 128;

/// Maximum length of a deal title in bytes.
pub const MAX_TITLE_LENGTH: usize = 256;

/// Maximum length of deal notes in bytes (16 KiB).
pub const MAX_NOTES_LENGTH: usize = 16 * 1024;

/// Upper bound for a deal's close probability, in whole percent.
pub const MAX_PROBABILITY: u8 = 100;

/// Maximum number of stages accepted in a single reorder request.
///
/// Bounds the work of permutation checking.
pub const MAX_REORDER_LENGTH: usize = 1000;

/// Largest `order_index` a caller may request.
///
/// Collision shifts and appends move stages past this bound one step at a
/// time, so the headroom up to `i64::MAX` is never exhausted in practice.
pub const MAX_ORDER_INDEX: i64 = 1_000_000_000;

/// Smallest `order_index` a caller may request.
pub const MIN_ORDER_INDEX: i64 = -MAX_ORDER_INDEX;

/// First id handed out by every id sequence.
pub const FIRST_ID: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_sane() {
        assert!(MAX_STAGE_NAME_LENGTH < MAX_TITLE_LENGTH);
        assert!(MAX_TITLE_LENGTH < MAX_NOTES_LENGTH);
        assert_eq!(MAX_PROBABILITY, 100);
        assert!(FIRST_ID > 0);
        assert!(MIN_ORDER_INDEX < 0 && MAX_ORDER_INDEX > 0);
        assert!(MAX_ORDER_INDEX < i64::MAX / 2);
    }
}
