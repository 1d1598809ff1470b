//! Integration-level coverage for the multipart engine's pure state: part
//! sizing, cancellation, and option defaults, exercised through the crate's
//! public surface rather than `#[cfg(test)]` internals.

use s3_core::aws::s3::multipart::{part_count_for, part_size_for, CancellationToken, PutOptions, DEFAULT_CONCURRENCY, MAX_PART_COUNT, MAX_PART_SIZE, MIN_PART_SIZE, UNKNOWN_LENGTH_PART_SIZE};

#[test]
fn part_sizing_matches_the_documented_law_across_the_whole_range() {
    // Empty object still gets a single part at the floor size.
    assert_eq!(part_size_for(Some(0)).unwrap(), MIN_PART_SIZE);

    // Small objects never drop below the minimum part size.
    let small = part_size_for(Some(1024 * 1024)).unwrap();
    assert_eq!(small, MIN_PART_SIZE);
    assert_eq!(part_count_for(1024 * 1024, small), 1);

    // A multi-terabyte object keeps the part count within bounds.
    let huge = 4u64 * 1024 * 1024 * 1024 * 1024; // 4 TiB
    let part_size = part_size_for(Some(huge)).unwrap();
    let count = part_count_for(huge, part_size);
    assert!(count <= MAX_PART_COUNT as u32);
    assert!(part_size <= MAX_PART_SIZE);

    // Anything past 5 TiB (MAX_PART_SIZE * MAX_PART_COUNT) is rejected.
    assert!(part_size_for(Some(MAX_PART_SIZE * MAX_PART_COUNT + 1)).is_err());

    // Unknown length always falls back to the fixed streaming part size.
    assert_eq!(part_size_for(None).unwrap(), UNKNOWN_LENGTH_PART_SIZE);
}

#[test]
fn cancellation_token_shares_state_across_clones() {
    let token = CancellationToken::new();
    let worker_view = token.clone();
    assert!(!worker_view.is_cancelled());

    token.cancel();
    assert!(worker_view.is_cancelled(), "cancellation must be visible to every clone");
}

#[test]
fn put_options_default_uses_documented_defaults() {
    let options = PutOptions::default();
    assert!(options.content_type.is_none());
    assert!(options.metadata.is_empty());
    assert!(options.total_size_hint.is_none());
    assert!(!options.resume);
    assert!(options.cancellation.is_none());
    // Confirms the engine's own fallback, used when `concurrency` is unset.
    assert_eq!(options.concurrency.unwrap_or(DEFAULT_CONCURRENCY), DEFAULT_CONCURRENCY);
}
