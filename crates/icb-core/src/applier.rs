//! Replaying a [`ChangeBatch`] against a mirror.
//!
//! The applier is stateless: it takes a mirror that equals the producer's
//! pre-batch state and leaves it equal to the producer's post-batch state.
//! Two addressing conventions are supported because producers disagree on what
//! an index means once a batch mixes removals and insertions.
//!
//! # Original addressing
//!
//! ```text
//! before:   [a, b, c, d]
//! removed:  (b, 1)
//! added:    (x, 1)
//!
//! mark against the original list, then materialize:
//!           [a, x, ~b~, c, d]  ->  [a, x, c, d]
//! ```
//!
//! Removals run from the highest index down so that no pending index moves.
//! Insertions run from the highest nominal index down, each shifted left by the
//! number of removals strictly below it.
//!
//! # Live addressing
//!
//! Removals run in the order given, each index read against the list as it is
//! at that step. Additions are read against the list after all removals.
//! The removal compensation for an addition is counted against its sequence
//! position among the additions, not against its nominal index.

use crate::change::{Addressing, ChangeBatch, ChangeItem};
use crate::error::ApplyError;
use tracing::trace;

/// Apply `batch` to `mirror` using the given addressing convention.
///
/// On error the mirror is left exactly as it was.
pub fn apply<T>(
    mirror: &mut Vec<T>,
    batch: ChangeBatch<T>,
    addressing: Addressing,
) -> Result<(), ApplyError> {
    apply_mapped(mirror, batch, addressing, |payload| payload)
}

/// Apply `batch` to a mirror of a different element type.
///
/// Added payloads are converted with `convert`; removed payloads are only used
/// for their indices and are dropped.
pub fn apply_mapped<S, T, F>(
    mirror: &mut Vec<T>,
    batch: ChangeBatch<S>,
    addressing: Addressing,
    convert: F,
) -> Result<(), ApplyError>
where
    F: FnMut(S) -> T,
{
    if batch.is_empty() {
        return Ok(());
    }

    trace!(
        %addressing,
        added = batch.added.len(),
        removed = batch.removed.len(),
        mirror_len = mirror.len(),
        "applying change batch"
    );

    match addressing {
        Addressing::Live => apply_live(mirror, batch, convert),
        Addressing::Original => apply_original(mirror, batch, convert),
    }
}

/// Live/sequential addressing.
pub fn apply_live<S, T, F>(
    mirror: &mut Vec<T>,
    batch: ChangeBatch<S>,
    mut convert: F,
) -> Result<(), ApplyError>
where
    F: FnMut(S) -> T,
{
    let ChangeBatch { added, removed } = batch;

    // Each removal shrinks the list by one, so step k sees length len - k.
    let len = mirror.len();
    for (step, item) in removed.iter().enumerate() {
        let length = len.saturating_sub(step);
        if item.index >= length {
            return Err(ApplyError::RemovalOutOfRange {
                index: item.index,
                length,
            });
        }
    }

    for item in &removed {
        mirror.remove(item.index);
    }

    let mut removed_sorted: Vec<usize> = removed.iter().map(|item| item.index).collect();
    removed_sorted.sort_unstable();

    for (position, ChangeItem { payload, index }) in added.into_iter().enumerate() {
        let preceding = removed_sorted.partition_point(|&r| r < position);
        let offset = index.saturating_sub(preceding).min(mirror.len());
        mirror.insert(offset, convert(payload));
    }

    Ok(())
}

/// Original/stable addressing.
pub fn apply_original<S, T, F>(
    mirror: &mut Vec<T>,
    batch: ChangeBatch<S>,
    mut convert: F,
) -> Result<(), ApplyError>
where
    F: FnMut(S) -> T,
{
    let ChangeBatch { mut added, removed } = batch;

    let mut removed_sorted: Vec<usize> = removed.iter().map(|item| item.index).collect();
    removed_sorted.sort_unstable();

    if let Some(pair) = removed_sorted.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(ApplyError::DuplicateRemoval { index: pair[0] });
    }
    if let Some(&highest) = removed_sorted.last() {
        if highest >= mirror.len() {
            return Err(ApplyError::RemovalOutOfRange {
                index: highest,
                length: mirror.len(),
            });
        }
    }

    for &index in removed_sorted.iter().rev() {
        mirror.remove(index);
    }

    // Stable ascending sort walked backwards: highest nominal index first, and
    // additions sharing an index end up in the order they were given.
    added.sort_by_key(|item| item.index);

    for ChangeItem { payload, index } in added.into_iter().rev() {
        let preceding = removed_sorted.partition_point(|&r| r < index);
        let adjusted = index.saturating_sub(preceding).min(mirror.len());
        mirror.insert(adjusted, convert(payload));
    }

    Ok(())
}
