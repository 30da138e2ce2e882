//! Search Continuation Reference (SCR) procedure.
//!
//! The SCR procedure is invoked by distributed search processing once the
//! local portion of a search is done, handing over the continuation
//! references that were collected along the way. A chaining DSA would use
//! them to fan the search out to other DSAs.
//!
//! This DSA never chains for search continuation, so the procedure reduces
//! to consuming the list: every reference is dropped and the list is empty
//! when the call returns. The search layer relies on that postcondition to
//! know the references were handled.
//!
//! The governing standard does not say where the list is emptied when
//! chaining is enabled. The drain here models the no-chaining case only and
//! is not a general algorithm for chaining DSAs.

use tracing::debug;

use crate::continuation::ContinuationReference;

/// Runs the SCR procedure under the local no-chaining policy.
///
/// Every reference is removed from `references`; none is chained. Returns
/// the number of references that were dropped.
///
/// # Postcondition
///
/// `references.is_empty()` holds on return, whatever the input.
pub fn scr_procedure(references: &mut Vec<ContinuationReference>) -> usize {
    let mut dropped = 0;
    // Each drained reference leaves the list, so the loop always terminates.
    for cref in references.drain(..) {
        debug!(
            reference_type = cref.reference_type.name(),
            target_object_length = cref.target_object.len(),
            access_points = cref.access_points.len(),
            "not chaining search continuation reference"
        );
        dropped += 1;
    }
    dropped
}
