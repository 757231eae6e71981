//! Retry controller on top of the single-shot `propose`

use error_stack::Report;
use rand::Rng;
use tracing::{debug, instrument, trace};

use super::ProposeOutcome;
use crate::config::RetryConfig;
use crate::error::NodeError;
use crate::node::NodeHandle;

/// Propose `value` until an attempt commits or `retry.max_attempts` attempts
/// have been made.
///
/// Every retry starts above the highest ballot seen so far: the failed
/// attempt's own, or the one a NACK reported. Between attempts the caller
/// backs off with jitter drawn from `rng`. At least one attempt is always
/// made; the last outcome is returned.
///
/// # Errors
///
/// Returns [`NodeError`] if the node stops running.
#[instrument(skip_all, name = "propose_with_retry", fields(node_id = handle.node_id()))]
pub async fn propose_with_retry<V>(
    handle: &NodeHandle<V>,
    value: V,
    retry: &RetryConfig,
    rng: &mut impl Rng,
) -> Result<ProposeOutcome<V>, Report<NodeError>>
where
    V: Clone + Send + 'static,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut floor = None;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = match floor {
            Some(floor) => handle.propose_above(value.clone(), floor).await?,
            None => handle.propose(value.clone()).await?,
        };

        let ProposeOutcome::Failed { ballot, failure } = &outcome else {
            debug!(attempt, "proposal committed");
            return Ok(outcome);
        };
        if attempt >= max_attempts {
            debug!(attempt, %failure, "giving up");
            return Ok(outcome);
        }

        let next_floor = failure.rejected_by.map_or(*ballot, |rejected| rejected.max(*ballot));
        debug!(attempt, %failure, floor = %next_floor, "proposal failed, will retry");
        floor = Some(next_floor);

        let backoff = retry.backoff.duration(attempt - 1, rng);
        trace!(?backoff, "backing off before retry");
        tokio::time::sleep(backoff).await;
    }
}
