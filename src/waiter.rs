use std::collections::HashSet;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionId, Applied, WatchSet};
use crate::api::ActionSource;
use crate::context::{StopReason, WaitContext};
use crate::error::{ActionFailed, AggregateActionFailure, WaitError};
use crate::poller::Poller;
use crate::progress::ProgressSink;

/// Consecutive responses that may leave out a pending action before the wait
/// gives up on it as unknown.
pub const MAX_MISSING_POLLS: u32 = 3;

/// Blocks until a set of remote actions has finished.
///
/// Holds no state between calls: every `wait_for_actions` owns its own
/// [`WatchSet`], so one waiter can serve concurrent waits.
pub struct ActionWaiter<S> {
    source: S,
    poller: Poller,
}

impl<S: ActionSource> ActionWaiter<S> {
    pub fn new(source: S, poller: Poller) -> Self {
        Self { source, poller }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Wait for a single action. See [`ActionWaiter::wait_for_actions`].
    pub async fn wait_for_action(
        &self,
        ctx: &WaitContext,
        sink: &dyn ProgressSink,
        action: &Action,
    ) -> Result<(), WaitError> {
        self.wait_for_actions(ctx, sink, std::slice::from_ref(action))
            .await
    }

    /// Poll every action until it is terminal, then report the aggregate outcome.
    ///
    /// - All succeeded: `Ok(())`.
    /// - Some failed: [`WaitError::ActionsFailed`] with one entry per failed
    ///   action in input order, returned only after the others finished too.
    /// - `ctx` done first: [`WaitError::Incomplete`] naming the pending IDs and
    ///   carrying the failures seen so far.
    /// - The API answers without some pending IDs for [`MAX_MISSING_POLLS`]
    ///   cycles, or without any of them at all: [`WaitError::Unknown`].
    /// - Status fetch failed after retries: [`WaitError::Transport`], immediately.
    ///
    /// `sink.finish()` is called exactly once before returning.
    pub async fn wait_for_actions(
        &self,
        ctx: &WaitContext,
        sink: &dyn ProgressSink,
        actions: &[Action],
    ) -> Result<(), WaitError> {
        let mut watch = WatchSet::new(actions);
        for action in watch.iter().filter(|a| a.is_terminal()) {
            sink.on_update(action);
        }

        let result = self.run(ctx, sink, &mut watch).await;
        sink.finish();
        result
    }

    async fn run(
        &self,
        ctx: &WaitContext,
        sink: &dyn ProgressSink,
        watch: &mut WatchSet,
    ) -> Result<(), WaitError> {
        let mut cycle: u32 = 0;
        while !watch.all_terminal() {
            if let Some(reason) = ctx.stop_reason() {
                return Err(incomplete(reason, watch));
            }

            let pending = watch.pending_ids();
            cycle += 1;
            debug!(cycle, pending = pending.len(), "polling actions");

            // A fetch that is already complete wins over a cancellation that
            // fires in the same instant: a terminal answer beats "incomplete".
            let snapshots = tokio::select! {
                biased;
                fetched = self.poller.fetch(&self.source, &pending) => {
                    fetched.map_err(WaitError::Transport)?
                }
                reason = ctx.done() => return Err(incomplete(reason, watch)),
            };
            let returned = apply_snapshots(watch, sink, snapshots);
            check_missing(watch, &pending, &returned)?;

            if watch.all_terminal() {
                break;
            }

            tokio::select! {
                biased;
                reason = ctx.done() => return Err(incomplete(reason, watch)),
                () = sleep(self.poller.next_interval()) => {}
            }
        }

        info!(actions = watch.len(), cycles = cycle, "all actions finished");
        outcome(watch)
    }
}

fn apply_snapshots(
    watch: &mut WatchSet,
    sink: &dyn ProgressSink,
    snapshots: Vec<Action>,
) -> HashSet<ActionId> {
    let mut seen = HashSet::with_capacity(snapshots.len());
    for snapshot in snapshots {
        let id = snapshot.id;
        seen.insert(id);
        match watch.apply(snapshot) {
            Applied::Ignored => continue,
            Applied::Updated => {}
            Applied::Finished => {
                if let Some(action) = watch.get(id) {
                    debug!(action_id = %id, status = %action.status, "action finished");
                }
            }
        }
        if let Some(action) = watch.get(id) {
            sink.on_update(action);
        }
    }
    seen
}

// A response holding none of the requested IDs means the API does not know
// them; partial gaps are tolerated for a few cycles.
fn check_missing(
    watch: &mut WatchSet,
    requested: &[ActionId],
    returned: &HashSet<ActionId>,
) -> Result<(), WaitError> {
    if !requested.is_empty() && !requested.iter().any(|id| returned.contains(id)) {
        warn!(missing = requested.len(), "status response contained none of the requested actions");
        return Err(WaitError::Unknown {
            ids: requested.to_vec(),
        });
    }

    let exhausted = watch.record_missing(requested, returned, MAX_MISSING_POLLS);
    if !exhausted.is_empty() {
        warn!(missing = exhausted.len(), "actions missing from status responses, giving up on them");
        return Err(WaitError::Unknown { ids: exhausted });
    }
    for id in requested.iter().filter(|id| !returned.contains(id)) {
        warn!(action_id = %id, "action missing from status response, will ask again");
    }
    Ok(())
}

fn incomplete(reason: StopReason, watch: &WatchSet) -> WaitError {
    let pending = watch.pending_ids();
    warn!(%reason, pending = pending.len(), "stopped waiting before all actions finished");
    WaitError::Incomplete {
        reason,
        pending,
        failures: failures(watch),
    }
}

fn failures(watch: &WatchSet) -> Vec<ActionFailed> {
    watch.failed().map(ActionFailed::from_action).collect()
}

fn outcome(watch: &WatchSet) -> Result<(), WaitError> {
    let failures = failures(watch);
    if failures.is_empty() {
        Ok(())
    } else {
        Err(AggregateActionFailure { failures }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::poller::{PollPolicy, RetryPolicy};
    use crate::testing::{RecordingSink, ScriptedSource};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn waiter(source: ScriptedSource) -> ActionWaiter<ScriptedSource> {
        let poller = Poller::new(
            PollPolicy {
                interval: INTERVAL,
                jitter: Duration::ZERO,
            },
            RetryPolicy::default(),
        );
        ActionWaiter::new(source, poller)
    }

    fn ctx() -> WaitContext {
        WaitContext::new(CancellationToken::new())
    }

    fn running(id: u64, progress: u8) -> Action {
        Action::running(id).with_progress(progress)
    }

    fn unwrap_aggregate(result: Result<(), WaitError>) -> AggregateActionFailure {
        match result {
            Err(WaitError::ActionsFailed(agg)) => agg,
            other => panic!("expected ActionsFailed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn all_succeed_returns_ok_and_reports_full_progress() {
        let source = ScriptedSource::new()
            .script(1, vec![running(1, 10), Action::running(1u64).succeeded()])
            .script(2, vec![Action::running(2u64).succeeded()])
            .script(3, vec![running(3, 20), running(3, 70), Action::running(3u64).succeeded()]);
        let waiter = waiter(source);
        let sink = RecordingSink::default();
        let actions: Vec<Action> = (1..=3u64).map(Action::running).collect();

        waiter.wait_for_actions(&ctx(), &sink, &actions).await.unwrap();

        for id in 1..=3 {
            let updates = sink.updates_for(id);
            assert!(!updates.is_empty(), "no updates for {id}");
            assert_eq!(updates.last().unwrap().progress, 100);
        }
        assert_eq!(sink.finish_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_failure_is_aggregated() {
        let source = ScriptedSource::new()
            .script(1, vec![Action::running(1u64).succeeded()])
            .script(2, vec![running(2, 40), Action::running(2u64).failed("action_failed", "image not found")])
            .script(3, vec![Action::running(3u64).succeeded()]);
        let waiter = waiter(source);
        let sink = RecordingSink::default();
        let actions: Vec<Action> = (1..=3u64).map(Action::running).collect();

        let agg = unwrap_aggregate(waiter.wait_for_actions(&ctx(), &sink, &actions).await);
        assert_eq!(agg.len(), 1);
        assert_eq!(agg.failures[0].action_id, ActionId(2));
        assert_eq!(agg.failures[0].message, "image not found");
    }

    #[tokio::test(start_paused = true)]
    async fn many_failures_keep_input_order() {
        // Action 3 fails first and action 1 last; the report still follows input order.
        let source = ScriptedSource::new()
            .script(1, vec![running(1, 0), running(1, 0), Action::running(1u64).failed("e", "one")])
            .script(2, vec![running(2, 0), Action::running(2u64).failed("e", "two")])
            .script(3, vec![Action::running(3u64).failed("e", "three")]);
        let waiter = waiter(source);
        let sink = RecordingSink::default();
        let actions: Vec<Action> = (1..=3u64).map(Action::running).collect();

        let agg = unwrap_aggregate(waiter.wait_for_actions(&ctx(), &sink, &actions).await);
        let ids: Vec<ActionId> = agg.failures.iter().map(|f| f.action_id).collect();
        assert_eq!(ids, vec![ActionId(1), ActionId(2), ActionId(3)]);
        let messages: Vec<&str> = agg.failures.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_actions_are_never_fetched_again() {
        let source = ScriptedSource::new()
            .script(1, vec![Action::running(1u64).succeeded()])
            .script(2, vec![running(2, 10), running(2, 50), running(2, 90), Action::running(2u64).succeeded()]);
        let waiter = waiter(source);
        let sink = RecordingSink::default();

        waiter
            .wait_for_actions(&ctx(), &sink, &[Action::running(1u64), Action::running(2u64)])
            .await
            .unwrap();

        let source = waiter.source();
        assert_eq!(source.fetch_count(1), 1);
        assert_eq!(source.fetch_count(2), 4);
        assert!(source.requests()[1..].iter().all(|batch| batch == &vec![ActionId(2)]));
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_two_polls_and_failure_after_three() {
        let source = ScriptedSource::new()
            .script(1, vec![running(1, 50), Action::running(1u64).succeeded()])
            .script(
                2,
                vec![
                    running(2, 30),
                    running(2, 60),
                    Action::running(2u64).failed("quota_exceeded", "disk quota exceeded"),
                ],
            );
        let waiter = waiter(source);
        let sink = RecordingSink::default();

        let agg = unwrap_aggregate(
            waiter
                .wait_for_actions(&ctx(), &sink, &[Action::running(1u64), Action::running(2u64)])
                .await,
        );

        assert_eq!(agg.len(), 1);
        assert_eq!(agg.failures[0].action_id, ActionId(2));
        assert_eq!(agg.failures[0].message, "disk quota exceeded");
        assert!(sink.updates_for(1).len() >= 2);
        assert!(sink.updates_for(2).len() >= 3);
        assert_eq!(waiter.source().fetch_count(1), 2);
        assert_eq!(waiter.source().fetch_count(2), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_returns_incomplete_with_all_ids() {
        let source = ScriptedSource::new()
            .script(1, vec![running(1, 0)])
            .script(2, vec![running(2, 0)]);
        let waiter = waiter(source);
        let sink = RecordingSink::default();
        let token = CancellationToken::new();
        let ctx = WaitContext::new(token.clone());

        let canceller = tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            token.cancel();
        });
        let started = Instant::now();
        let result = waiter
            .wait_for_actions(&ctx, &sink, &[Action::running(1u64), Action::running(2u64)])
            .await;
        canceller.await.unwrap();

        match result {
            Err(WaitError::Incomplete {
                reason,
                pending,
                failures,
            }) => {
                assert_eq!(reason, StopReason::Cancelled);
                assert!(failures.is_empty());
                assert_eq!(pending, vec![ActionId(1), ActionId(2)]);
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_millis(150) + INTERVAL);
        assert_eq!(sink.finish_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_context_does_not_poll() {
        let source = ScriptedSource::new().script(1, vec![running(1, 0)]);
        let waiter = waiter(source);
        let token = CancellationToken::new();
        token.cancel();

        let result = waiter
            .wait_for_action(&WaitContext::new(token), &RecordingSink::default(), &Action::running(1u64))
            .await;
        assert!(matches!(result, Err(WaitError::Incomplete { .. })));
        assert_eq!(waiter.source().request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_action_times_out_at_deadline() {
        let source = ScriptedSource::new().script(7, vec![running(7, 10)]);
        let waiter = ActionWaiter::new(
            source,
            Poller::new(
                PollPolicy {
                    interval: Duration::from_millis(500),
                    jitter: Duration::ZERO,
                },
                RetryPolicy::default(),
            ),
        );
        let ctx = WaitContext::with_timeout(CancellationToken::new(), Duration::from_millis(50));

        let started = Instant::now();
        let result = waiter
            .wait_for_action(&ctx, &RecordingSink::default(), &Action::running(7u64))
            .await;
        let elapsed = started.elapsed();

        match result {
            Err(WaitError::Incomplete { reason, pending, .. }) => {
                assert_eq!(reason, StopReason::DeadlineExceeded);
                assert_eq!(pending, vec![ActionId(7)]);
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn final_snapshot_wins_race_with_deadline() {
        let source = ScriptedSource::new()
            .script(1, vec![Action::running(1u64).succeeded()])
            .with_latency(Duration::from_millis(100));
        let waiter = waiter(source);
        let ctx = WaitContext::with_timeout(CancellationToken::new(), Duration::from_millis(100));

        let result = waiter
            .wait_for_action(&ctx, &RecordingSink::default(), &Action::running(1u64))
            .await;
        assert!(result.is_ok(), "expected success, got {result:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn transport_fault_is_fatal_and_immediate() {
        let source = ScriptedSource::new()
            .script(1, vec![running(1, 0)])
            .fail_next(ApiError::Unauthorized {
                status: 401,
                message: "invalid token".into(),
            });
        let waiter = waiter(source);
        let sink = RecordingSink::default();

        let result = waiter
            .wait_for_action(&ctx(), &sink, &Action::running(1u64))
            .await;
        assert!(matches!(
            result,
            Err(WaitError::Transport(ApiError::Unauthorized { .. }))
        ));
        assert_eq!(waiter.source().request_count(), 1);
        assert_eq!(sink.finish_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_fetch_failure_does_not_abort_the_wait() {
        let source = ScriptedSource::new()
            .script(1, vec![Action::running(1u64).succeeded()])
            .fail_next(ApiError::RateLimited { retry_after_ms: 10 });
        let waiter = waiter(source);

        waiter
            .wait_for_action(&ctx(), &RecordingSink::default(), &Action::running(1u64))
            .await
            .unwrap();
        assert_eq!(waiter.source().request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_returns_immediately() {
        let waiter = waiter(ScriptedSource::new());
        let sink = RecordingSink::default();
        waiter.wait_for_actions(&ctx(), &sink, &[]).await.unwrap();
        assert_eq!(waiter.source().request_count(), 0);
        assert_eq!(sink.finish_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_terminal_descriptor_is_not_polled() {
        let source = ScriptedSource::new().script(2, vec![Action::running(2u64).succeeded()]);
        let waiter = waiter(source);
        let sink = RecordingSink::default();

        let agg = unwrap_aggregate(
            waiter
                .wait_for_actions(
                    &ctx(),
                    &sink,
                    &[Action::running(1u64).failed("e", "already failed"), Action::running(2u64)],
                )
                .await,
        );
        assert_eq!(agg.failures[0].action_id, ActionId(1));
        assert_eq!(waiter.source().fetch_count(1), 0);
        assert_eq!(sink.updates_for(1).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn action_the_api_never_returns_fails_fast() {
        let waiter = waiter(ScriptedSource::new());
        let sink = RecordingSink::default();

        let result = tokio::time::timeout(
            Duration::from_secs(60),
            waiter.wait_for_action(&ctx(), &sink, &Action::running(999u64)),
        )
        .await
        .expect("wait must not hang on an unknown action");

        match result {
            Err(WaitError::Unknown { ids }) => assert_eq!(ids, vec![ActionId(999)]),
            other => panic!("expected Unknown, got {other:?}"),
        }
        assert_eq!(waiter.source().request_count(), 1);
        assert_eq!(sink.finish_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn partially_missing_id_is_given_up_after_a_few_polls() {
        // Action 2 never shows up while action 1 keeps running.
        let source = ScriptedSource::new().script(1, vec![running(1, 10)]);
        let waiter = waiter(source);

        let result = waiter
            .wait_for_actions(&ctx(), &RecordingSink::default(), &[Action::running(1u64), Action::running(2u64)])
            .await;
        match result {
            Err(WaitError::Unknown { ids }) => assert_eq!(ids, vec![ActionId(2)]),
            other => panic!("expected Unknown, got {other:?}"),
        }
        assert_eq!(waiter.source().fetch_count(2), MAX_MISSING_POLLS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn briefly_missing_id_is_asked_again() {
        let source = ScriptedSource::new()
            .script(1, vec![running(1, 10), running(1, 20), running(1, 30), Action::running(1u64).succeeded()])
            .script(2, vec![Action::running(2u64).succeeded()])
            .missing_for(2, 2);
        let waiter = waiter(source);

        waiter
            .wait_for_actions(&ctx(), &RecordingSink::default(), &[Action::running(1u64), Action::running(2u64)])
            .await
            .unwrap();
        assert_eq!(waiter.source().fetch_count(2), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn incomplete_keeps_failures_seen_so_far() {
        let source = ScriptedSource::new()
            .script(1, vec![Action::running(1u64).failed("action_failed", "image not found")])
            .script(2, vec![running(2, 10)]);
        let waiter = waiter(source);
        let ctx = WaitContext::with_timeout(CancellationToken::new(), Duration::from_millis(250));

        let result = waiter
            .wait_for_actions(&ctx, &RecordingSink::default(), &[Action::running(1u64), Action::running(2u64)])
            .await;
        match result {
            Err(WaitError::Incomplete {
                reason,
                pending,
                failures,
            }) => {
                assert_eq!(reason, StopReason::DeadlineExceeded);
                assert_eq!(pending, vec![ActionId(2)]);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].action_id, ActionId(1));
                assert_eq!(failures[0].message, "image not found");
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_inputs_are_watched_once() {
        let source = ScriptedSource::new().script(5, vec![running(5, 50), Action::running(5u64).succeeded()]);
        let waiter = waiter(source);

        waiter
            .wait_for_actions(&ctx(), &RecordingSink::default(), &[Action::running(5u64), Action::running(5u64)])
            .await
            .unwrap();
        assert!(waiter.source().requests().iter().all(|batch| batch.len() == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn wait_can_be_spawned_on_the_runtime() {
        let source = ScriptedSource::new().script(1, vec![Action::running(1u64).succeeded()]);
        let waiter = Arc::new(waiter(source));
        let sink = Arc::new(RecordingSink::default());

        let handle = tokio::spawn({
            let waiter = Arc::clone(&waiter);
            let sink = Arc::clone(&sink);
            async move {
                waiter
                    .wait_for_action(&ctx(), sink.as_ref(), &Action::running(1u64))
                    .await
            }
        });

        handle.await.unwrap().unwrap();
        assert_eq!(sink.updates_for(1).last().unwrap().progress, 100);
        assert_eq!(sink.finish_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waits_are_independent() {
        let source = ScriptedSource::new()
            .script(1, vec![running(1, 0), Action::running(1u64).succeeded()])
            .script(2, vec![running(2, 0), running(2, 0), Action::running(2u64).failed("e", "boom")]);
        let waiter = waiter(source);
        let (sink_a, sink_b) = (RecordingSink::default(), RecordingSink::default());
        let (ctx_a, ctx_b) = (ctx(), ctx());
        let (action_a, action_b) = (Action::running(1u64), Action::running(2u64));

        let (a, b) = tokio::join!(
            waiter.wait_for_action(&ctx_a, &sink_a, &action_a),
            waiter.wait_for_action(&ctx_b, &sink_b, &action_b),
        );
        assert!(a.is_ok());
        assert_eq!(unwrap_aggregate(b).failures[0].action_id, ActionId(2));
        assert!(sink_a.updates().iter().all(|u| u.id == ActionId(1)));
        assert!(sink_b.updates().iter().all(|u| u.id == ActionId(2)));
    }
}
