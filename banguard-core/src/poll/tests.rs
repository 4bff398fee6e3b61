use super::*;
use crate::clock::ManualClock;
use std::cell::Cell;

#[tokio::test]
async fn ready_on_third_try() {
    let clock = ManualClock::default();
    let cancel = CancelFlag::new();
    let calls = Cell::new(0);
    let poller = Poller::new(Duration::from_secs(2), 15);

    let outcome = poller
        .until(&clock, &cancel, || {
            calls.set(calls.get() + 1);
            let ready = calls.get() == 3;
            async move { ready }
        })
        .await;

    assert_eq!(
        outcome,
        PollOutcome::Ready {
            tries: 3,
            elapsed: Duration::from_secs(6)
        }
    );
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 3]);
}

#[tokio::test]
async fn exhausts_exact_budget() {
    let clock = ManualClock::default();
    let cancel = CancelFlag::new();
    let poller = Poller::new(Duration::from_secs(2), 15);

    let outcome = poller.until(&clock, &cancel, || async { false }).await;

    assert_eq!(outcome, PollOutcome::Exhausted { tries: 15 });
    assert_eq!(clock.total_slept(), poller.budget());
    assert_eq!(poller.budget(), Duration::from_secs(30));
}

#[tokio::test]
async fn single_check_after_delay() {
    let clock = ManualClock::default();
    let cancel = CancelFlag::new();
    let poller = Poller::new(Duration::from_secs(3), 1);

    let outcome = poller.until(&clock, &cancel, || async { false }).await;

    assert_eq!(outcome.tries(), 1);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(3)]);
}

#[tokio::test]
async fn cancellation_stops_polling() {
    let clock = ManualClock::default();
    let cancel = CancelFlag::new();
    let calls = Cell::new(0);
    let poller = Poller::new(Duration::from_secs(2), 15);

    let outcome = poller
        .until(&clock, &cancel, || {
            calls.set(calls.get() + 1);
            if calls.get() == 2 {
                cancel.cancel();
            }
            async { false }
        })
        .await;

    assert_eq!(outcome, PollOutcome::Cancelled { tries: 2 });
    assert!(!outcome.is_ready());
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn cancel_flag_is_shared_between_clones() {
    let cancel = CancelFlag::new();
    let handle = cancel.clone();
    assert!(!cancel.is_cancelled());
    handle.cancel();
    assert!(cancel.is_cancelled());
    cancel.cancelled().await;
}
