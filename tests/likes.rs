use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde_json::json;
use tokio::time::timeout;

use kudos::likes::{CooldownStatus, LikeCounter, LikeOutcome, Subscription, COOLDOWN};
use kudos::model::{StoredCount, VisitorId, VisitorLike};
use kudos::store::{LikeStore, MemoryStore};
use kudos::time::ManualClock;

fn counter_with(store: MemoryStore) -> (LikeCounter<MemoryStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_millis(0));
    let counter = LikeCounter::with_clock(store, clock.clone());
    (counter, clock)
}

fn counter() -> (LikeCounter<MemoryStore>, Arc<ManualClock>) {
    counter_with(MemoryStore::new())
}

fn visitor(name: &str) -> VisitorId {
    name.parse().unwrap()
}

async fn stored_count(counter: &LikeCounter<MemoryStore>) -> StoredCount {
    counter.store().count().await.unwrap()
}

async fn next(subscription: &mut Subscription) -> Option<u64> {
    timeout(StdDuration::from_secs(5), subscription.next())
        .await
        .expect("the subscription should yield within 5 seconds")
}

#[tokio::test]
async fn first_like_is_accepted() {
    let (counter, clock) = counter();
    clock.set_millis(42_000);
    let alice = visitor("alice");

    let outcome = counter.attempt_like(&alice).await.unwrap();

    assert_eq!(outcome, LikeOutcome::Accepted { count: 1 });
    assert_eq!(stored_count(&counter).await, StoredCount::Count(1));
    assert_eq!(
        counter.store().visitor(&alice).await.unwrap(),
        Some(VisitorLike::new(42_000)),
        "the claim should record the time of the like"
    );
}

#[tokio::test]
async fn repeat_like_within_cooldown_is_rejected() {
    let (counter, clock) = counter();
    let alice = visitor("alice");

    counter.attempt_like(&alice).await.unwrap();
    clock.advance(Duration::seconds(10));

    let outcome = counter.attempt_like(&alice).await.unwrap();

    let LikeOutcome::Rejected { cooldown } = outcome else {
        panic!("expected the second like to be rejected, got {outcome:?}");
    };
    assert_eq!(cooldown.remaining_ms(), Some(290_000));
    assert_eq!(
        stored_count(&counter).await,
        StoredCount::Count(1),
        "a rejected like must not touch the count"
    );
    assert_eq!(
        counter.store().visitor(&alice).await.unwrap(),
        Some(VisitorLike::new(0)),
        "a rejected like must not move the cooldown"
    );
}

#[tokio::test]
async fn like_after_cooldown_is_accepted() {
    let (counter, clock) = counter();
    let alice = visitor("alice");

    counter.attempt_like(&alice).await.unwrap();
    clock.advance(COOLDOWN);

    let outcome = counter.attempt_like(&alice).await.unwrap();
    assert_eq!(outcome, LikeOutcome::Accepted { count: 2 });
}

#[tokio::test]
async fn cooldown_scenario() {
    let (counter, clock) = counter();
    let alice = visitor("alice");

    let outcome = counter.attempt_like(&alice).await.unwrap();
    assert_eq!(outcome, LikeOutcome::Accepted { count: 1 });

    clock.set_millis(100_000);
    let outcome = counter.attempt_like(&alice).await.unwrap();
    assert_eq!(
        outcome,
        LikeOutcome::Rejected {
            cooldown: CooldownStatus {
                remaining: Some(Duration::milliseconds(200_000))
            }
        }
    );
    assert_eq!(stored_count(&counter).await, StoredCount::Count(1));

    clock.set_millis(300_001);
    let outcome = counter.attempt_like(&alice).await.unwrap();
    assert_eq!(outcome, LikeOutcome::Accepted { count: 2 });
}

#[tokio::test]
async fn cooldown_status_follows_the_clock() {
    let (counter, clock) = counter();
    let alice = visitor("alice");

    let status = counter.cooldown_status(&alice).await.unwrap();
    assert_eq!(status, CooldownStatus::UNLOCKED, "unknown visitors are unlocked");

    counter.attempt_like(&alice).await.unwrap();
    clock.advance(Duration::seconds(100));

    let status = counter.cooldown_status(&alice).await.unwrap();
    assert!(status.locked());
    assert_eq!(status.countdown().as_deref(), Some("3:20"));

    clock.advance(Duration::seconds(200));
    let status = counter.cooldown_status(&alice).await.unwrap();
    assert!(!status.locked());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_likes_from_distinct_visitors_all_count() {
    let (counter, _clock) = counter();

    let tasks: Vec<_> = (0..32)
        .map(|n| {
            let counter = counter.clone();
            tokio::spawn(async move { counter.attempt_like(&visitor(&format!("visitor-{n}"))).await })
        })
        .collect();

    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, LikeOutcome::Accepted { .. }));
    }

    assert_eq!(stored_count(&counter).await, StoredCount::Count(32));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_visitors_racing_both_count() {
    let (counter, _clock) = counter();
    let (alice, bob) = (visitor("alice"), visitor("bob"));

    let (first, second) = tokio::join!(counter.attempt_like(&alice), counter.attempt_like(&bob));

    assert!(matches!(first.unwrap(), LikeOutcome::Accepted { .. }));
    assert!(matches!(second.unwrap(), LikeOutcome::Accepted { .. }));
    assert_eq!(stored_count(&counter).await, StoredCount::Count(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_likes_from_one_visitor_count_once() {
    let (counter, _clock) = counter();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let counter = counter.clone();
            tokio::spawn(async move { counter.attempt_like(&visitor("alice")).await })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        if let LikeOutcome::Accepted { .. } = task.await.unwrap().unwrap() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1, "only one of the racing likes may pass the cooldown");
    assert_eq!(stored_count(&counter).await, StoredCount::Count(1));
}

#[tokio::test]
async fn subscription_starts_with_the_current_count() {
    let (counter, _clock) = counter_with(MemoryStore::with_raw_count(Some(json!(12))));

    let mut subscription = counter.subscribe().await.unwrap();

    assert_eq!(subscription.current(), 12);
    assert_eq!(next(&mut subscription).await, Some(12));
}

#[tokio::test]
async fn subscription_follows_likes_from_anyone() {
    let (counter, _clock) = counter();
    let mut subscription = counter.subscribe().await.unwrap();
    assert_eq!(next(&mut subscription).await, Some(0));

    counter.attempt_like(&visitor("alice")).await.unwrap();
    assert_eq!(next(&mut subscription).await, Some(1));

    counter.attempt_like(&visitor("bob")).await.unwrap();
    assert_eq!(next(&mut subscription).await, Some(2));
}

#[tokio::test]
async fn missing_count_is_initialized_to_zero() {
    let (counter, _clock) = counter();

    let mut subscription = counter.subscribe().await.unwrap();

    assert_eq!(next(&mut subscription).await, Some(0));
    assert_eq!(counter.store().raw_count(), Some(json!(0)));
}

#[tokio::test]
async fn malformed_count_is_corrected_to_zero() {
    let (counter, _clock) = counter_with(MemoryStore::with_raw_count(Some(json!("lots"))));

    let mut subscription = counter.subscribe().await.unwrap();

    assert_eq!(next(&mut subscription).await, Some(0));
    assert_eq!(counter.store().raw_count(), Some(json!(0)));
}

#[tokio::test]
async fn count_corrupted_while_subscribed_is_corrected() {
    let (counter, _clock) = counter_with(MemoryStore::with_raw_count(Some(json!(3))));
    let mut subscription = counter.subscribe().await.unwrap();
    assert_eq!(next(&mut subscription).await, Some(3));

    counter.store().overwrite_count(Some(json!({ "count": 3 })));

    assert_eq!(next(&mut subscription).await, Some(0));
    assert_eq!(counter.store().raw_count(), Some(json!(0)));
}

#[tokio::test]
async fn one_shot_count_normalizes() {
    let (counter, _clock) = counter_with(MemoryStore::with_raw_count(Some(json!(-4))));

    assert_eq!(counter.count().await.unwrap(), 0);
    assert_eq!(counter.store().raw_count(), Some(json!(0)));

    counter.attempt_like(&visitor("alice")).await.unwrap();
    assert_eq!(counter.count().await.unwrap(), 1);
}

#[tokio::test]
async fn unsubscribe_stops_following() {
    let (counter, _clock) = counter();
    let subscription = counter.subscribe().await.unwrap();
    assert!(!subscription.is_finished());

    timeout(StdDuration::from_secs(5), subscription.unsubscribe())
        .await
        .expect("unsubscribing should not hang");

    counter.attempt_like(&visitor("alice")).await.unwrap();
    assert_eq!(stored_count(&counter).await, StoredCount::Count(1));
}
