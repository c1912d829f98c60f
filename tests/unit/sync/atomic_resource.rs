use super::*;
use std::sync::Arc as StdArc;
use std::sync::Mutex as StdMutex;

#[tokio::test]
async fn acquire_is_exclusive_and_release_frees() {
    let r = AtomicResource::new(5_u32);
    let mut lease = r.acquire().await.expect("acquire");
    assert!(r.is_held());
    assert!(r.try_acquire().is_none());
    *lease += 1;
    r.release(lease).expect("release");
    assert!(!r.is_held());

    let lease = r.try_acquire().expect("free again");
    assert_eq!(*lease, 6);
    r.release(lease).expect("release");
}

#[tokio::test]
async fn waiters_resume_in_fifo_order() {
    let r = AtomicResource::new(Vec::<&'static str>::new());
    let order = StdArc::new(StdMutex::new(Vec::new()));
    let first = r.acquire().await.expect("first");

    let mut handles = Vec::new();
    for name in ["a", "b"] {
        let r2 = r.clone();
        let order = StdArc::clone(&order);
        handles.push(tokio::spawn(async move {
            let mut lease = r2.acquire().await.expect("queued acquire");
            lease.push(name);
            order.lock().expect("order").push(name);
            r2.release(lease).expect("release");
        }));
        // Make sure each waiter is queued before the next one.
        while r.waiters() == 0 || (name == "b" && r.waiters() < 2) {
            tokio::task::yield_now().await;
        }
    }
    assert_eq!(r.waiters(), 2);

    r.release(first).expect("release first");
    for h in handles {
        h.await.expect("join");
    }
    assert_eq!(*order.lock().expect("order"), vec!["a", "b"]);
    let lease = r.try_acquire().expect("idle");
    assert_eq!(*lease, vec!["a", "b"]);
}

#[tokio::test]
async fn releasing_a_foreign_lease_fails_loudly() {
    let a = AtomicResource::new(1);
    let b = AtomicResource::new(2);
    let lease = b.acquire().await.expect("b");
    assert_ne!(lease.resource_id(), a.acquire().await.expect("a").resource_id());
    let err = a.release(lease).expect_err("foreign release");
    assert!(matches!(err, EaselError::Invariant(_)));
    // The foreign lease went home to `b`.
    assert!(!b.is_held());
    assert!(!a.is_held());
}

#[tokio::test]
async fn dropped_lease_hands_value_on() {
    let r = AtomicResource::new(0);
    {
        let _lease = r.acquire().await.expect("acquire");
        assert!(r.is_held());
    }
    assert!(!r.is_held());
}

#[tokio::test(flavor = "current_thread")]
async fn cancelled_waiter_does_not_wedge_the_queue() {
    let r = AtomicResource::new(0_u8);
    let held = r.acquire().await.expect("held");

    let r2 = r.clone();
    let abandoned = tokio::spawn(async move {
        let _ = r2.acquire().await;
    });
    while r.waiters() == 0 {
        tokio::task::yield_now().await;
    }
    abandoned.abort();
    let _ = abandoned.await;

    r.release(held).expect("release");
    let next = tokio::time::timeout(std::time::Duration::from_secs(1), r.acquire())
        .await
        .expect("not wedged")
        .expect("acquire");
    r.release(next).expect("release");
}
