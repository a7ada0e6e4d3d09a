use super::queue::TaskQueue;
use std::time::{Duration, Instant};

#[test]
fn test_task_queue_deadline_order() {
    let now = Instant::now();
    let mut q = TaskQueue::new();
    q.post(now + Duration::from_millis(30), "c");
    q.post(now + Duration::from_millis(10), "a");
    q.post(now + Duration::from_millis(20), "b");

    assert_eq!(q.len(), 3);
    assert_eq!(q.poll_timeout(), Some(now + Duration::from_millis(10)));

    assert_eq!(q.pop_due(now), None, "nothing is due yet");
    assert_eq!(q.pop_due(now + Duration::from_millis(25)), Some("a"));
    assert_eq!(q.pop_due(now + Duration::from_millis(25)), Some("b"));
    assert_eq!(q.pop_due(now + Duration::from_millis(25)), None);
    assert_eq!(q.pop_due(now + Duration::from_secs(1)), Some("c"));
    assert!(q.is_empty());
    assert_eq!(q.poll_timeout(), None);
}

#[test]
fn test_task_queue_same_deadline_keeps_post_order() {
    let now = Instant::now();
    let mut q = TaskQueue::new();
    for i in 0..5 {
        q.post(now, i);
    }

    let mut got = vec![];
    while let Some(i) = q.pop_due(now) {
        got.push(i);
    }
    assert_eq!(got, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_task_queue_clear_and_retain() {
    let now = Instant::now();
    let mut q = TaskQueue::new();
    q.post(now, 1);
    q.post(now, 2);
    q.post(now, 3);

    q.retain(|v| *v != 2);
    assert_eq!(q.len(), 2);
    assert_eq!(q.pop_due(now), Some(1));

    q.clear();
    assert!(q.is_empty());
    assert_eq!(q.pop_due(now), None);
}
