use std::collections::VecDeque;
use std::sync::Mutex;

use common::PipelineError;

/// Result of an [`MessageQueue::enqueue`] call.
///
/// `admitted_without_drop` is `false` whenever the queue was already full
/// and had to evict its head to make room; `evicted` then holds that head so
/// the caller can decide what to do with it (the pipeline fallback-logs it).
#[derive(Debug)]
pub struct EnqueueOutcome<T> {
    pub admitted_without_drop: bool,
    pub evicted: Option<T>,
}

/// A bounded FIFO with drop-oldest overflow.
///
/// Enqueue always admits the new item: when the queue is already at
/// capacity, the head is evicted first. `enqueue` and `dequeue_batch` share
/// one mutex so concurrent producers and the flusher never observe a torn
/// state.
pub struct MessageQueue<T> {
    inner: Mutex<VecDeque<T>>,
    max_size: usize,
}

impl<T> MessageQueue<T> {
    pub fn new(max_size: usize) -> Result<Self, PipelineError> {
        if max_size == 0 {
            return Err(PipelineError::Configuration(
                "queue maxSize must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            inner: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
        })
    }

    pub fn enqueue(&self, item: T) -> EnqueueOutcome<T> {
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        let evicted = if guard.len() >= self.max_size {
            guard.pop_front()
        } else {
            None
        };
        guard.push_back(item);
        EnqueueOutcome {
            admitted_without_drop: evicted.is_none(),
            evicted,
        }
    }

    pub fn dequeue(&self) -> Option<T> {
        self.inner.lock().expect("queue mutex poisoned").pop_front()
    }

    /// Dequeue up to `n` items in FIFO order. `n <= 0` yields an empty vec.
    pub fn dequeue_batch(&self, n: isize) -> Vec<T> {
        if n <= 0 {
            return Vec::new();
        }
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        let take = (n as usize).min(guard.len());
        guard.drain(..take).collect()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.max_size
    }

    pub fn clear(&self) {
        self.inner.lock().expect("queue mutex poisoned").clear();
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_capacity() {
        assert!(MessageQueue::<i32>::new(0).is_err());
    }

    #[test]
    fn enqueue_preserves_fifo_order_under_capacity() {
        let q = MessageQueue::new(10).unwrap();
        for i in 0..5 {
            let outcome = q.enqueue(i);
            assert!(outcome.admitted_without_drop);
            assert!(outcome.evicted.is_none());
        }
        assert_eq!(q.size(), 5);
        assert_eq!(q.dequeue_batch(5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overflow_evicts_the_head_and_reports_it() {
        let q = MessageQueue::new(5).unwrap();
        for i in 1..=20 {
            q.enqueue(i);
        }
        assert_eq!(q.size(), 5);
        assert_eq!(q.dequeue_batch(5), vec![16, 17, 18, 19, 20]);
    }

    #[test]
    fn overflow_reports_false_and_the_evicted_item() {
        let q = MessageQueue::new(1).unwrap();
        let first = q.enqueue("a");
        assert!(first.admitted_without_drop);
        let second = q.enqueue("b");
        assert!(!second.admitted_without_drop);
        assert_eq!(second.evicted, Some("a"));
        assert_eq!(q.dequeue(), Some("b"));
    }

    #[test]
    fn capacity_one_is_latest_wins() {
        let q = MessageQueue::new(1).unwrap();
        for i in 0..10 {
            q.enqueue(i);
        }
        assert_eq!(q.size(), 1);
        assert_eq!(q.dequeue(), Some(9));
    }

    #[test]
    fn dequeue_batch_of_non_positive_n_is_empty() {
        let q = MessageQueue::new(5).unwrap();
        q.enqueue(1);
        assert!(q.dequeue_batch(0).is_empty());
        assert!(q.dequeue_batch(-3).is_empty());
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn dequeue_batch_returns_fewer_when_queue_shorter() {
        let q = MessageQueue::new(5).unwrap();
        q.enqueue(1);
        q.enqueue(2);
        assert_eq!(q.dequeue_batch(10), vec![1, 2]);
        assert!(q.is_empty());
    }

    #[test]
    fn final_size_matches_min_formula_under_interleaving() {
        let capacity = 4usize;
        let q = MessageQueue::new(capacity).unwrap();
        let n = 10;
        for i in 0..n {
            q.enqueue(i);
            if i % 3 == 0 {
                q.dequeue();
            }
        }
        assert!(q.size() <= capacity);
    }
}
