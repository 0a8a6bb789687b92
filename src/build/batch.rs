//! Bounded-parallelism task batching.
//!
//! [`batch`] runs a task per input on a dedicated rayon pool, keeping at most
//! `limit` tasks in flight, and yields `(input_index, output)` pairs in
//! completion order. Tasks are started lazily as earlier ones finish.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::iter::Enumerate;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

type TaskFn<In, Out> = Arc<dyn Fn(In) -> Out + Send + Sync>;
type Completion<Out> = (usize, thread::Result<Out>);

pub struct Batch<I, Out>
where
    I: Iterator,
{
    pending: Enumerate<I>,
    task: TaskFn<I::Item, Out>,
    pool: rayon::ThreadPool,
    limit: usize,
    /// Ids (input indices) of tasks started but not yet yielded.
    in_flight: HashSet<usize>,
    tx: Sender<Completion<Out>>,
    rx: Receiver<Completion<Out>>,
}

/// Creates a lazy batch over `inputs`. A `limit` of zero is treated as one.
pub fn batch<I, F, Out>(limit: usize, inputs: I, task: F) -> Result<Batch<I::IntoIter, Out>>
where
    I: IntoIterator,
    I::Item: Send + 'static,
    F: Fn(I::Item) -> Out + Send + Sync + 'static,
    Out: Send + 'static,
{
    let limit = limit.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(limit)
        .thread_name(|i| format!("kiln-worker-{}", i))
        .build()
        .context("Failed to start worker pool")?;
    let (tx, rx) = channel();

    Ok(Batch {
        pending: inputs.into_iter().enumerate(),
        task: Arc::new(task),
        pool,
        limit,
        in_flight: HashSet::new(),
        tx,
        rx,
    })
}

impl<I, Out> Batch<I, Out>
where
    I: Iterator,
    I::Item: Send + 'static,
    Out: Send + 'static,
{
    /// Number of tasks started but not yet yielded.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn launch(&mut self, id: usize, item: I::Item) {
        let task = Arc::clone(&self.task);
        let tx = self.tx.clone();
        self.in_flight.insert(id);
        self.pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| task(item)));
            // The receiver only disappears when the batch is dropped mid-way.
            let _ = tx.send((id, result));
        });
    }
}

impl<I, Out> Iterator for Batch<I, Out>
where
    I: Iterator,
    I::Item: Send + 'static,
    Out: Send + 'static,
{
    type Item = (usize, Out);

    fn next(&mut self) -> Option<Self::Item> {
        while self.in_flight.len() < self.limit {
            match self.pending.next() {
                Some((id, item)) => self.launch(id, item),
                None => break,
            }
        }
        if self.in_flight.is_empty() {
            return None;
        }

        // We hold a sender, so recv only fails if every worker vanished.
        let (id, result) = self.rx.recv().ok()?;
        self.in_flight.remove(&id);
        match result {
            Ok(out) => Some((id, out)),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.pending.size_hint();
        let running = self.in_flight.len();
        (lower + running, upper.map(|u| u + running))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_yields_every_result_exactly_once() {
        for limit in [1, 2, 3, 8, 64] {
            let inputs: Vec<u64> = (0..20).collect();
            let mut seen: Vec<(usize, u64)> = batch(limit, inputs, |x| {
                thread::sleep(Duration::from_millis((x * 7) % 5));
                x * 10
            })
            .unwrap()
            .collect();

            assert_eq!(seen.len(), 20, "limit {}", limit);
            seen.sort();
            for (i, (id, out)) in seen.into_iter().enumerate() {
                assert_eq!(id, i);
                assert_eq!(out, i as u64 * 10);
            }
        }
    }

    #[test]
    fn test_never_exceeds_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));

        let count = batch(3, 0..24, move |_| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            r.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap()
        .count();

        assert_eq!(count, 24);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_results_arrive_in_completion_order() {
        // First input is slowest, so it cannot be yielded first.
        let order: Vec<usize> = batch(3, vec![60u64, 1, 1], |ms| {
            thread::sleep(Duration::from_millis(ms));
        })
        .unwrap()
        .map(|(id, _)| id)
        .collect();

        assert_eq!(order.len(), 3);
        assert_eq!(*order.last().unwrap(), 0);
    }

    #[test]
    fn test_each_task_starts_once_and_lazily() {
        let started = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&started);
        let mut tasks = batch(2, 0..10, move |x| {
            s.fetch_add(1, Ordering::SeqCst);
            x
        })
        .unwrap();

        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert!(tasks.next().is_some());
        assert!(tasks.in_flight() <= 1);
        assert!(started.load(Ordering::SeqCst) <= 2);

        let rest = tasks.count();
        assert_eq!(rest, 9);
        assert_eq!(started.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_failures_are_yielded_not_fatal() {
        let results: Vec<(usize, Result<u32, String>)> = batch(2, 0..6u32, |x| {
            if x % 2 == 0 { Err(format!("unit {} failed", x)) } else { Ok(x) }
        })
        .unwrap()
        .collect();

        assert_eq!(results.len(), 6);
        assert_eq!(results.iter().filter(|(_, r)| r.is_err()).count(), 3);
    }

    #[test]
    fn test_empty_input_and_zero_limit() {
        assert_eq!(batch(4, Vec::<u8>::new(), |x| x).unwrap().count(), 0);
        assert_eq!(batch(0, vec![1, 2, 3], |x| x).unwrap().count(), 3);
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_task_panic_reaches_caller() {
        let _ = batch(2, 0..3, |x| {
            if x == 1 {
                panic!("boom");
            }
            x
        })
        .unwrap()
        .count();
    }
}
