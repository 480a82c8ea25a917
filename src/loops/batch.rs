//! Batched loop engine - up to N lanes in flight behind a shared gate.
//!
//! A lane is a do-while loop over the shared generator, pushing into the
//! shared accumulator. The gate wraps the user condition: the first false
//! evaluation latches it shut for the rest of the run, so no lane starts
//! another invocation even if its own last result would have passed the
//! condition. Invocations already in flight run to completion and their
//! results still land in the accumulator.
//!
//! Lanes are joined as plain futures inside the calling task, never spawned,
//! so they interleave only at await points. When a condition reads state
//! mutated by the generator (clocks, queues), the number of lanes that
//! actually start can vary between runs; that is inherent to the gate being
//! rechecked mid-spawn, not a bug.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::try_join_all;

/// Shared termination gate around the user condition.
///
/// `open` latches false on the first failed check; after that the user
/// condition is never consulted again.
struct Gate<C> {
    open: AtomicBool,
    cond: Mutex<C>,
}

impl<C> Gate<C> {
    fn new(cond: C) -> Self {
        Self {
            open: AtomicBool::new(true),
            cond: Mutex::new(cond),
        }
    }

    fn check<T>(&self, last: Option<&T>) -> bool
    where
        C: FnMut(Option<&T>) -> bool,
    {
        if !self.open.load(Ordering::SeqCst) {
            return false;
        }
        let passed = {
            let mut cond = self.cond.lock().unwrap_or_else(|e| e.into_inner());
            cond(last)
        };
        if !passed {
            self.open.store(false, Ordering::SeqCst);
        }
        passed
    }
}

/// Run a batched do-while loop with up to `size` concurrent invocations.
///
/// The first lane starts unconditionally (do-while semantics); before each
/// further lane the gate is rechecked with `None`, so a condition that is
/// already false can cut the burst short of `size` lanes. Each lane's first
/// generator call is made while the lanes are being constructed, before
/// anything is awaited, so generator-owned state (such as a traversal
/// cursor) advances during the spawn burst.
///
/// A `size` of zero is clamped to one. The first lane failure resolves the
/// whole loop to that error; the remaining lane futures are dropped, which
/// cancels invocations that have not yet completed.
pub async fn do_while_batch<T, E, C, G, Fut>(
    size: usize,
    cond: C,
    generator: G,
    acc: Vec<T>,
) -> Result<Vec<T>, E>
where
    C: FnMut(Option<&T>) -> bool,
    G: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let size = clamp_batch_size(size);
    let gate = Gate::new(cond);
    let generator = Mutex::new(generator);
    let acc = Mutex::new(acc);

    let mut lanes = Vec::with_capacity(size);
    let mut slots = size;
    loop {
        let first = next_invocation(&generator);
        lanes.push(lane(lanes.len(), first, &gate, &generator, &acc));
        slots -= 1;
        if slots == 0 || !gate.check(None) {
            break;
        }
    }

    log::trace!("do_while_batch: {} of {} lanes started", lanes.len(), size);
    try_join_all(lanes).await?;
    Ok(acc.into_inner().unwrap_or_else(|e| e.into_inner()))
}

/// Run a batched while loop with up to `size` concurrent invocations.
///
/// The gate is checked before every lane start, including the first; the
/// first check sees the seed (`None` when absent), later checks see `None`.
/// If the first check fails, no lane starts and the accumulator is returned
/// as passed in. Everything else matches [`do_while_batch`].
pub async fn while_batch<T, E, C, G, Fut>(
    size: usize,
    cond: C,
    generator: G,
    acc: Vec<T>,
    seed: Option<T>,
) -> Result<Vec<T>, E>
where
    C: FnMut(Option<&T>) -> bool,
    G: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let size = clamp_batch_size(size);
    let gate = Gate::new(cond);
    let generator = Mutex::new(generator);
    let acc = Mutex::new(acc);

    let mut lanes = Vec::with_capacity(size);
    let mut last = seed.as_ref();
    for _ in 0..size {
        if !gate.check(last) {
            break;
        }
        last = None;
        let first = next_invocation(&generator);
        lanes.push(lane(lanes.len(), first, &gate, &generator, &acc));
    }

    log::trace!("while_batch: {} of {} lanes started", lanes.len(), size);
    try_join_all(lanes).await?;
    Ok(acc.into_inner().unwrap_or_else(|e| e.into_inner()))
}

/// One lane: await the pending invocation, append, consult the gate, repeat.
///
/// `first` is created by the caller so the generator call order matches the
/// spawn order across lanes.
async fn lane<T, E, C, G, Fut>(
    index: usize,
    first: Fut,
    gate: &Gate<C>,
    generator: &Mutex<G>,
    acc: &Mutex<Vec<T>>,
) -> Result<(), E>
where
    C: FnMut(Option<&T>) -> bool,
    G: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut pending = first;
    loop {
        let item = pending.await?;
        let keep = {
            let mut results = acc.lock().unwrap_or_else(|e| e.into_inner());
            results.push(item);
            // The gate sees the result this lane just appended. No await
            // between the append and the check, so lanes cannot interleave
            // here.
            gate.check(results.last())
        };
        if !keep {
            log::trace!("lane {index}: gate closed, retiring");
            return Ok(());
        }
        pending = next_invocation(generator);
    }
}

fn next_invocation<G, Fut>(generator: &Mutex<G>) -> Fut
where
    G: FnMut() -> Fut,
{
    let mut generator = generator.lock().unwrap_or_else(|e| e.into_inner());
    generator()
}

fn clamp_batch_size(size: usize) -> usize {
    if size == 0 {
        log::warn!("batch size 0 clamped to 1");
        1
    } else {
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Generator whose nth call resolves to n after a short delay, with the
    /// call counter shared so conditions can depend on it.
    fn counting_gen(
        delay_ms: u64,
    ) -> (
        impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<usize, String>>>>,
        Arc<AtomicUsize>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let generator = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                sleep(Duration::from_millis(delay_ms)).await;
                Ok(n)
            }) as std::pin::Pin<Box<dyn Future<Output = Result<usize, String>>>>
        };
        (generator, calls)
    }

    #[tokio::test]
    async fn test_do_while_batch_matches_unbatched_invocation_count() {
        let (generator, calls) = counting_gen(2);
        let cond_calls = calls.clone();
        let mut results = do_while_batch(4, move |_| cond_calls.load(Ordering::SeqCst) < 10, generator, Vec::new())
            .await
            .unwrap();
        // Completion order across lanes is not guaranteed; the set of
        // results and the total invocation count are.
        results.sort_unstable();
        assert_eq!(results, (0..10).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_while_batch_false_on_seed_starts_zero_lanes() {
        let (generator, calls) = counting_gen(1);
        let results = while_batch(4, |_| false, generator, vec![7usize], None)
            .await
            .unwrap();
        assert_eq!(results, vec![7]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_while_batch_first_check_sees_seed() {
        // Stop on odd results; the even seed lets the first lane start.
        // Strictly increasing delays fix the completion order to call
        // order: item 0 (even, continue), then item 1 (odd, latch).
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let generator = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                sleep(Duration::from_millis((n as u64 + 1) * 5)).await;
                Ok(n)
            }) as std::pin::Pin<Box<dyn Future<Output = Result<usize, String>>>>
        };

        let results = while_batch(
            3,
            |r| r.is_none_or(|&v| v % 2 == 0),
            generator,
            Vec::new(),
            Some(2),
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn test_while_batch_odd_seed_rejected() {
        let (generator, calls) = counting_gen(1);
        let results = while_batch(
            3,
            |r| r.is_some_and(|&v| v % 2 == 0),
            generator,
            Vec::new(),
            Some(3),
        )
        .await
        .unwrap();
        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_batch_size_clamped_to_one() {
        let (generator, calls) = counting_gen(1);
        let results = do_while_batch(0, |_| false, generator, Vec::new()).await.unwrap();
        assert_eq!(results, vec![0]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gate_latches_even_if_condition_recovers() {
        // Condition is false only on its second evaluation, true before and
        // after. Once latched, the gate must stay shut and the condition
        // must never be consulted again.
        let cond_calls = Arc::new(AtomicUsize::new(0));
        let cond_counter = cond_calls.clone();
        let (generator, gen_calls) = counting_gen(1);

        let results = do_while_batch(
            3,
            move |_| cond_counter.fetch_add(1, Ordering::SeqCst) + 1 != 2,
            generator,
            Vec::new(),
        )
        .await
        .unwrap();

        // Spawn burst: lane 0 (unconditional), cond #1 true, lane 1,
        // cond #2 false -> latched. Both in-flight invocations complete.
        assert_eq!(results.len(), 2);
        assert_eq!(gen_calls.load(Ordering::SeqCst), 2);
        assert_eq!(cond_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_spawn_burst_stops_at_condition_not_size() {
        let (generator, calls) = counting_gen(1);
        let cond_calls = calls.clone();
        let results = do_while_batch(8, move |_| cond_calls.load(Ordering::SeqCst) < 3, generator, Vec::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_lane_failure_rejects_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let generator = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n == 1 {
                    sleep(Duration::from_millis(5)).await;
                    Err("lane failure".to_string())
                } else {
                    sleep(Duration::from_millis(50)).await;
                    Ok(n)
                }
            }) as std::pin::Pin<Box<dyn Future<Output = Result<usize, String>>>>
        };

        let result = do_while_batch(3, |_| true, generator, Vec::new()).await;
        assert_eq!(result, Err("lane failure".to_string()));
    }

    #[tokio::test]
    async fn test_batched_results_shared_accumulator() {
        // Staggered delays: later invocations finish first, so arrival order
        // differs from call order while the contents stay complete.
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let generator = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                sleep(Duration::from_millis(20u64.saturating_sub(n as u64 * 5))).await;
                Ok(n)
            }) as std::pin::Pin<Box<dyn Future<Output = Result<usize, String>>>>
        };
        let cond_calls = calls.clone();

        let mut results = while_batch(
            4,
            move |_| cond_calls.load(Ordering::SeqCst) < 4,
            generator,
            Vec::new(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 4);
        results.sort_unstable();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }
}
