//! Sequential loop engine - one generator invocation in flight at a time.
//!
//! Results accumulate in call order. Failures propagate immediately: a
//! generator future that resolves to `Err` ends the loop without appending
//! anything for that call.

use std::future::Future;

/// Run a do-while loop over an async generator.
///
/// The generator is invoked unconditionally once, then repeatedly for as
/// long as the condition holds on the most recent result. The condition
/// receives `Some(&last)`; it never sees `None` here because the first
/// invocation happens before the first check.
///
/// Termination is entirely the condition's responsibility: a condition that
/// never returns false loops forever.
pub async fn do_while<T, E, C, G, Fut>(mut cond: C, mut generator: G, mut acc: Vec<T>) -> Result<Vec<T>, E>
where
    C: FnMut(Option<&T>) -> bool,
    G: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        let item = generator().await?;
        acc.push(item);
        if !cond(acc.last()) {
            return Ok(acc);
        }
    }
}

/// Run a while loop over an async generator.
///
/// The condition is checked first against the seed (`None` when no seed is
/// given); if it fails, the generator is never invoked and the accumulator
/// is returned as passed in. Otherwise this behaves exactly like
/// [`do_while`].
pub async fn while_loop<T, E, C, G, Fut>(
    mut cond: C,
    generator: G,
    acc: Vec<T>,
    seed: Option<T>,
) -> Result<Vec<T>, E>
where
    C: FnMut(Option<&T>) -> bool,
    G: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if !cond(seed.as_ref()) {
        return Ok(acc);
    }
    do_while(cond, generator, acc).await
}
