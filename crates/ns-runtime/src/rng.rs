/// Seeded generator behind the `Random` built-in, so replays of a scenario
/// draw the same numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScriptRng {
    state: u32,
}

impl ScriptRng {
    pub(crate) fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    #[cfg(test)]
    pub(crate) fn next_u32(&mut self) -> u32 {
        next_random_u32(&mut self.state)
    }

    /// Uniform value in `0..bound`; a zero bound yields zero.
    pub(crate) fn below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        next_random_bounded_with(&mut self.state, bound, next_random_u32)
    }
}

fn next_random_u32(state: &mut u32) -> u32 {
    let mut next = state.wrapping_add(0x6d2b79f5);
    *state = next;
    next = (next ^ (next >> 15)).wrapping_mul(next | 1);
    next ^= next.wrapping_add((next ^ (next >> 7)).wrapping_mul(next | 61));
    next ^ (next >> 14)
}

fn next_random_bounded_with<F>(state: &mut u32, bound: u32, mut next: F) -> u32
where
    F: FnMut(&mut u32) -> u32,
{
    let threshold = (u64::from(u32::MAX) + 1) / u64::from(bound) * u64::from(bound);
    let mut candidate = next(state);
    while u64::from(candidate) >= threshold {
        candidate = next(state);
    }
    candidate % bound
}

#[cfg(test)]
mod rng_tests {
    use super::*;

    #[test]
    fn bounded_draw_retries_above_threshold() {
        let mut state = 0u32;
        let mut values = vec![u32::MAX, 42u32].into_iter();
        let result = next_random_bounded_with(&mut state, 10, |_s| {
            values.next().expect("test values should be available")
        });
        assert_eq!(result, 2);
    }

    #[test]
    fn same_seed_gives_same_sequence() {
        let mut first = ScriptRng::new(7);
        let mut second = ScriptRng::new(7);
        let a: Vec<u32> = (0..8).map(|_| first.below(100)).collect();
        let b: Vec<u32> = (0..8).map(|_| second.below(100)).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|value| *value < 100));
        assert_ne!(ScriptRng::new(7).next_u32(), ScriptRng::new(8).next_u32());
    }

    #[test]
    fn zero_bound_is_zero() {
        assert_eq!(ScriptRng::new(1).below(0), 0);
    }
}
