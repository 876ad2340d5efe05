//! Page-replacement victim selection (`spec.md` §4.3 "Page-replacement
//! policies").

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ReplacementPolicy;

use super::core_map::CoreMap;

/// Picks eviction victims among frames the [`CoreMap`] currently has
/// bound, according to a configured policy.
pub enum Replacer {
    /// Monotonic counter modulo frame count; wraps without resetting
    /// anything (the counter alone defines the order).
    Fifo { next: spin::Mutex<usize> },
    /// Delegates directly to [`CoreMap::least_recently_used`].
    Lru,
    /// Uniform choice among bound frames, seeded for reproducibility
    /// (`spec.md` §6 "`-rs <n>` random seed").
    Random { rng: spin::Mutex<StdRng> },
}

impl Replacer {
    pub fn new(policy: ReplacementPolicy, random_seed: u64) -> Self {
        match policy {
            ReplacementPolicy::Fifo => Replacer::Fifo {
                next: spin::Mutex::new(0),
            },
            ReplacementPolicy::Lru => Replacer::Lru,
            ReplacementPolicy::Random => Replacer::Random {
                rng: spin::Mutex::new(StdRng::seed_from_u64(random_seed)),
            },
        }
    }

    /// Chooses a victim frame among those `core_map` currently has bound.
    /// `None` only if no frame is bound at all (nothing to evict).
    pub fn choose_victim(&self, core_map: &CoreMap) -> Option<usize> {
        match self {
            Replacer::Lru => core_map.least_recently_used(),
            Replacer::Fifo { next } => {
                let num_frames = core_map.len();
                if num_frames == 0 {
                    return None;
                }
                let mut cursor = next.lock();
                for _ in 0..num_frames {
                    let candidate = *cursor;
                    *cursor = (*cursor + 1) % num_frames;
                    if core_map.get(candidate).is_some() {
                        return Some(candidate);
                    }
                }
                None
            }
            Replacer::Random { rng } => {
                let bound: Vec<usize> = (0..core_map.len())
                    .filter(|&frame| core_map.get(frame).is_some())
                    .collect();
                if bound.is_empty() {
                    return None;
                }
                let index = rng.lock().gen_range(0..bound.len());
                Some(bound[index])
            }
        }
    }
}
