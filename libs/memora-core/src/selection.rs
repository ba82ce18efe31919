//! Review-set construction.
//!
//! Items are picked in three tiers: everything due (weakest first), then weak
//! items (weakest first), then a weighted random fill that favours low
//! scores. The randomness source is a parameter so callers can seed it.

use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{Reviewable, MAX_SCORE};

/// Items below this score are picked in the second tier.
pub const WEAK_SCORE_THRESHOLD: u32 = 50;
/// Added to every fill weight so perfect items keep a chance of being drawn.
pub const MIN_FILL_WEIGHT: u32 = 10;

/// Fill-tier weight of an item: lower scores weigh more.
pub fn fill_weight(score: u32) -> u32 {
    MAX_SCORE.saturating_sub(score) + MIN_FILL_WEIGHT
}

/// Pick at most `count` items to review on `today`.
///
/// The returned order is shuffled and carries no meaning.
pub fn select_items_for_review<T, R>(items: &[T], count: usize, today: NaiveDate, rng: &mut R) -> Vec<T>
where
    T: Reviewable + Clone,
    R: Rng + ?Sized,
{
    if items.len() <= count {
        let mut all = items.to_vec();
        all.shuffle(rng);
        return all;
    }

    let mut chosen: Vec<usize> = Vec::with_capacity(count);
    let mut taken = vec![false; items.len()];

    let score_of = |i: &usize| items[*i].progress().score;

    let mut urgent: Vec<usize> = (0..items.len())
        .filter(|&i| items[i].progress().is_due(today))
        .collect();
    urgent.sort_by_key(score_of);
    take_in_order(&urgent, count, &mut chosen, &mut taken);

    if chosen.len() < count {
        let mut weak: Vec<usize> = (0..items.len())
            .filter(|&i| !taken[i] && items[i].progress().score < WEAK_SCORE_THRESHOLD)
            .collect();
        weak.sort_by_key(score_of);
        take_in_order(&weak, count, &mut chosen, &mut taken);
    }

    if chosen.len() < count {
        let mut pool: Vec<(usize, u32)> = (0..items.len())
            .filter(|&i| !taken[i])
            .map(|i| (i, fill_weight(items[i].progress().score)))
            .collect();

        while chosen.len() < count && !pool.is_empty() {
            let picked = draw_weighted(&pool, rng);
            let (index, _) = pool.swap_remove(picked);
            taken[index] = true;
            chosen.push(index);
        }
    }

    let mut result: Vec<T> = chosen.into_iter().map(|i| items[i].clone()).collect();
    result.shuffle(rng);
    result
}

fn take_in_order(candidates: &[usize], count: usize, chosen: &mut Vec<usize>, taken: &mut [bool]) {
    for &i in candidates {
        if chosen.len() >= count {
            break;
        }
        taken[i] = true;
        chosen.push(i);
    }
}

/// Cumulative-weight sampling; returns a position in `pool`.
fn draw_weighted<R: Rng + ?Sized>(pool: &[(usize, u32)], rng: &mut R) -> usize {
    let total: u64 = pool.iter().map(|(_, w)| u64::from(*w)).sum();
    let mut target = rng.gen_range(0..total);
    for (pos, (_, weight)) in pool.iter().enumerate() {
        let weight = u64::from(*weight);
        if target < weight {
            return pos;
        }
        target -= weight;
    }
    pool.len() - 1
}
