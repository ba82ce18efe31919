//! Startup decay pass over every stored item.

use chrono::NaiveDate;
use memora_core::{apply_decay, DecayPolicy};

use crate::db::{DbError, ProgressRepository};

/// Decay every overdue item once. Returns how many scores went down.
///
/// Marker-only updates are stored but not counted. A failure on one item is
/// logged and does not stop the pass.
pub fn apply_startup_decay<P>(repo: &P, today: NaiveDate, policy: DecayPolicy) -> Result<usize, DbError>
where
    P: ProgressRepository + ?Sized,
{
    let items = repo.all_item_progress()?;
    let mut changed = 0;

    for stored in &items {
        let decayed = apply_decay(&stored.progress, today, policy);
        if decayed == stored.progress {
            continue;
        }

        match repo.save_item_progress(&stored.owner_id, stored.item_id, &decayed) {
            Ok(()) if decayed.score != stored.progress.score => changed += 1,
            Ok(()) => {}
            Err(e) => tracing::warn!(
                owner = %stored.owner_id,
                item = stored.item_id,
                error = %e,
                "failed to store decayed progress"
            ),
        }
    }

    tracing::info!(checked = items.len(), changed, ?policy, "startup decay applied");
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteRepository;
    use memora_core::ItemProgress;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn overdue_item(score: u32) -> ItemProgress {
        ItemProgress {
            score,
            interval_days: 4.0,
            next_review_at: day(2024, 5, 1),
            streak: 2,
            correct_days: 2,
            last_correct_date: Some(day(2024, 4, 27)),
            decay_applied_for: None,
        }
    }

    #[test]
    fn test_overdue_items_lose_score() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.save_item_progress("pkg", 1, &overdue_item(80)).unwrap();
        repo.save_item_progress("pkg", 2, &overdue_item(20)).unwrap();
        let mut fresh = overdue_item(80);
        fresh.next_review_at = day(2024, 5, 20);
        repo.save_item_progress("pkg", 3, &fresh).unwrap();

        // 5 days overdue: 5 + 25/10 = 7
        let changed = apply_startup_decay(&repo, day(2024, 5, 6), DecayPolicy::Compounding).unwrap();
        assert_eq!(changed, 1);

        assert_eq!(repo.get_item_progress("pkg", 1).unwrap().unwrap().score, 73);
        assert_eq!(repo.get_item_progress("pkg", 2).unwrap().unwrap().score, 20);
        assert_eq!(repo.get_item_progress("pkg", 3).unwrap().unwrap().score, 80);
    }

    #[test]
    fn test_compounding_versus_once_per_period() {
        let today = day(2024, 5, 6);

        let compounding = SqliteRepository::open_in_memory().unwrap();
        compounding.save_item_progress("pkg", 1, &overdue_item(80)).unwrap();
        apply_startup_decay(&compounding, today, DecayPolicy::Compounding).unwrap();
        apply_startup_decay(&compounding, today, DecayPolicy::Compounding).unwrap();
        assert_eq!(compounding.get_item_progress("pkg", 1).unwrap().unwrap().score, 66);

        let once = SqliteRepository::open_in_memory().unwrap();
        once.save_item_progress("pkg", 1, &overdue_item(80)).unwrap();
        assert_eq!(apply_startup_decay(&once, today, DecayPolicy::OncePerOverduePeriod).unwrap(), 1);
        assert_eq!(apply_startup_decay(&once, today, DecayPolicy::OncePerOverduePeriod).unwrap(), 0);
        let stored = once.get_item_progress("pkg", 1).unwrap().unwrap();
        assert_eq!(stored.score, 73);
        assert_eq!(stored.decay_applied_for, Some(day(2024, 5, 1)));
    }

    #[test]
    fn test_marker_only_update_is_not_counted() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.save_item_progress("pkg", 1, &overdue_item(20)).unwrap();
        let policy = DecayPolicy::OncePerOverduePeriod;

        assert_eq!(apply_startup_decay(&repo, day(2024, 5, 6), policy).unwrap(), 0);

        let stored = repo.get_item_progress("pkg", 1).unwrap().unwrap();
        assert_eq!(stored.score, 20);
        assert_eq!(stored.decay_applied_for, Some(day(2024, 5, 1)));
    }
}
