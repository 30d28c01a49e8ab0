use std::collections::{HashMap, HashSet};

use crate::model::{
    CompletionRecord, CompletionStatus, ContentId, ContentItem, ItemProgress, ProgressSnapshot,
    progress_percentage,
};

/// Compute a learner's progress snapshot for one module.
///
/// `items` are the module's content items in display order; inactive entries
/// and repeated ids are skipped so `total_sections` is the number of distinct
/// active items. `completions` are the learner's records; records for content
/// outside `items` are ignored.
///
/// An item counts as completed only when its record's status is
/// `CompletionStatus::Completed`. A record at 100% that is still
/// `InProgress` does not count.
///
/// The function is pure: the same inputs always produce the same snapshot.
///
/// # Examples
///
/// ```
/// # use progress_core::aggregator::aggregate;
/// # use progress_core::model::*;
/// let module = ModuleId::new(1);
/// let user = UserId::new(7);
/// let items = vec![
///     ContentItem::new(ContentId::new(1), module, ContentType::Video, "Intro"),
///     ContentItem::new(ContentId::new(2), module, ContentType::Lab, "Hands-on"),
/// ];
/// let done = vec![CompletionRecord::new(user, ContentId::new(1), CompletionStatus::Completed)];
///
/// let snapshot = aggregate(&items, &done);
/// assert_eq!(snapshot.completed_sections, 1);
/// assert_eq!(snapshot.progress_percentage, 50);
/// ```
#[must_use]
pub fn aggregate(items: &[ContentItem], completions: &[CompletionRecord]) -> ProgressSnapshot {
    let mut lookup: HashMap<ContentId, &CompletionRecord> =
        HashMap::with_capacity(completions.len());
    for record in completions {
        // a completed record wins over a stale duplicate
        lookup
            .entry(record.content_id)
            .and_modify(|existing| {
                if !existing.is_completed() {
                    *existing = record;
                }
            })
            .or_insert(record);
    }

    let mut snapshot = ProgressSnapshot::empty();
    let mut seen: HashSet<ContentId> = HashSet::with_capacity(items.len());

    for item in items.iter().filter(|i| i.active) {
        if !seen.insert(item.id) {
            continue;
        }

        let bucket = item.bucket();
        let record = lookup.get(&item.id).copied();
        let completed = record.is_some_and(CompletionRecord::is_completed);

        let counts = snapshot.by_type.get_mut(bucket);
        counts.total += 1;
        snapshot.total_sections += 1;
        if completed {
            counts.completed += 1;
            snapshot.completed_sections += 1;
        }

        snapshot.items.push(ItemProgress {
            content_id: item.id,
            content_type: bucket,
            section: item.section.clone(),
            title: item.title.clone(),
            duration: item.duration,
            status: record.map_or(CompletionStatus::NotStarted, |r| r.status),
            progress_percentage: record.map_or(0, |r| r.progress_percentage),
            score: record.and_then(|r| r.score),
            max_score: record.and_then(|r| r.max_score),
            completed,
        });
    }

    snapshot.progress_percentage =
        progress_percentage(snapshot.completed_sections, snapshot.total_sections);
    snapshot
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
