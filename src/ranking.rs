//! Ranking policy: importance descending, then urgency (immediate first).
//! Ties keep their input order (`sort_by` is stable).

use std::cmp::Ordering;

use crate::item::AnalyzedItem;

/// Total order used for snapshots, digest input and the final listing.
pub fn compare(a: &AnalyzedItem, b: &AnalyzedItem) -> Ordering {
    b.importance_score
        .cmp(&a.importance_score)
        .then_with(|| a.urgency.rank().cmp(&b.urgency.rank()))
}

pub fn rank_in_place(items: &mut [AnalyzedItem]) {
    items.sort_by(compare);
}

/// Ranked copy of `items`, truncated to `limit`.
pub fn ranked_top(items: &[AnalyzedItem], limit: usize) -> Vec<AnalyzedItem> {
    let mut out = items.to_vec();
    rank_in_place(&mut out);
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{Analysis, Urgency};
    use crate::item::Item;
    use chrono::Utc;

    fn scored(title: &str, importance: u8, urgency: Urgency) -> AnalyzedItem {
        let mut a = Analysis::from_summary(title);
        a.importance_score = importance;
        a.urgency = urgency;
        AnalyzedItem::with_analysis(Item::new(title, "s", "c", "", Utc::now(), ""), a)
    }

    #[test]
    fn urgency_breaks_importance_ties() {
        let a = scored("A", 8, Urgency::Monitoring);
        let b = scored("B", 8, Urgency::Immediate);
        let mut v = vec![a, b];
        rank_in_place(&mut v);
        assert_eq!(v[0].item.title, "B");
    }

    #[test]
    fn importance_dominates_urgency() {
        let c = scored("C", 9, Urgency::Monitoring);
        let d = scored("D", 3, Urgency::Immediate);
        let mut v = vec![d, c];
        rank_in_place(&mut v);
        assert_eq!(v[0].item.title, "C");
    }

    #[test]
    fn full_ties_keep_input_order() {
        let v: Vec<_> = ["x", "y", "z"]
            .iter()
            .map(|t| scored(t, 5, Urgency::Within1Week))
            .collect();
        let top = ranked_top(&v, 2);
        let titles: Vec<_> = top.iter().map(|i| i.item.title.as_str()).collect();
        assert_eq!(titles, vec!["x", "y"]);
    }

    #[test]
    fn urgency_ladder_is_ordered() {
        let mut v = vec![
            scored("m", 6, Urgency::Monitoring),
            scored("w", 6, Urgency::Within1Week),
            scored("d", 6, Urgency::Within24h),
            scored("i", 6, Urgency::Immediate),
        ];
        rank_in_place(&mut v);
        let titles: Vec<_> = v.iter().map(|i| i.item.title.as_str()).collect();
        assert_eq!(titles, vec!["i", "d", "w", "m"]);
    }
}
