//! Insight ranking

use std::cmp::Ordering;

use crate::synthesis::Insight;

/// Ranked insights: the top slice for display and the full ordered set
#[derive(Debug, Clone, Default)]
pub struct Ranked {
    pub top: Vec<Insight>,
    pub all: Vec<Insight>,
}

/// Total order used for ranking
///
/// Dollars descending, then confidence (HIGH first), then canonical tool
/// order, then canonical key, so equal inputs always rank identically.
pub fn compare(a: &Insight, b: &Insight) -> Ordering {
    b.dollar_impact
        .total_cmp(&a.dollar_impact)
        .then_with(|| b.confidence.priority().cmp(&a.confidence.priority()))
        .then_with(|| a.tool_source.order().cmp(&b.tool_source.order()))
        .then_with(|| a.canonical_key.cmp(&b.canonical_key))
}

pub fn rank(mut insights: Vec<Insight>, top_n: usize) -> Ranked {
    insights.sort_by(compare);
    for (i, insight) in insights.iter_mut().enumerate() {
        insight.rank = i + 1;
    }
    let top = insights.iter().take(top_n).cloned().collect();
    Ranked {
        top,
        all: insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Confidence;
    use crate::tools::ToolKind;

    fn insight(tool: ToolKind, key: &str, dollars: f64, confidence: Confidence) -> Insight {
        Insight::new(tool, key, key, key, dollars, confidence)
    }

    #[test]
    fn test_sorted_by_dollars_then_confidence() {
        let ranked = rank(
            vec![
                insight(ToolKind::AnomalyDetection, "b", 100.0, Confidence::Medium),
                insight(ToolKind::SubscriptionHunter, "a", 500.0, Confidence::Low),
                insight(ToolKind::CorrelationEngine, "c", 100.0, Confidence::High),
                insight(ToolKind::TemporalPatterns, "d", 0.0, Confidence::High),
            ],
            3,
        );

        let keys: Vec<&str> = ranked.all.iter().map(|i| i.canonical_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c", "b", "d"]);
        let ranks: Vec<usize> = ranked.all.iter().map(|i| i.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert_eq!(ranked.top.len(), 3);
        assert_eq!(ranked.top[2].canonical_key, "b");
    }

    #[test]
    fn test_tool_order_breaks_full_ties() {
        let ranked = rank(
            vec![
                insight(ToolKind::SpendingImpact, "runway", 0.0, Confidence::Medium),
                insight(ToolKind::TemporalPatterns, "weekend", 0.0, Confidence::Medium),
            ],
            5,
        );
        assert_eq!(ranked.all[0].tool_source, ToolKind::TemporalPatterns);
        assert_eq!(ranked.top.len(), 2);
    }
}
