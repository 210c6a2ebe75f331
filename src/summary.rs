// Derived elapsed-time totals

use crate::models::Task;

/// One task's share of the total
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub id: String,
    pub name: String,
    pub elapsed: u64,
    /// Rounded percentage of the total (0 when the total is 0)
    pub percent: u32,
}

/// Aggregate view over all tasks
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Totals {
    pub total_elapsed: u64,
    /// Tasks with time recorded, largest first
    pub rows: Vec<SummaryRow>,
}

impl Totals {
    pub fn compute(tasks: &[Task]) -> Self {
        // Saturates rather than overflowing on absurd persisted values
        let total_elapsed = tasks.iter().fold(0u64, |acc, t| acc.saturating_add(t.elapsed));

        let mut rows: Vec<SummaryRow> = tasks
            .iter()
            .filter(|t| t.elapsed > 0)
            .map(|t| SummaryRow {
                id: t.id.clone(),
                name: t.name.clone(),
                elapsed: t.elapsed,
                percent: percent_of(t.elapsed, total_elapsed),
            })
            .collect();

        // Stable: equal elapsed keeps display order
        rows.sort_by(|a, b| b.elapsed.cmp(&a.elapsed));

        Self { total_elapsed, rows }
    }

    /// Percentage for a task id, 0 if it has no recorded time or is unknown
    pub fn percent_for(&self, id: &str) -> u32 {
        self.rows.iter().find(|r| r.id == id).map(|r| r.percent).unwrap_or(0)
    }
}

/// `round(100 * part / total)`, 0 when total is 0, never above 100
pub fn percent_of(part: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let percent = (100.0 * part as f64 / total as f64).round();
    percent.clamp(0.0, 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, elapsed: u64) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_uppercase(),
            elapsed,
            is_external_item: false,
        }
    }

    #[test]
    fn test_totals_and_percentages() {
        let tasks = vec![task("a", 100), task("b", 200), task("c", 700)];
        let totals = Totals::compute(&tasks);

        assert_eq!(totals.total_elapsed, 1000);
        let percents: Vec<u32> = totals.rows.iter().map(|r| r.percent).collect();
        assert_eq!(percents, vec![70, 20, 10]);

        assert_eq!(totals.percent_for("a"), 10);
        assert_eq!(totals.percent_for("b"), 20);
        assert_eq!(totals.percent_for("c"), 70);
    }

    #[test]
    fn test_summary_sorted_descending_and_skips_zero() {
        let tasks = vec![task("a", 0), task("b", 50), task("c", 300), task("d", 50)];
        let totals = Totals::compute(&tasks);

        let ids: Vec<&str> = totals.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "d"]);
        assert_eq!(totals.percent_for("a"), 0);
    }

    #[test]
    fn test_empty_total_is_all_zero() {
        let tasks = vec![task("a", 0), task("b", 0)];
        let totals = Totals::compute(&tasks);

        assert_eq!(totals.total_elapsed, 0);
        assert!(totals.rows.is_empty());
        assert_eq!(Totals::compute(&[]), Totals::default());
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(2, 3), 67);
        assert_eq!(percent_of(1, 8), 13);
        assert_eq!(percent_of(5, 0), 0);
        assert_eq!(percent_of(7, 5), 100);
        assert_eq!(percent_of(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_huge_elapsed_values_saturate() {
        let tasks = vec![task("a", u64::MAX), task("b", 1)];
        let totals = Totals::compute(&tasks);

        assert_eq!(totals.total_elapsed, u64::MAX);
        assert_eq!(totals.percent_for("a"), 100);
        assert_eq!(totals.percent_for("b"), 0);
        let ids: Vec<&str> = totals.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
