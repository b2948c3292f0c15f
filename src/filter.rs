//! Row selection applied by the EDA and Insights pages before aggregating.

use crate::ops::DATE_COLUMN;
use crate::table::Table;
use tracing::debug;

pub const REGION_COLUMN: &str = "region";
pub const RESOURCE_COLUMN: &str = "resource_type";

/// Optional region / resource type / inclusive date range constraints.
///
/// `None` means "All". Dates compare as `YYYY-MM-DD` strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub region: Option<String>,
    pub resource_type: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn with_end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    /// True when no constraint is set.
    pub fn is_empty(&self) -> bool {
        self.region.is_none()
            && self.resource_type.is_none()
            && self.start.is_none()
            && self.end.is_none()
    }

    /// Whether row `row` of `table` passes every constraint.
    ///
    /// A row with a missing date fails any date bound.
    pub fn matches(&self, table: &Table, row: usize) -> bool {
        let equals = |column: &str, wanted: &Option<String>| match wanted {
            Some(wanted) => {
                let v = table.value(row, column);
                !v.is_missing() && v.key_string() == *wanted
            }
            None => true,
        };
        if !equals(REGION_COLUMN, &self.region) || !equals(RESOURCE_COLUMN, &self.resource_type) {
            return false;
        }
        if self.start.is_none() && self.end.is_none() {
            return true;
        }
        let date = table.value(row, DATE_COLUMN);
        if date.is_missing() {
            return false;
        }
        let date = date.key_string();
        if let Some(start) = &self.start {
            if date.as_str() < start.as_str() {
                return false;
            }
        }
        if let Some(end) = &self.end {
            if date.as_str() > end.as_str() {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, table: &Table) -> Table {
        if self.is_empty() {
            return table.clone();
        }
        let out = table.filter_rows(|t, i| self.matches(t, i));
        debug!(
            filter = ?self,
            before = table.row_count(),
            after = out.row_count(),
            "filtered rows"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table;

    fn usage() -> Table {
        table!["date", "region", "resource_type", "usage_cpu";
            ["2024-01-01", "East US", "VM", 10],
            ["2024-01-02", "West US", "Storage", 20],
            ["2024-01-03", "East US", "Storage", 30],
            ["", "East US", "VM", 40],
        ]
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        assert_eq!(RowFilter::new().apply(&usage()).row_count(), 4);
    }

    #[test]
    fn test_region_and_resource() {
        let t = RowFilter::new()
            .with_region("East US")
            .with_resource_type("Storage")
            .apply(&usage());
        assert_eq!(t.row_count(), 1);
        assert_eq!(t.value(0, "usage_cpu").key_string(), "30");
    }

    #[test]
    fn test_date_bounds_inclusive() {
        let t = RowFilter::new()
            .with_start("2024-01-02")
            .with_end("2024-01-03")
            .apply(&usage());
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.value(0, "date").key_string(), "2024-01-02");
        assert_eq!(t.value(1, "date").key_string(), "2024-01-03");
    }

    #[test]
    fn test_missing_date_fails_bound() {
        let t = RowFilter::new().with_end("2099-12-31").apply(&usage());
        assert_eq!(t.row_count(), 3);
    }
}
