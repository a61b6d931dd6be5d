use std::collections::BTreeMap;

use uuid::Uuid;

/// Counters from one orchestrated run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub enumerated: u32,
    pub completed: u32,
    /// Already complete in the progress store; no network work done.
    pub skipped: u32,
    pub failed: u32,
    pub filtered_by_date: u32,
    pub undated_included: u32,
    pub listing_errors: u32,
    pub archived: u32,
    pub archive_misses: u32,
    pub cancelled: bool,
    /// Raw label → number of entities it appeared on.
    pub unmapped_labels: BTreeMap<String, u32>,
    /// `(product code, reason)` for each failed entity.
    pub failures: Vec<(String, String)>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            enumerated: 0,
            completed: 0,
            skipped: 0,
            failed: 0,
            filtered_by_date: 0,
            undated_included: 0,
            listing_errors: 0,
            archived: 0,
            archive_misses: 0,
            cancelled: false,
            unmapped_labels: BTreeMap::new(),
            failures: Vec::new(),
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Scrape Run Complete ===")?;
        writeln!(f, "Run:              {}", self.run_id)?;
        writeln!(f, "Enumerated:       {}", self.enumerated)?;
        writeln!(f, "Completed:        {}", self.completed)?;
        writeln!(f, "Skipped (done):   {}", self.skipped)?;
        writeln!(f, "Failed:           {}", self.failed)?;
        writeln!(f, "Filtered by date: {}", self.filtered_by_date)?;
        writeln!(f, "Undated included: {}", self.undated_included)?;
        if self.listing_errors > 0 {
            writeln!(f, "Listing errors:   {}", self.listing_errors)?;
        }
        if self.archived + self.archive_misses > 0 {
            writeln!(f, "Archived:         {}", self.archived)?;
            writeln!(f, "Archive misses:   {}", self.archive_misses)?;
        }
        if self.cancelled {
            writeln!(f, "Cancelled before the listing was exhausted")?;
        }
        if !self.failures.is_empty() {
            writeln!(f, "\nFailures:")?;
            for (id, reason) in &self.failures {
                writeln!(f, "  {id}: {reason}")?;
            }
        }
        if !self.unmapped_labels.is_empty() {
            writeln!(f, "\nUnmapped specification labels:")?;
            for (label, count) in &self.unmapped_labels {
                writeln!(f, "  {label} ({count})")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_failures_and_labels() {
        let mut summary = RunSummary {
            completed: 3,
            failed: 1,
            ..Default::default()
        };
        summary.failures.push(("nikon_z8".into(), "timed out".into()));
        summary.unmapped_labels.insert("Sensor readout".into(), 2);

        let text = summary.to_string();
        assert!(text.contains("Completed:        3"));
        assert!(text.contains("nikon_z8: timed out"));
        assert!(text.contains("Sensor readout (2)"));
        assert!(!text.contains("Archived:"));
    }
}
