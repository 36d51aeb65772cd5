use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Phase {
    pub name: String,
    pub description: String,
    /// Minutes
    pub estimated_duration: u32,
    pub status: PhaseStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Minutes, rounded to two decimals
    pub actual_duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub total_phases: usize,
    pub completed_phases: usize,
    pub in_progress_phases: usize,
    pub pending_phases: usize,
    pub completion_percentage: f64,
    pub total_time_minutes: f64,
    pub phases: Vec<Phase>,
}

/// Tracks a multi-phase project against its estimates.
///
/// Out-of-range phase indices are ignored.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    phases: Vec<Phase>,
    current_phase: usize,
    start_time: Option<DateTime<Utc>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_phase(&mut self, name: impl Into<String>, description: impl Into<String>, estimated_duration: u32) {
        self.phases.push(Phase {
            name: name.into(),
            description: description.into(),
            estimated_duration,
            status: PhaseStatus::Pending,
            start_time: None,
            end_time: None,
            actual_duration: None,
        });
    }

    /// Start the clock and the first phase, if there is one
    pub fn start_tracking(&mut self) {
        self.start_time = Some(Utc::now());
        if !self.phases.is_empty() {
            self.start_phase(0);
        }
    }

    pub fn start_phase(&mut self, index: usize) {
        let Some(phase) = self.phases.get_mut(index) else {
            return;
        };
        phase.status = PhaseStatus::InProgress;
        phase.start_time = Some(Utc::now());
        self.current_phase = index;
    }

    /// Complete the given phase, or the current one when `None`
    pub fn complete_phase(&mut self, index: Option<usize>) {
        let index = index.unwrap_or(self.current_phase);
        let Some(phase) = self.phases.get_mut(index) else {
            return;
        };
        let now = Utc::now();
        phase.status = PhaseStatus::Completed;
        phase.end_time = Some(now);
        if let Some(started) = phase.start_time {
            phase.actual_duration = Some(minutes_between(started, now));
        }
    }

    pub fn current_phase(&self) -> usize {
        self.current_phase
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn get_progress_summary(&self) -> ProgressSummary {
        let count = |status: PhaseStatus| self.phases.iter().filter(|p| p.status == status).count();
        let completed = count(PhaseStatus::Completed);

        let completion_percentage = if self.phases.is_empty() {
            0.0
        } else {
            completed as f64 / self.phases.len() as f64 * 100.0
        };

        ProgressSummary {
            total_phases: self.phases.len(),
            completed_phases: completed,
            in_progress_phases: count(PhaseStatus::InProgress),
            pending_phases: count(PhaseStatus::Pending),
            completion_percentage,
            total_time_minutes: self
                .start_time
                .map(|started| minutes_between(started, Utc::now()))
                .unwrap_or(0.0),
            phases: self.phases.clone(),
        }
    }
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let minutes = (end - start).num_milliseconds() as f64 / 60_000.0;
    (minutes * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_phase_tracker() -> ProgressTracker {
        let mut tracker = ProgressTracker::new();
        tracker.add_phase("plan", "Decompose the submission", 10);
        tracker.add_phase("build", "Run the coding agents", 45);
        tracker.add_phase("review", "Collect created files", 5);
        tracker
    }

    #[test]
    fn test_empty_tracker_summary() {
        let mut tracker = ProgressTracker::new();
        tracker.start_tracking();

        let summary = tracker.get_progress_summary();
        assert_eq!(summary.total_phases, 0);
        assert_eq!(summary.completion_percentage, 0.0);
    }

    #[test]
    fn test_start_tracking_starts_first_phase() {
        let mut tracker = three_phase_tracker();
        assert_eq!(tracker.get_progress_summary().total_time_minutes, 0.0);

        tracker.start_tracking();
        assert_eq!(tracker.phases()[0].status, PhaseStatus::InProgress);
        assert!(tracker.phases()[0].start_time.is_some());

        let summary = tracker.get_progress_summary();
        assert_eq!(summary.in_progress_phases, 1);
        assert_eq!(summary.pending_phases, 2);
    }

    #[test]
    fn test_complete_phases() {
        let mut tracker = three_phase_tracker();
        tracker.start_tracking();

        tracker.complete_phase(None);
        assert_eq!(tracker.phases()[0].status, PhaseStatus::Completed);
        assert!(tracker.phases()[0].actual_duration.is_some());

        tracker.start_phase(1);
        assert_eq!(tracker.current_phase(), 1);

        // Completing a phase that never started records no duration
        tracker.complete_phase(Some(2));
        assert_eq!(tracker.phases()[2].actual_duration, None);

        let summary = tracker.get_progress_summary();
        assert_eq!(summary.completed_phases, 2);
        assert_eq!(summary.in_progress_phases, 1);
        assert!((summary.completion_percentage - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_out_of_range_indices_are_ignored() {
        let mut tracker = three_phase_tracker();
        tracker.start_phase(7);
        tracker.complete_phase(Some(7));

        assert_eq!(tracker.current_phase(), 0);
        assert_eq!(tracker.get_progress_summary().pending_phases, 3);
    }
}
