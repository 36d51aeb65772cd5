use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

use crate::agents::orchestrator::{PerformanceMetrics, SystemStatus};
use crate::agents::Orchestrator;

/// One sample taken by [`SystemMonitor::collect_metrics`]
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSample {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub system_status: SystemStatus,
    pub performance_metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AveragePerformance {
    pub average_completion_rate: f64,
    pub total_samples: usize,
    pub monitoring_duration_hours: f64,
}

pub struct SystemMonitor {
    orchestrator: Orchestrator,
    history: Vec<MetricsSample>,
    start_time: Instant,
}

impl SystemMonitor {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            history: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub async fn collect_metrics(&mut self) -> MetricsSample {
        let sample = MetricsSample {
            timestamp: Utc::now(),
            uptime_seconds: self.start_time.elapsed().as_secs_f64(),
            system_status: self.orchestrator.get_system_status().await,
            performance_metrics: self.orchestrator.get_performance_metrics().await,
        };
        self.history.push(sample.clone());
        sample
    }

    /// The last `limit` samples, oldest first
    pub fn history(&self, limit: usize) -> &[MetricsSample] {
        let skip = self.history.len().saturating_sub(limit);
        &self.history[skip..]
    }

    pub fn average_performance(&self) -> Option<AveragePerformance> {
        if self.history.is_empty() {
            return None;
        }
        let total: f64 = self
            .history
            .iter()
            .map(|m| m.performance_metrics.overall_completion_rate)
            .sum();

        Some(AveragePerformance {
            average_completion_rate: total / self.history.len() as f64,
            total_samples: self.history.len(),
            monitoring_duration_hours: self.start_time.elapsed().as_secs_f64() / 3600.0,
        })
    }
}
