//! Rendering of run reports for the terminal

use std::fmt;

use herald_common::JobStatus;
use herald_dispatch::{RunReport, RunState};

/// Render the report as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_json(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Render a human-readable summary with a per-target table.
#[must_use]
pub fn render_text(report: &RunReport) -> String {
    TextReport(report).to_string()
}

/// Text layout of a [`RunReport`]
struct TextReport<'a>(&'a RunReport);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let stats = &report.stats;

        let outcome = match report.state {
            RunState::Cancelled => "cancelled",
            _ => "completed",
        };
        writeln!(f, "Run {outcome} in {:.2}s", stats.elapsed.as_secs_f64())?;
        writeln!(f, "  sent          {}", stats.total_sent())?;
        writeln!(f, "  failed        {}", stats.total_failed())?;
        writeln!(f, "  rate limited  {}", stats.total_rate_limited())?;
        writeln!(f, "  success rate  {:.1}%", stats.success_rate)?;
        writeln!(f, "  throughput    {:.2} msg/s", stats.messages_per_sec)?;
        writeln!(
            f,
            "  jobs          {} succeeded, {} failed, {} exhausted",
            stats.jobs_succeeded, stats.jobs_failed, stats.jobs_exhausted
        )?;

        if !stats.targets.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{:<18} {:>7} {:>6} {:>7} {:>8} {:>7}",
                "TARGET", "TOTAL", "SENT", "FAILED", "LIMITED", "AVG MS"
            )?;
            for (target, row) in &stats.targets {
                writeln!(
                    f,
                    "{:<18} {:>7} {:>6} {:>7} {:>8} {:>7}",
                    target.as_str(),
                    row.total,
                    row.sent,
                    row.failed,
                    row.rate_limited,
                    row.average_latency_ms()
                )?;
            }
        }

        let unfinished: Vec<_> = report
            .jobs
            .iter()
            .filter(|job| !job.status().is_terminal())
            .collect();
        if !unfinished.is_empty() {
            writeln!(f)?;
            writeln!(f, "{} job(s) not finished:", unfinished.len())?;
            for job in unfinished {
                writeln!(
                    f,
                    "  {} {} {:?} ({}/{} sent)",
                    job.id,
                    job.target(),
                    job.status(),
                    job.delivered(),
                    job.spec.count
                )?;
            }
        }

        let given_up: Vec<_> = report
            .jobs
            .iter()
            .filter(|job| matches!(job.status(), JobStatus::Failed | JobStatus::Exhausted))
            .collect();
        if !given_up.is_empty() {
            writeln!(f)?;
            writeln!(f, "{} job(s) gave up:", given_up.len())?;
            for job in given_up {
                let last = job
                    .history()
                    .last()
                    .map_or("no attempts", |record| record.outcome.label());
                writeln!(f, "  {} {} {:?} (last: {last})", job.id, job.target(), job.status())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use herald_common::{Job, JobId, JobSpec, Outcome};
    use herald_dispatch::StatsAggregator;

    use super::*;

    fn report(state: RunState) -> RunReport {
        let stats = StatsAggregator::new();
        let spec = JobSpec::new("+15551234567", "hello", 2, Duration::ZERO).unwrap();
        let target = spec.target.clone();

        stats.record_outcome(
            &target,
            &Outcome::Success {
                latency: Duration::from_millis(30),
            },
            Duration::from_millis(30),
        );
        stats.record_outcome(
            &target,
            &Outcome::TransientFailure("reset".into()),
            Duration::from_millis(10),
        );
        stats.finalize();

        RunReport {
            state,
            stats: stats.snapshot(),
            jobs: vec![Job::new(JobId(1), spec)],
        }
    }

    #[test]
    fn test_text_report() {
        let text = render_text(&report(RunState::Completed));

        assert!(text.starts_with("Run completed in "));
        assert!(text.contains("  sent          1\n"));
        assert!(text.contains("  failed        1\n"));
        assert!(text.contains("  success rate  50.0%\n"));
        assert!(text.contains("+15551234567"));
        assert!(text.contains("1 job(s) not finished:"));
        assert!(text.contains("job-1 +15551234567 Pending (0/2 sent)"));
    }

    #[test]
    fn test_cancelled_report() {
        let text = render_text(&report(RunState::Cancelled));
        assert!(text.starts_with("Run cancelled in "));
    }

    #[test]
    fn test_json_report() {
        let json = render_json(&report(RunState::Completed)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["state"], "Completed");
        assert_eq!(value["stats"]["totals"]["sent"], 1);
        assert_eq!(value["stats"]["targets"]["+15551234567"]["failed"], 1);
        assert_eq!(value["jobs"][0]["id"], 1);
        assert!(value["stats"]["elapsed_ms"].is_u64());
    }
}
