//! Time-range planning and lazy materialization of segment files

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AnalyzerError, Result};
use crate::media::MediaBackend;
use crate::progress::StopSignal;
use crate::source::{SourceLocation, SourceResolver, VideoSource};

/// A `[start, end)` slice of a source in seconds. `end == None` means "to the end of the source".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: Option<f64>,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn open(start: f64) -> Self {
        Self { start, end: None }
    }

    /// Length in seconds, when bounded
    pub fn length(&self) -> Option<f64> {
        self.end.map(|end| (end - self.start).max(0.0))
    }

    /// Label used in segment file names, e.g. `60-120` or `0-end`
    pub fn label(&self) -> String {
        match self.end {
            Some(end) => format!("{}-{}", format_seconds(self.start), format_seconds(end)),
            None => format!("{}-end", format_seconds(self.start)),
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{:.2}s, {:.2}s)", self.start, end),
            None => write!(f, "[{:.2}s, end)", self.start),
        }
    }
}

/// Seconds without a trailing `.0` for whole values
pub fn format_seconds(seconds: f64) -> String {
    if seconds.fract() == 0.0 {
        format!("{}", seconds as u64)
    } else {
        let text = format!("{:.2}", seconds);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// How a source's duration is cut into time ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentationPolicy {
    /// One segment spanning the full source
    Whole,
    /// Consecutive chunks of `seconds` over a source of known duration
    FixedInterval { seconds: u64 },
    /// Chunks of `seconds` until `cap` seconds or an external stop
    Unbounded { seconds: u64, cap: u64 },
}

impl SegmentationPolicy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            SegmentationPolicy::Whole => Ok(()),
            SegmentationPolicy::FixedInterval { seconds } if seconds == 0 => Err(
                AnalyzerError::InvalidParameters("segment interval must be greater than 0".into()),
            ),
            SegmentationPolicy::Unbounded { seconds, cap } if seconds == 0 || cap == 0 => {
                Err(AnalyzerError::InvalidParameters(
                    "continuous chunk size and cap must be greater than 0".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, SegmentationPolicy::Unbounded { .. })
    }

    /// Plan the ranges for a source of the given duration.
    ///
    /// An unknown or zero duration collapses `FixedInterval` into a single
    /// whole-source range. `Unbounded` ignores the duration and plans up to its cap.
    pub fn ranges(&self, duration: Option<f64>) -> RangePlan {
        let known = duration.filter(|d| d.is_finite() && *d > 0.0);
        match *self {
            SegmentationPolicy::Whole => RangePlan::whole(known),
            SegmentationPolicy::FixedInterval { seconds } => match known {
                Some(total) if seconds > 0 => RangePlan::chunked(seconds as f64, total),
                _ => RangePlan::whole(known),
            },
            SegmentationPolicy::Unbounded { seconds, cap } => {
                if seconds == 0 {
                    RangePlan::empty()
                } else {
                    RangePlan::chunked(seconds as f64, cap as f64)
                }
            }
        }
    }
}

impl std::fmt::Display for SegmentationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentationPolicy::Whole => write!(f, "whole"),
            SegmentationPolicy::FixedInterval { seconds } => write!(f, "every {}s", seconds),
            SegmentationPolicy::Unbounded { seconds, cap } => {
                write!(f, "continuous {}s chunks up to {}s", seconds, cap)
            }
        }
    }
}

/// Pure, restartable sequence of planned ranges
#[derive(Debug, Clone)]
pub struct RangePlan {
    step: Option<f64>,
    total: Option<f64>,
    count: u64,
    next: u64,
}

impl RangePlan {
    fn whole(total: Option<f64>) -> Self {
        Self {
            step: None,
            total,
            count: 1,
            next: 0,
        }
    }

    fn chunked(step: f64, total: f64) -> Self {
        Self {
            step: Some(step),
            total: Some(total),
            count: (total / step).ceil() as u64,
            next: 0,
        }
    }

    fn empty() -> Self {
        Self {
            step: None,
            total: None,
            count: 0,
            next: 0,
        }
    }

    /// Total number of ranges in the plan
    pub fn total_count(&self) -> u64 {
        self.count
    }
}

impl Iterator for RangePlan {
    type Item = TimeRange;

    fn next(&mut self) -> Option<TimeRange> {
        if self.next >= self.count {
            return None;
        }
        let k = self.next;
        self.next += 1;

        match self.step {
            None => Some(TimeRange {
                start: 0.0,
                end: self.total,
            }),
            Some(step) => {
                let start = k as f64 * step;
                let end = ((k + 1) as f64 * step).min(self.total.unwrap_or(f64::INFINITY));
                Some(TimeRange::new(start, end))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RangePlan {}

/// A materialized range of the source on local disk
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Position in the plan, starting at 0
    pub index: usize,
    pub range: TimeRange,
    pub path: PathBuf,
    /// Whether the file belongs to the run and may be deleted after processing
    pub disposable: bool,
}

impl Segment {
    /// File stem identifying the segment in artifacts and reports
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("segment_{}", self.range.label()))
    }
}

/// A range whose materialization failed
#[derive(Debug)]
pub struct SegmentFailure {
    pub index: usize,
    pub range: TimeRange,
    pub error: AnalyzerError,
}

/// Effective duration after applying an optional operator cap
pub fn effective_duration(duration: Option<f64>, cap: Option<f64>) -> Option<f64> {
    let cap = cap.filter(|c| *c > 0.0);
    match (duration.filter(|d| *d > 0.0), cap) {
        (Some(d), Some(c)) => Some(d.min(c)),
        (Some(d), None) => Some(d),
        (None, Some(c)) => Some(c),
        (None, None) => None,
    }
}

/// Produces segment files one at a time.
///
/// Each call to [`Segmenter::advance`] deletes the previous disposable file
/// that was not released, then materializes the next planned range.
pub struct Segmenter {
    source: VideoSource,
    policy: SegmentationPolicy,
    plan: RangePlan,
    segments_dir: PathBuf,
    media: Arc<dyn MediaBackend>,
    resolver: Arc<dyn SourceResolver>,
    stop: StopSignal,
    in_flight: Option<PathBuf>,
    exhausted: bool,
    next_index: usize,
}

impl Segmenter {
    pub fn new(
        source: VideoSource,
        policy: SegmentationPolicy,
        duration_cap: Option<f64>,
        segments_dir: PathBuf,
        media: Arc<dyn MediaBackend>,
        resolver: Arc<dyn SourceResolver>,
        stop: StopSignal,
    ) -> Self {
        let plan = policy.ranges(effective_duration(source.duration, duration_cap));
        info!(
            "✂️  Planned {} segment(s) for '{}' ({})",
            plan.total_count(),
            source.title,
            policy
        );

        Self {
            source,
            policy,
            plan,
            segments_dir,
            media,
            resolver,
            stop,
            in_flight: None,
            exhausted: false,
            next_index: 0,
        }
    }

    pub fn policy(&self) -> SegmentationPolicy {
        self.policy
    }

    /// Number of ranges not yet handed out
    pub fn remaining(&self) -> usize {
        if self.exhausted {
            0
        } else {
            self.plan.len()
        }
    }

    /// Materialize the next range.
    ///
    /// Returns `None` once the plan is finished, the stop signal is set, or a
    /// continuous remote source stopped delivering.
    pub async fn advance(&mut self) -> Option<std::result::Result<Segment, SegmentFailure>> {
        self.discard_in_flight().await;

        if self.exhausted {
            return None;
        }
        if self.stop.is_stopped() {
            info!("🛑 Stop requested, no further segments");
            return None;
        }

        let range = self.plan.next()?;
        let index = self.next_index;
        self.next_index += 1;

        match self.materialize(index, range).await {
            Ok(segment) => {
                if segment.disposable {
                    self.in_flight = Some(segment.path.clone());
                }
                Some(Ok(segment))
            }
            Err(error) => {
                if self.source.is_remote() && self.policy.is_unbounded() {
                    warn!("📭 Source stopped delivering at {}, ending run", range);
                    self.exhausted = true;
                }
                Some(Err(SegmentFailure {
                    index,
                    range,
                    error,
                }))
            }
        }
    }

    /// Hand a processed segment back, deleting its file unless `keep` is set
    pub async fn release(&mut self, segment: &Segment, keep: bool) -> Result<()> {
        if self.in_flight.as_deref() == Some(segment.path.as_path()) {
            self.in_flight = None;
        }
        if !segment.disposable || keep {
            return Ok(());
        }
        remove_if_present(&segment.path).await?;
        debug!("🧹 Removed segment file {}", segment.path.display());
        Ok(())
    }

    async fn discard_in_flight(&mut self) {
        if let Some(path) = self.in_flight.take() {
            if let Err(e) = remove_if_present(&path).await {
                warn!("Failed to remove stale segment {}: {}", path.display(), e);
            }
        }
    }

    fn covers_full_source(&self, range: &TimeRange) -> bool {
        if range.start > 0.0 {
            return false;
        }
        match (range.end, self.source.duration) {
            (None, _) => true,
            (Some(end), Some(duration)) => end >= duration,
            (Some(_), None) => false,
        }
    }

    async fn materialize(&self, index: usize, range: TimeRange) -> Result<Segment> {
        let whole = self.covers_full_source(&range);

        match &self.source.location {
            SourceLocation::Local(path) => {
                if whole {
                    debug!("Using {} directly for {}", path.display(), range);
                    return Ok(Segment {
                        index,
                        range,
                        path: path.clone(),
                        disposable: false,
                    });
                }

                let output = self.segments_dir.join(format!(
                    "{}_segment_{}_secs.mp4",
                    self.source.stem(),
                    range.label()
                ));
                info!("✂️  Trimming {} -> {}", range, output.display());
                self.media
                    .trim(path, range, &output)
                    .await
                    .map_err(|e| AnalyzerError::MediaDecode {
                        path: path.clone(),
                        reason: format!("trim {} failed: {:#}", range, e),
                    })?;

                Ok(Segment {
                    index,
                    range,
                    path: output,
                    disposable: true,
                })
            }
            SourceLocation::Remote(url) => {
                let stem = format!("segment_{}", range.label());
                let requested = if whole { None } else { Some(range) };
                info!("⬇️  Downloading {} of {}", range, url);
                let path = self
                    .resolver
                    .download(url, requested, &self.segments_dir, &stem)
                    .await
                    .map_err(|e| AnalyzerError::SourceResolution {
                        source_id: url.to_string(),
                        reason: format!("download {} failed: {:#}", range, e),
                    })?;

                Ok(Segment {
                    index,
                    range,
                    path,
                    disposable: true,
                })
            }
        }
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(policy: SegmentationPolicy, duration: Option<f64>) -> Vec<TimeRange> {
        policy.ranges(duration).collect()
    }

    #[test]
    fn test_fixed_interval_covers_duration() {
        let ranges = collect(SegmentationPolicy::FixedInterval { seconds: 60 }, Some(125.0));
        assert_eq!(
            ranges,
            vec![
                TimeRange::new(0.0, 60.0),
                TimeRange::new(60.0, 120.0),
                TimeRange::new(120.0, 125.0),
            ]
        );
    }

    #[test]
    fn test_fixed_interval_ranges_are_contiguous() {
        for (duration, interval) in [(1.0, 1), (59.9, 60), (600.0, 60), (3601.5, 7), (10.0, 3)] {
            let ranges = collect(
                SegmentationPolicy::FixedInterval { seconds: interval },
                Some(duration),
            );
            let expected = (duration / interval as f64).ceil() as usize;
            assert_eq!(ranges.len(), expected, "duration {} interval {}", duration, interval);
            assert_eq!(ranges[0].start, 0.0);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end, Some(pair[1].start));
            }
            assert_eq!(ranges.last().and_then(|r| r.end), Some(duration));
        }
    }

    #[test]
    fn test_unknown_duration_falls_back_to_whole() {
        let ranges = collect(SegmentationPolicy::FixedInterval { seconds: 60 }, None);
        assert_eq!(ranges, vec![TimeRange::open(0.0)]);

        let ranges = collect(SegmentationPolicy::FixedInterval { seconds: 60 }, Some(0.0));
        assert_eq!(ranges, vec![TimeRange::open(0.0)]);
    }

    #[test]
    fn test_whole_is_single_range() {
        let ranges = collect(SegmentationPolicy::Whole, Some(90.0));
        assert_eq!(ranges, vec![TimeRange::new(0.0, 90.0)]);
    }

    #[test]
    fn test_unbounded_plans_up_to_cap() {
        let plan = SegmentationPolicy::Unbounded {
            seconds: 180,
            cap: 48 * 3600,
        }
        .ranges(None);
        assert_eq!(plan.len(), 960);

        let last = plan.last();
        assert_eq!(last, Some(TimeRange::new(172_620.0, 172_800.0)));
    }

    #[test]
    fn test_planning_is_deterministic() {
        let policy = SegmentationPolicy::FixedInterval { seconds: 7 };
        assert_eq!(collect(policy, Some(100.3)), collect(policy, Some(100.3)));
    }

    #[test]
    fn test_policy_validation() {
        assert!(SegmentationPolicy::Whole.validate().is_ok());
        assert!(SegmentationPolicy::FixedInterval { seconds: 0 }.validate().is_err());
        assert!(SegmentationPolicy::Unbounded { seconds: 20, cap: 0 }
            .validate()
            .is_err());
        assert!(SegmentationPolicy::Unbounded { seconds: 20, cap: 60 }
            .validate()
            .is_ok());
    }

    #[test]
    fn test_effective_duration_cap() {
        assert_eq!(effective_duration(Some(300.0), Some(120.0)), Some(120.0));
        assert_eq!(effective_duration(Some(100.0), Some(120.0)), Some(100.0));
        assert_eq!(effective_duration(Some(100.0), Some(0.0)), Some(100.0));
        assert_eq!(effective_duration(None, Some(60.0)), Some(60.0));
        assert_eq!(effective_duration(None, None), None);
    }

    #[test]
    fn test_range_labels() {
        assert_eq!(TimeRange::new(60.0, 120.0).label(), "60-120");
        assert_eq!(TimeRange::new(0.0, 12.5).label(), "0-12.5");
        assert_eq!(TimeRange::open(0.0).label(), "0-end");
        assert_eq!(TimeRange::new(120.0, 125.0).length(), Some(5.0));
    }
}
