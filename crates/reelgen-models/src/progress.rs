//! Named progress checkpoints and their percentage schedule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A stage boundary at which the orchestrator reports progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Started,
    ResolvingHook,
    SelectingClips,
    TrimmingSegments,
    SynthesizingVoice,
    VoiceoverReady,
    Composing,
    Publishing,
    Completed,
}

impl Checkpoint {
    /// All checkpoints in pipeline order.
    pub const ALL: [Checkpoint; 9] = [
        Checkpoint::Started,
        Checkpoint::ResolvingHook,
        Checkpoint::SelectingClips,
        Checkpoint::TrimmingSegments,
        Checkpoint::SynthesizingVoice,
        Checkpoint::VoiceoverReady,
        Checkpoint::Composing,
        Checkpoint::Publishing,
        Checkpoint::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::Started => "started",
            Checkpoint::ResolvingHook => "resolving_hook",
            Checkpoint::SelectingClips => "selecting_clips",
            Checkpoint::TrimmingSegments => "trimming_segments",
            Checkpoint::SynthesizingVoice => "synthesizing_voice",
            Checkpoint::VoiceoverReady => "voiceover_ready",
            Checkpoint::Composing => "composing",
            Checkpoint::Publishing => "publishing",
            Checkpoint::Completed => "completed",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Checkpoint {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Checkpoint::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ScheduleError::UnknownCheckpoint(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("unknown checkpoint: {0}")]
    UnknownCheckpoint(String),

    #[error("malformed schedule entry: {0}")]
    Malformed(String),

    #[error("progress value for {checkpoint} must be 0-100, got {value}")]
    OutOfRange { checkpoint: Checkpoint, value: u32 },

    #[error("schedule must be non-decreasing: {later} ({later_value}) is below {earlier} ({earlier_value})")]
    Decreasing {
        earlier: Checkpoint,
        earlier_value: u8,
        later: Checkpoint,
        later_value: u8,
    },

    #[error("the completed checkpoint must be 100, got {0}")]
    IncompleteFinish(u8),
}

/// Percentage reported at each checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSchedule {
    values: [u8; 9],
}

impl Default for ProgressSchedule {
    fn default() -> Self {
        Self {
            values: [0, 10, 15, 25, 40, 60, 80, 90, 100],
        }
    }
}

impl ProgressSchedule {
    /// Percentage for a checkpoint.
    pub fn value(&self, checkpoint: Checkpoint) -> u8 {
        self.values[checkpoint.index()]
    }

    /// Apply overrides of the form `composing=70,publishing=95` on top of the
    /// defaults. The resulting schedule is validated.
    pub fn parse_overrides(spec: &str) -> Result<Self, ScheduleError> {
        let mut schedule = Self::default();

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| ScheduleError::Malformed(entry.to_string()))?;
            let checkpoint: Checkpoint = name.trim().parse()?;
            let value: u32 = value
                .trim()
                .parse()
                .map_err(|_| ScheduleError::Malformed(entry.to_string()))?;
            if value > 100 {
                return Err(ScheduleError::OutOfRange { checkpoint, value });
            }
            schedule.values[checkpoint.index()] = value as u8;
        }

        schedule.validate()?;
        Ok(schedule)
    }

    /// Check the schedule never decreases along the pipeline and ends at 100.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        for pair in Checkpoint::ALL.windows(2) {
            let (earlier, later) = (pair[0], pair[1]);
            if self.value(later) < self.value(earlier) {
                return Err(ScheduleError::Decreasing {
                    earlier,
                    earlier_value: self.value(earlier),
                    later,
                    later_value: self.value(later),
                });
            }
        }

        let finish = self.value(Checkpoint::Completed);
        if finish != 100 {
            return Err(ScheduleError::IncompleteFinish(finish));
        }
        Ok(())
    }
}
