//! Filter-graph construction for the final composition.
//!
//! Input layout: `0` is the hook clip, `1..=N` are the trimmed main
//! segments in play order, `N+1` is the voiceover track.

use std::fmt::Write;

use crate::command::format_seconds;

/// Timestamp reset applied to every video segment.
pub const FILTER_RESET_PTS: &str = "setpts=PTS-STARTPTS";

/// Output label of the concatenated video stream.
pub const VIDEO_OUT: &str = "[vout]";

/// Output label of the assembled audio track.
pub const AUDIO_OUT: &str = "[aout]";

/// Canonical output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 1080x1920 portrait.
    pub const fn portrait_hd() -> Self {
        Self::new(1080, 1920)
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::portrait_hd()
    }
}

/// Parameters of the hook + mains + voiceover graph.
#[derive(Debug, Clone, PartialEq)]
pub struct HookComposition {
    /// Number of trimmed main segments
    pub main_segments: usize,
    /// Seconds of the hook's own audio kept at the start
    pub hook_duration: f64,
    /// Seconds of voiceover following the hook audio
    pub voiceover_duration: f64,
    /// Size every main segment is scaled to
    pub frame: FrameSize,
}

impl HookComposition {
    /// Input index of the voiceover track.
    pub fn voiceover_input(&self) -> usize {
        self.main_segments + 1
    }

    /// Build the `-filter_complex` expression.
    pub fn filter_graph(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.main_segments + 5);

        parts.push(format!("[0:v]{FILTER_RESET_PTS}[hookv]"));
        for i in 1..=self.main_segments {
            parts.push(format!(
                "[{i}:v]{FILTER_RESET_PTS},scale={}:{}[clip{i}v]",
                self.frame.width, self.frame.height
            ));
        }

        let mut concat_inputs = String::from("[hookv]");
        for i in 1..=self.main_segments {
            let _ = write!(concat_inputs, "[clip{i}v]");
        }
        parts.push(format!(
            "{concat_inputs}concat=n={}:v=1:a=0{VIDEO_OUT}",
            self.main_segments + 1
        ));

        parts.push(format!(
            "[0:a]atrim=duration={},asetpts=PTS-STARTPTS[hooka]",
            format_seconds(self.hook_duration)
        ));
        parts.push(format!(
            "[{}:a]atrim=duration={},asetpts=PTS-STARTPTS[voa]",
            self.voiceover_input(),
            format_seconds(self.voiceover_duration)
        ));
        parts.push(format!("[hooka][voa]concat=n=2:v=0:a=1{AUDIO_OUT}"));

        parts.join("; ")
    }
}
