use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::model::SignalFrame;

/// One recorded telemetry sample, with its time rebased to the start of the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFrame {
    pub offset: Duration,
    pub signals: SignalFrame,
    pub cancel: bool,
}

#[derive(Deserialize)]
struct TraceLine {
    at: String,
    #[serde(default)]
    signals: SignalFrame,
    #[serde(default)]
    cancel: bool,
}

fn parse_line(line: &str) -> Result<(DateTime<Utc>, TraceLine), String> {
    let parsed: TraceLine = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let at = DateTime::parse_from_rfc3339(&parsed.at)
        .map_err(|e| format!("bad timestamp '{}': {}", parsed.at, e))?
        .with_timezone(&Utc);
    Ok((at, parsed))
}

/// Read a JSON-lines signal trace. Malformed lines are skipped with a warning.
pub fn read_trace(path: &Path) -> io::Result<Vec<TraceFrame>> {
    let reader = BufReader::new(File::open(path)?);
    read_trace_from(reader)
}

pub fn read_trace_from<R: BufRead>(reader: R) -> io::Result<Vec<TraceFrame>> {
    let mut stamped = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_line(trimmed) {
            Ok(entry) => stamped.push(entry),
            Err(e) => log::warn!("Skipping trace line {}: {}", idx + 1, e),
        }
    }

    // Stable: frames sharing a timestamp keep file order.
    stamped.sort_by_key(|(at, _)| *at);

    let Some(start) = stamped.first().map(|(at, _)| *at) else {
        return Ok(Vec::new());
    };
    Ok(stamped
        .into_iter()
        .map(|(at, line)| TraceFrame {
            offset: (at - start).to_std().unwrap_or(Duration::ZERO),
            signals: line.signals,
            cancel: line.cancel,
        })
        .collect())
}

/// One step of simulated time.
#[derive(Debug, Clone)]
pub struct ReplayTick {
    pub now: Duration,
    /// Latest value of every signal seen so far.
    pub signals: SignalFrame,
    /// Cancel presses that fell inside this step, at their recorded times.
    pub cancel_presses: Vec<Duration>,
}

/// Steps through a trace in fixed increments. Signals are sample-and-hold:
/// a value stays in effect until a later frame overrides it.
pub struct ReplayController {
    frames: Vec<TraceFrame>,
    /// Index of the next frame not yet delivered
    cursor: usize,
    step: Duration,
    /// Extra simulated time after the last frame
    tail: Duration,
    current_sim_time: Duration,
    /// Sample-and-hold view of every signal delivered so far
    held: SignalFrame,
}

impl ReplayController {
    pub fn new(frames: Vec<TraceFrame>, step: Duration) -> Self {
        Self {
            frames,
            cursor: 0,
            step: step.max(Duration::from_millis(1)),
            tail: Duration::ZERO,
            current_sim_time: Duration::ZERO,
            held: SignalFrame::new(),
        }
    }

    /// Keep ticking this long after the last frame so timers can run out.
    pub fn with_tail(mut self, tail: Duration) -> Self {
        self.tail = tail;
        self
    }

    pub fn session_duration(&self) -> Duration {
        self.frames.last().map(|f| f.offset).unwrap_or(Duration::ZERO)
    }

    pub fn current_sim_time(&self) -> Duration {
        self.current_sim_time
    }

    /// Every frame delivered and simulated time is past the tail.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.frames.len() && self.current_sim_time > self.session_duration() + self.tail
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.current_sim_time = Duration::ZERO;
        self.held = SignalFrame::new();
    }

    pub fn step(&mut self) -> Option<ReplayTick> {
        if self.is_finished() {
            return None;
        }
        let now = self.current_sim_time;

        let mut cancel_presses = Vec::new();
        while let Some(frame) = self.frames.get(self.cursor) {
            if frame.offset > now {
                break;
            }
            self.held.merge(&frame.signals);
            if frame.cancel {
                cancel_presses.push(frame.offset);
            }
            self.cursor += 1;
        }

        self.current_sim_time += self.step;
        Some(ReplayTick {
            now,
            signals: self.held.clone(),
            cancel_presses,
        })
    }
}

impl Iterator for ReplayController {
    type Item = ReplayTick;

    fn next(&mut self) -> Option<Self::Item> {
        self.step()
    }
}
