//! Per-session trial storage and the serial data protocol.
//!
//! Host tooling parses these lines verbatim: the header text, field order,
//! `$$$` section markers and timestamp layout must not change.

use nback_core::TrialRecord;
use tracing::warn;

pub const TASK_TYPE: &str = "n-back";
/// Lines starting with this are persisted by the host as soon as they arrive.
pub const REALTIME_PREFIX: &str = "write>";
pub const SECTION_MARKER: &str = "$$$";
pub const TRIAL_HEADER: &str = "Format=study_id,session_number,timestamp,task_type,event_type,stimulus_number,stimulus_color,is_target,response_made,is_correct,stimulus_onset_time,response_time,reaction_time,stimulus_end_time";
pub const SESSION_HEADER: &str = "Format=study_id,session_number,start_time_millis,start_time,completion_time,total_duration,total_trials";

/// `HH:MM:SS:mmm` from a millisecond count. Hours do not wrap.
pub fn format_timestamp(ms: u64) -> String {
    let total_seconds = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}:{:03}",
        total_seconds / 3600,
        (total_seconds / 60) % 60,
        total_seconds % 60,
        ms % 1000
    )
}

#[derive(Debug, Clone)]
pub struct DataCollector {
    study_id: String,
    session_number: u16,
    /// Absolute clock reading when the session started.
    start_ms: u64,
    completed_ms: Option<u64>,
    records: Vec<TrialRecord>,
    capacity: usize,
}

impl DataCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            study_id: String::new(),
            session_number: 0,
            start_ms: 0,
            completed_ms: None,
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Stamps a new session and clears any stored records.
    pub fn begin(&mut self, study_id: &str, session_number: u16, start_ms: u64) {
        self.study_id = study_id.to_string();
        self.session_number = session_number;
        self.start_ms = start_ms;
        self.completed_ms = None;
        self.records.clear();
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.completed_ms = None;
    }

    /// Appends unless full. A full collector drops the record; the session
    /// carries on.
    pub fn record_completed_trial(&mut self, record: TrialRecord) -> bool {
        if self.records.len() >= self.capacity {
            warn!(
                stimulus = record.stimulus_number,
                capacity = self.capacity,
                "record capacity exhausted, dropping trial"
            );
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn mark_completed(&mut self, now: u64) {
        self.completed_ms = Some(now);
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn trial_count(&self) -> usize {
        self.records.len()
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    /// Milliseconds since session start.
    pub fn relative(&self, now: u64) -> u64 {
        now.saturating_sub(self.start_ms)
    }

    /// One report row. Also the body of a trial's real-time event.
    pub fn record_row(&self, r: &TrialRecord) -> String {
        format!(
            "{},{},{},{},trial_complete,{},{},{},{},{},{},{},{},{}",
            self.study_id,
            self.session_number,
            format_timestamp(r.end_ms),
            TASK_TYPE,
            r.stimulus_number,
            r.color.name(),
            r.is_target,
            r.response_made,
            r.is_correct(),
            format_timestamp(r.onset_ms),
            format_timestamp(r.response_ms),
            r.reaction_time_ms,
            format_timestamp(r.end_ms),
        )
    }

    pub fn realtime_record(&self, r: &TrialRecord) -> String {
        format!("{REALTIME_PREFIX}{}", self.record_row(r))
    }

    /// Timestamped event outside the trial table (start, pause, ...).
    pub fn realtime_event(&self, event: &str, payload: &str, now: u64) -> String {
        format!(
            "{REALTIME_PREFIX}{},{},{},{},{},{}",
            self.study_id,
            self.session_number,
            format_timestamp(self.relative(now)),
            TASK_TYPE,
            event,
            payload
        )
    }

    /// Full end-of-session dump. `now` stands in for the completion time if
    /// the session was never marked complete.
    pub fn session_report(&self, now: u64) -> Vec<String> {
        if self.records.is_empty() {
            return vec!["No data to send".to_string()];
        }

        let completed = self.completed_ms.unwrap_or(now);
        let mut lines = Vec::with_capacity(self.records.len() + 9);
        lines.push("Opening Data Socket".to_string());
        lines.push(TRIAL_HEADER.to_string());
        lines.push(SECTION_MARKER.to_string());
        lines.extend(self.records.iter().map(|r| self.record_row(r)));
        lines.push(SECTION_MARKER.to_string());
        lines.push(SESSION_HEADER.to_string());
        lines.push(SECTION_MARKER.to_string());
        lines.push(format!(
            "{},{},{},{},{},{},{}",
            self.study_id,
            self.session_number,
            self.start_ms,
            format_timestamp(self.start_ms),
            format_timestamp(completed),
            format_timestamp(completed.saturating_sub(self.start_ms)),
            self.records.len()
        ));
        lines.push(SECTION_MARKER.to_string());
        lines.push("Closing Data Socket".to_string());
        lines
    }
}
