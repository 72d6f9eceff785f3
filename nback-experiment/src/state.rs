use nback_core::{
    Channel, Color, EngineState, InputSource, Metrics, Outcome, StimulusOutput, TrialRecord,
};
use nback_timing::Clock;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::collector::{format_timestamp, DataCollector};
use crate::config::{ConfigError, DeviceSettings, SessionConfig};
use crate::error::{EngineError, Operation};
use crate::input::{InputMode, InputReader};
use crate::sequence::{self, CustomSequence};
use crate::trial::TrialState;

/// Diagnostic mode bookkeeping: where to return, the palette position and
/// the per-press flash.
#[derive(Debug, Clone, Default)]
struct DebugState {
    return_to: EngineState,
    color_index: usize,
    last_color_change: u64,
    last_report: u64,
    flash_start: Option<u64>,
}

impl DebugState {
    fn suspends_session(&self) -> bool {
        self.return_to.is_session_active()
    }
}

/// The N-back trial engine.
///
/// Owns the output device, the input source, the clock and the RNG. Nothing
/// in here blocks: commands change state immediately and [`tick`] advances
/// every timer by comparing the clock against stored timestamps. Serial
/// output is queued and handed out by [`drain_output`].
///
/// [`tick`]: NBackEngine::tick
/// [`drain_output`]: NBackEngine::drain_output
pub struct NBackEngine<O, I, C, R>
where
    O: StimulusOutput,
    I: InputSource,
    C: Clock,
    R: Rng,
{
    state: EngineState,
    config: SessionConfig,
    settings: DeviceSettings,
    output: O,
    input: I,
    clock: C,
    rng: R,
    reader: InputReader,
    sequence: Vec<Color>,
    custom_sequence: bool,
    trial: TrialState,
    completed_trials: usize,
    metrics: Metrics,
    collector: DataCollector,
    debug: DebugState,
    /// Clock reading when the session timers were frozen.
    frozen_at: Option<u64>,
    /// Last symbol written to the output. `None` until the first write.
    rendered: Option<Option<Color>>,
    outbox: Vec<String>,
}

impl<O, I, C, R> NBackEngine<O, I, C, R>
where
    O: StimulusOutput,
    I: InputSource,
    C: Clock,
    R: Rng,
{
    pub fn new(
        settings: DeviceSettings,
        output: O,
        input: I,
        clock: C,
        mut rng: R,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        let config = SessionConfig::default();
        config.validate(&settings)?;
        let sequence = sequence::generate(
            &mut rng,
            config.n_back_level,
            config.trial_count,
            Color::GENERATED,
        )
        .map_err(ConfigError::from)?;

        Ok(Self {
            state: EngineState::Idle,
            reader: InputReader::new(&settings),
            collector: DataCollector::new(settings.record_capacity),
            config,
            settings,
            output,
            input,
            clock,
            rng,
            sequence,
            custom_sequence: false,
            trial: TrialState::default(),
            completed_trials: 0,
            metrics: Metrics::default(),
            debug: DebugState::default(),
            frozen_at: None,
            rendered: None,
            outbox: Vec::new(),
        })
    }

    /// Greeting printed once after power-up.
    pub fn boot(&mut self) {
        for line in [
            "N-Back Task",
            "Commands:",
            "- 'debug' to enter debug mode and test hardware",
            "- 'exit-debug' to exit debug mode",
            "- 'start' to begin task",
            "- 'pause' to pause/resume task",
            "- 'exit' to cancel the current task and discard data",
            "- 'get_data' to retrieve collected data",
            "- 'config stimDur,interStimInt,nBackLvl,trials,studyId,sessionNum' to configure all parameters",
            "- 'input_mode 0|1' to set input mode (0=button, 1=touch)",
            "- 'input_mode' to forward button presses to the host",
            "ready",
        ] {
            self.emit(line);
        }
        self.render();
        info!(mode = self.reader.mode().name(), "engine ready");
    }

    /// Validates and installs a new session configuration.
    ///
    /// The sequence is built before anything is committed, so a rejected
    /// configuration leaves the previous one in place. Returns the outcome
    /// of laying `custom` over the sequence when one was given.
    pub fn configure(
        &mut self,
        config: SessionConfig,
        custom: Option<&str>,
    ) -> Result<Option<CustomSequence>, EngineError> {
        if !self.can_configure() {
            return Err(EngineError::invalid(Operation::Configure, self.state));
        }
        config.validate(&self.settings)?;

        let mut sequence = sequence::generate(
            &mut self.rng,
            config.n_back_level,
            config.trial_count,
            Color::GENERATED,
        )
        .map_err(ConfigError::from)?;
        let custom_report = custom.map(|list| sequence::apply_custom(&mut sequence, list));

        self.sequence = sequence;
        self.custom_sequence = custom_report.is_some();
        self.config = config;
        self.metrics = Metrics::default();
        self.collector.reset();
        self.trial = TrialState::default();
        self.completed_trials = 0;
        match self.state {
            EngineState::DataReady => self.state = EngineState::Idle,
            EngineState::Debug => self.debug.return_to = EngineState::Idle,
            _ => {}
        }

        info!(
            n_back = self.config.n_back_level,
            trials = self.config.trial_count,
            study = %self.config.study_id,
            custom = self.custom_sequence,
            "configuration applied"
        );
        self.emit("Configuration updated:");
        self.emit(format!(
            "Stimulus Duration: {}ms",
            self.config.stimulus_duration_ms
        ));
        self.emit(format!(
            "Inter-Stimulus Interval: {}ms",
            self.config.inter_stimulus_interval_ms
        ));
        self.emit(format!("N-back Level: {}", self.config.n_back_level));
        self.emit(format!("Number of Trials: {}", self.config.trial_count));
        self.emit(format!("Study ID: {}", self.config.study_id));
        self.emit(format!("Session Number: {}", self.config.session_number));
        Ok(custom_report)
    }

    /// Begins a session from IDLE or DEBUG. A suspended session is dropped.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if !self.state.can_start() {
            return Err(EngineError::invalid(Operation::Start, self.state));
        }
        if !self.custom_sequence {
            self.sequence = sequence::generate(
                &mut self.rng,
                self.config.n_back_level,
                self.config.trial_count,
                Color::GENERATED,
            )
            .map_err(ConfigError::from)?;
        }

        let now = self.clock.now();
        if self.state == EngineState::Debug {
            self.emit("exiting debug mode");
            if self.debug.suspends_session() {
                warn!("abandoning suspended session");
            }
        }

        self.metrics = Metrics::default();
        self.trial = TrialState::default();
        self.completed_trials = 0;
        self.frozen_at = None;
        self.collector
            .begin(&self.config.study_id, self.config.session_number, now);

        self.emit(format!("sync {now}"));
        let payload = format!(
            "n-back_level:{},stim_duration:{},inter_stim_interval:{},trials:{}",
            self.config.n_back_level,
            self.config.stimulus_duration_ms,
            self.config.inter_stimulus_interval_ms,
            self.config.trial_count
        );
        let event = self.collector.realtime_event("start", &payload, now);
        self.emit(event);

        self.state = EngineState::Running;
        self.emit("Task started");
        self.emit(format!("N-back level: {}", self.config.n_back_level));
        self.emit(format!("Study ID: {}", self.config.study_id));
        debug!(
            sequence = %sequence::describe(&self.sequence, self.config.n_back_level),
            targets = sequence::target_count(&self.sequence, self.config.n_back_level),
            "sequence generated"
        );

        self.start_next_trial(0, now);
        self.render();
        Ok(())
    }

    /// RUNNING ⇄ PAUSED. Session timers stand still while paused.
    pub fn toggle_pause(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        let (line, event) = match self.state {
            EngineState::Running => {
                self.freeze(now);
                self.state = EngineState::Paused;
                ("Task paused", "pause")
            }
            EngineState::Paused => {
                self.thaw(now);
                self.state = EngineState::Running;
                ("Task resumed", "resume")
            }
            state => return Err(EngineError::invalid(Operation::Pause, state)),
        };
        self.emit(line);
        let event = self.collector.realtime_event(event, "", now);
        self.emit(event);
        self.render();
        Ok(())
    }

    pub fn enter_debug(&mut self) -> Result<(), EngineError> {
        let from = self.state;
        if !matches!(
            from,
            EngineState::Idle | EngineState::Running | EngineState::Paused | EngineState::DataReady
        ) {
            return Err(EngineError::invalid(Operation::EnterDebug, from));
        }

        let now = self.clock.now();
        if from == EngineState::Running {
            self.freeze(now);
        }
        self.debug = DebugState {
            return_to: from,
            color_index: 0,
            last_color_change: now,
            last_report: now,
            flash_start: None,
        };
        self.state = EngineState::Debug;
        info!(from = %from, "entered debug mode");

        self.emit("enter debug mode");
        self.emit("*** DEBUG MODE ***");
        self.emit("Testing NeoPixel and button. NeoPixel will cycle through colors.");
        self.emit("Press the button to test it.");
        self.emit("Send 'exit-debug' to return to IDLE state or 'start' to begin task.");
        self.render();
        Ok(())
    }

    /// Returns to the state debug mode was entered from.
    pub fn exit_debug(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Debug {
            return Err(EngineError::invalid(Operation::ExitDebug, self.state));
        }
        let now = self.clock.now();
        let back = self.debug.return_to;
        self.debug.flash_start = None;
        self.state = back;
        if back == EngineState::Running {
            self.thaw(now);
        }

        self.emit("exiting debug mode");
        if back == EngineState::Idle {
            self.emit("ready");
        }
        self.render();
        Ok(())
    }

    /// Cancels a session, leaves DATA_READY, or leaves input forwarding.
    pub fn exit(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        match self.state {
            EngineState::Running | EngineState::Paused => self.end_session_early(now),
            EngineState::Debug if self.debug.suspends_session() => self.end_session_early(now),
            EngineState::DataReady => {
                self.collector.reset();
                self.state = EngineState::Idle;
                self.emit("exiting");
                self.emit("ready");
            }
            EngineState::InputForwarding => {
                self.reader.reset(now);
                self.state = EngineState::Idle;
                self.emit("INPUT_MODE_EXIT");
                self.emit("ready");
            }
            state => return Err(EngineError::invalid(Operation::Exit, state)),
        }
        self.render();
        Ok(())
    }

    /// Streams the session report and returns to IDLE.
    pub fn get_data(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::DataReady {
            return Err(EngineError::invalid(Operation::GetData, self.state));
        }
        let now = self.clock.now();
        self.emit(format!(
            "Sending data for {} recorded trials...",
            self.collector.trial_count()
        ));
        let report = self.collector.session_report(now);
        self.outbox.extend(report);
        self.emit("data-completed");
        self.state = EngineState::Idle;
        self.render();
        Ok(())
    }

    pub fn set_input_mode(&mut self, mode: InputMode) -> Result<(), EngineError> {
        if self.session_in_progress() {
            return Err(EngineError::invalid(Operation::SetInputMode, self.state));
        }
        let now = self.clock.now();
        self.reader.set_mode(mode, now);
        info!(mode = mode.name(), "input mode changed");
        self.emit(format!("Input mode set to {}", mode.name()));
        Ok(())
    }

    /// IDLE → INPUT_FORWARDING. Every press is relayed to the host.
    pub fn enter_input_forwarding(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Idle {
            return Err(EngineError::invalid(Operation::ForwardInput, self.state));
        }
        let now = self.clock.now();
        self.collector
            .begin(&self.config.study_id, self.config.session_number, now);
        self.reader.reset(now);
        self.state = EngineState::InputForwarding;
        self.emit("Nback Entering INPUT MODE");
        self.emit("Send 'exit' to return to IDLE state");
        self.render();
        Ok(())
    }

    pub fn sync(&mut self) {
        let now = self.clock.now();
        self.emit(format!("sync {now}"));
    }

    /// One iteration of the poll loop.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        match self.state {
            EngineState::Running => self.tick_running(now),
            EngineState::Debug => self.tick_debug(now),
            EngineState::InputForwarding => self.tick_forwarding(now),
            EngineState::Idle | EngineState::Paused | EngineState::DataReady => {}
        }
        self.render();
    }

    fn tick_running(&mut self, now: u64) {
        if self.trial.flags.feedback_active
            && now.saturating_sub(self.trial.timestamps.feedback_start)
                >= self.settings.feedback_duration_ms
        {
            self.trial.flags.feedback_active = false;
        }

        if !self.trial.flags.feedback_active {
            if let Some(channel) = self.reader.poll(&mut self.input, now) {
                self.handle_response(channel, now);
            }
        }

        self.manage_trial(now);
    }

    fn handle_response(&mut self, channel: Channel, now: u64) {
        let at = self.collector.relative(now);
        match self.trial.capture(channel, now, at) {
            Some(response) => {
                info!(
                    trial = self.trial.index + 1,
                    channel = %channel,
                    rt_ms = response.reaction_time_ms,
                    "response captured"
                );
                self.trial.flags.feedback_active = true;
                self.trial.timestamps.feedback_start = now;
            }
            None => debug!(channel = %channel, "press outside response window ignored"),
        }
    }

    fn manage_trial(&mut self, now: u64) {
        let flags = &self.trial.flags;
        if flags.awaiting_response {
            let timed_out = now.saturating_sub(self.trial.timestamps.trial_start)
                >= self.config.stimulus_duration_ms;
            if flags.response_made || timed_out {
                self.end_trial(now);
            }
        } else if flags.in_inter_stimulus_interval
            && now.saturating_sub(self.trial.timestamps.stimulus_end)
                >= self.config.inter_stimulus_interval_ms
        {
            self.trial.flags.in_inter_stimulus_interval = false;
            let next = self.trial.index + 1;
            if next < self.sequence.len() {
                self.start_next_trial(next, now);
            } else {
                self.finish(now);
            }
        }
    }

    fn start_next_trial(&mut self, index: usize, now: u64) {
        let target = sequence::is_target(&self.sequence, index, self.config.n_back_level);
        let onset = self.collector.relative(now);
        self.trial.begin(index, now, onset, target);
        debug!(
            trial = index + 1,
            color = %self.sequence[index],
            target,
            onset = %format_timestamp(onset),
            "trial started"
        );
    }

    fn end_trial(&mut self, now: u64) {
        self.trial.flags.awaiting_response = false;
        self.trial.timestamps.stimulus_end = now;
        self.emit("trial-complete");

        let record = self.evaluate(now);
        self.completed_trials += 1;
        // Streamed even when the store is full.
        let line = self.collector.realtime_record(&record);
        self.collector.record_completed_trial(record);
        self.emit(line);

        self.trial.flags.in_inter_stimulus_interval = true;
    }

    /// Classifies the current trial and folds it into the metrics.
    fn evaluate(&mut self, now: u64) -> TrialRecord {
        let flags = &self.trial.flags;
        let outcome = Outcome::classify(
            flags.target_trial,
            flags.response_made,
            flags.response_is_confirm,
        );
        let response = self.trial.response;
        self.metrics
            .apply(outcome, response.map(|r| r.reaction_time_ms));

        info!(
            trial = self.trial.index + 1,
            target = flags.target_trial,
            outcome = outcome.label(),
            "trial evaluated"
        );

        TrialRecord {
            stimulus_number: self.trial.index + 1,
            color: self.sequence[self.trial.index],
            is_target: flags.target_trial,
            response_made: flags.response_made,
            response_is_confirm: flags.response_is_confirm,
            outcome,
            onset_ms: self.trial.timestamps.onset,
            response_ms: response.map_or(0, |r| r.at_ms),
            reaction_time_ms: response.map_or(0, |r| r.reaction_time_ms),
            end_ms: self.collector.relative(now),
        }
    }

    /// Session over: summary, then wait for `get_data`.
    fn finish(&mut self, now: u64) {
        self.state = EngineState::DataReady;
        self.trial.flags = Default::default();
        self.frozen_at = None;
        self.collector.mark_completed(now);
        self.report_results(now);
        self.emit("task-completed");
        info!(
            records = self.collector.trial_count(),
            hit_rate = self.metrics.hit_rate(),
            "session complete"
        );
    }

    fn end_session_early(&mut self, now: u64) {
        if self.settings.finalize_on_exit {
            info!(trials = self.completed_trials, "session finalized early");
            self.finish(now);
            return;
        }
        info!(trials = self.completed_trials, "session discarded");
        self.collector.reset();
        self.trial = TrialState::default();
        self.frozen_at = None;
        self.state = EngineState::Idle;
        self.emit("exiting");
        self.emit("ready");
    }

    fn report_results(&mut self, now: u64) {
        let m = self.metrics.clone();
        let duration = format_timestamp(self.collector.relative(now));
        self.emit("=== TASK COMPLETE ===");
        self.emit(format!("N-Back Level: {}", self.config.n_back_level));
        self.emit(format!("Total Trials: {}", self.completed_trials));
        self.emit(format!("Total Targets: {}", m.total_targets()));
        self.emit(format!("Correct Responses: {}", m.correct_responses));
        self.emit(format!("False Alarms: {}", m.false_alarms));
        self.emit(format!("Missed Targets: {}", m.missed_targets));
        self.emit(format!("Hit Rate: {:.2}%", m.hit_rate()));
        self.emit(format!(
            "Average Reaction Time (responses only): {:.2} ms",
            m.average_reaction_time_ms()
        ));
        self.emit(format!("Session Duration: {duration}"));
        self.emit("======================");
    }

    fn tick_debug(&mut self, now: u64) {
        if let Some(start) = self.debug.flash_start {
            if now.saturating_sub(start) >= self.settings.feedback_duration_ms {
                self.debug.flash_start = None;
            }
        }

        if now.saturating_sub(self.debug.last_color_change) >= self.settings.debug_color_interval_ms
        {
            self.debug.color_index = (self.debug.color_index + 1) % Color::PALETTE.len();
            self.debug.last_color_change = now;
            let color = Color::PALETTE[self.debug.color_index];
            self.emit(format!(
                "Debug: Showing color {} ({})",
                self.debug.color_index,
                color.name().to_uppercase()
            ));
        }

        if self.reader.mode() == InputMode::Touch
            && now.saturating_sub(self.debug.last_report) >= self.settings.debug_report_interval_ms
        {
            self.debug.last_report = now;
            let confirm = self.reader.raw_reading(&mut self.input, Channel::Confirm);
            let wrong = self.reader.raw_reading(&mut self.input, Channel::Wrong);
            self.emit(format!("Touch value: {confirm} Touch value 2: {wrong}"));
        }

        for channel in Channel::ALL {
            if self.reader.is_pressed(&mut self.input, channel, now) {
                self.emit(format!("Debug: {} BUTTON PRESSED!", channel.tag()));
                self.debug.flash_start = Some(now);
            }
        }
    }

    fn tick_forwarding(&mut self, now: u64) {
        for channel in Channel::ALL {
            if self.reader.is_pressed(&mut self.input, channel, now) {
                self.emit(format!("button-press:{}", channel.tag()));
                let event = self
                    .collector
                    .realtime_event("input_forwarded", channel.tag(), now);
                self.emit(event);
            }
        }
    }

    fn freeze(&mut self, now: u64) {
        if self.frozen_at.is_none() {
            self.frozen_at = Some(now);
        }
    }

    fn thaw(&mut self, now: u64) {
        if let Some(at) = self.frozen_at.take() {
            let frozen = now.saturating_sub(at);
            self.trial.shift(frozen);
            debug!(frozen_ms = frozen, "session timers resumed");
        }
    }

    fn desired_output(&self) -> Option<Color> {
        match self.state {
            EngineState::Running if self.trial.flags.feedback_active => Some(Color::FEEDBACK),
            EngineState::Running if self.trial.flags.awaiting_response => {
                self.sequence.get(self.trial.index).copied()
            }
            EngineState::Debug if self.debug.flash_start.is_some() => Some(Color::FEEDBACK),
            EngineState::Debug => Color::from_index(self.debug.color_index),
            _ => None,
        }
    }

    fn render(&mut self) {
        let desired = self.desired_output();
        if self.rendered != Some(desired) {
            self.output.set_output(desired);
            self.rendered = Some(desired);
        }
    }

    fn can_configure(&self) -> bool {
        match self.state {
            EngineState::Idle | EngineState::DataReady => true,
            EngineState::Debug => !self.debug.suspends_session(),
            _ => false,
        }
    }

    /// A session is running, paused, or suspended under debug mode.
    fn session_in_progress(&self) -> bool {
        self.state.is_session_active()
            || (self.state == EngineState::Debug && self.debug.suspends_session())
    }

    pub(crate) fn emit(&mut self, line: impl Into<String>) {
        self.outbox.push(line.into());
    }

    /// Takes every queued serial line, oldest first.
    pub fn drain_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn sequence(&self) -> &[Color] {
        &self.sequence
    }

    pub fn has_custom_sequence(&self) -> bool {
        self.custom_sequence
    }

    pub fn trial(&self) -> &TrialState {
        &self.trial
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn records(&self) -> &[TrialRecord] {
        self.collector.records()
    }

    pub fn input_mode(&self) -> InputMode {
        self.reader.mode()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }
}
