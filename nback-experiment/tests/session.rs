use nback_core::{Channel, Color, EngineState, InputSource, Level, Outcome, StimulusOutput};
use nback_experiment::{dispatch, DeviceSettings, NBackEngine};
use nback_timing::ManualClock;
use rand::rngs::StdRng;
use rand::SeedableRng;

const T0: u64 = 10_000;

#[derive(Default)]
struct RecordingPixel {
    writes: Vec<Option<Color>>,
}

impl StimulusOutput for RecordingPixel {
    fn set_output(&mut self, color: Option<Color>) {
        self.writes.push(color);
    }
}

#[derive(Default)]
struct ScriptedPins {
    digital: [Level; 2],
}

impl ScriptedPins {
    fn hold(&mut self, channel: Channel, down: bool) {
        self.digital[channel as usize] = if down { Level::Low } else { Level::High };
    }
}

impl InputSource for ScriptedPins {
    fn read_digital(&mut self, channel: Channel) -> Level {
        self.digital[channel as usize]
    }

    fn read_touch(&mut self, _channel: Channel) -> u16 {
        60
    }
}

struct Rig {
    engine: NBackEngine<RecordingPixel, ScriptedPins, ManualClock, StdRng>,
    clock: ManualClock,
}

impl Rig {
    fn new(settings: DeviceSettings) -> Self {
        let clock = ManualClock::new(T0);
        let engine = NBackEngine::new(
            settings,
            RecordingPixel::default(),
            ScriptedPins::default(),
            clock.clone(),
            StdRng::seed_from_u64(42),
        )
        .unwrap();
        Self { engine, clock }
    }

    fn with_min_trials(min_trials: usize) -> Self {
        Self::new(DeviceSettings {
            min_trials,
            ..DeviceSettings::default()
        })
    }

    fn send(&mut self, line: &str) -> Vec<String> {
        dispatch(&mut self.engine, line);
        self.engine.drain_output()
    }

    fn run(&mut self, ms: u64) -> Vec<String> {
        for _ in 0..ms {
            self.clock.advance(1);
            self.engine.tick();
        }
        self.engine.drain_output()
    }

    /// Ticks until trial `n` (1-based) is showing its stimulus.
    fn wait_for_trial(&mut self, n: usize) -> Vec<String> {
        let mut lines = Vec::new();
        for _ in 0..10_000 {
            let trial = self.engine.trial();
            if self.engine.state() == EngineState::Running
                && trial.index + 1 == n
                && trial.flags.awaiting_response
            {
                return lines;
            }
            lines.extend(self.run(1));
        }
        panic!("trial {n} never started");
    }

    /// Holds the channel long enough to pass debounce, then lets go.
    fn press(&mut self, channel: Channel) -> Vec<String> {
        self.engine.input_mut().hold(channel, true);
        let lines = self.run(30);
        self.engine.input_mut().hold(channel, false);
        lines
    }

    fn run_to_completion(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for _ in 0..100_000 {
            if self.engine.state() == EngineState::DataReady {
                return lines;
            }
            lines.extend(self.run(1));
        }
        panic!("session never completed");
    }
}

fn contains(lines: &[String], wanted: &str) -> bool {
    lines.iter().any(|l| l == wanted)
}

#[test]
fn custom_sequence_round_trip() {
    let mut rig = Rig::with_min_trials(4);
    let reply = rig.send("config 500,300,2,4,S01,1,%red,green,red,blue%");
    assert_eq!(
        &reply[reply.len() - 2..],
        ["Configuration applied successfully", "Custom color sequence applied successfully"]
    );
    assert_eq!(
        rig.engine.sequence(),
        &[Color::Red, Color::Green, Color::Red, Color::Blue]
    );

    let started = rig.send("start");
    assert_eq!(
        started,
        vec![
            "sync 10000",
            "write>S01,1,00:00:00:000,n-back,start,n-back_level:2,stim_duration:500,inter_stim_interval:300,trials:4",
            "Task started",
            "N-back level: 2",
            "Study ID: S01",
        ]
    );

    let lines = rig.run_to_completion();
    let targets: Vec<bool> = rig.engine.records().iter().map(|r| r.is_target).collect();
    assert_eq!(targets, vec![false, false, true, false]);
    assert_eq!(rig.engine.records()[2].outcome, Outcome::Miss);

    assert_eq!(lines.iter().filter(|l| *l == "trial-complete").count(), 4);
    assert!(contains(
        &lines,
        "write>S01,1,00:00:02:100,n-back,trial_complete,3,red,true,false,false,00:00:01:600,00:00:00:000,0,00:00:02:100"
    ));
    assert!(contains(&lines, "Total Targets: 1"));
    assert!(contains(&lines, "Hit Rate: 0.00%"));
    assert!(contains(&lines, "Average Reaction Time (responses only): 0.00 ms"));
    assert!(contains(&lines, "Session Duration: 00:00:03:200"));
    assert_eq!(lines.last().map(String::as_str), Some("task-completed"));

    let data = rig.send("get_data");
    assert_eq!(data[0], "Sending data for 4 recorded trials...");
    assert_eq!(data[1], "Opening Data Socket");
    assert_eq!(
        data[6],
        "S01,1,00:00:02:100,n-back,trial_complete,3,red,true,false,false,00:00:01:600,00:00:00:000,0,00:00:02:100"
    );
    assert_eq!(data[11], "S01,1,10000,00:00:10:000,00:00:13:200,00:00:03:200,4");
    assert_eq!(data[13], "Closing Data Socket");
    assert_eq!(data.last().map(String::as_str), Some("data-completed"));
    assert_eq!(rig.engine.state(), EngineState::Idle);
}

#[test]
fn target_flag_follows_n_back_definition() {
    let mut rig = Rig::with_min_trials(4);
    rig.send("config 500,300,2,4,S01,1,%red,green,blue,red%");
    rig.send("start");
    rig.run_to_completion();
    assert!(rig.engine.records().iter().all(|r| !r.is_target));
}

#[test]
fn responses_are_classified_and_counted() {
    let mut rig = Rig::new(DeviceSettings::default());
    rig.send("config 500,300,1,5,S02,2,%red,red,green,blue,blue%");
    rig.send("start");

    rig.press(Channel::Confirm); // non-target: false alarm
    rig.wait_for_trial(2);
    rig.press(Channel::Confirm); // target: hit
    rig.wait_for_trial(3);
    rig.press(Channel::Wrong); // non-target: correct rejection
    rig.wait_for_trial(5);
    rig.press(Channel::Wrong); // target, wrong channel: miss
    rig.run_to_completion();

    let outcomes: Vec<Outcome> = rig.engine.records().iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            Outcome::FalseAlarm,
            Outcome::Hit,
            Outcome::CorrectRejection,
            Outcome::CorrectRejection,
            Outcome::Miss,
        ]
    );

    let m = rig.engine.metrics().clone();
    let target_records = rig.engine.records().iter().filter(|r| r.is_target).count();
    assert_eq!((m.correct_responses + m.missed_targets) as usize, target_records);
    let answered_non_targets = rig
        .engine
        .records()
        .iter()
        .filter(|r| !r.is_target && r.response_made && r.response_is_confirm)
        .count();
    assert_eq!(m.false_alarms as usize, answered_non_targets);
    assert_eq!(m.reaction_time_count, 4);

    let hit = &rig.engine.records()[1];
    assert!(hit.response_made);
    assert_eq!(hit.reaction_time_ms, 22);
    assert_eq!(hit.response_ms, hit.onset_ms + 22);
    assert_eq!(hit.end_ms, hit.response_ms);
}

#[test]
fn only_the_first_press_is_recorded() {
    let mut rig = Rig::new(DeviceSettings::default());
    rig.send("config 1000,300,1,5,S03,1");
    rig.send("start");

    rig.engine.input_mut().hold(Channel::Confirm, true);
    rig.engine.input_mut().hold(Channel::Wrong, true);
    rig.run(30);
    rig.engine.input_mut().hold(Channel::Confirm, false);
    rig.engine.input_mut().hold(Channel::Wrong, false);
    rig.run(150);
    rig.press(Channel::Wrong);

    assert_eq!(rig.engine.records().len(), 1);
    let r = &rig.engine.records()[0];
    assert!(r.response_is_confirm);
    assert_eq!(r.reaction_time_ms, 22);
}

#[test]
fn pause_holds_the_response_window() {
    let mut rig = Rig::new(DeviceSettings::default());
    rig.send("config 500,300,2,5,S04,1");
    rig.send("start");
    rig.run(300);

    let paused = rig.send("pause");
    assert_eq!(
        paused,
        vec!["Task paused", "write>S04,1,00:00:00:300,n-back,pause,"]
    );
    rig.run(5_000);
    assert!(rig.engine.records().is_empty());

    let resumed = rig.send("pause");
    assert_eq!(
        resumed,
        vec!["Task resumed", "write>S04,1,00:00:05:300,n-back,resume,"]
    );
    assert!(rig.engine.trial().flags.awaiting_response);

    rig.run(199);
    assert!(rig.engine.records().is_empty());
    let lines = rig.run(1);
    assert_eq!(lines[0], "trial-complete");
    assert_eq!(rig.engine.records()[0].end_ms, 5_500);
}

#[test]
fn malformed_config_keeps_previous_configuration() {
    let mut rig = Rig::new(DeviceSettings::default());
    rig.send("config 800,400,2,10,S05,7");
    let before = rig.engine.config().clone();

    let reply = rig.send("config 800,abc,2,10,S05,7");
    assert_eq!(
        reply,
        vec!["Invalid config format. Use: config stimDuration,interStimulusInterval,nBackLevel,trialsNumber,study_id,session_number[,%color1,color2,...%]"]
    );
    let reply = rig.send("config 50,400,2,10,S05,7");
    assert_eq!(reply, vec!["Failed to apply configuration - invalid parameters"]);
    let reply = rig.send("config 800,400,2,10,TOOLONGID1,7");
    assert_eq!(reply, vec!["Failed to apply configuration - invalid parameters"]);
    assert_eq!(rig.engine.config(), &before);

    rig.send("start");
    let reply = rig.send("config 900,400,2,10,S05,7");
    assert_eq!(reply, vec!["Failed to apply configuration - invalid parameters"]);
    assert_eq!(rig.engine.config(), &before);
}

#[test]
fn configure_after_session_resets_metrics() {
    let mut rig = Rig::new(DeviceSettings::default());
    rig.send("config 200,200,1,5,S06,1,%red,red,red,red,red%");
    rig.send("start");
    rig.wait_for_trial(2);
    rig.press(Channel::Confirm);
    rig.run_to_completion();
    assert!(!rig.engine.metrics().is_zero());

    let reply = rig.send("config 200,200,1,6,S06,2");
    assert!(contains(&reply, "Configuration applied successfully"));
    assert!(rig.engine.metrics().is_zero());
    assert!(rig.engine.records().is_empty());
    assert_eq!(rig.engine.state(), EngineState::Idle);
}

#[test]
fn state_guards_reply_on_the_wire() {
    let mut rig = Rig::new(DeviceSettings::default());
    assert_eq!(
        rig.send("get_data"),
        vec!["No data available. Run task first."]
    );
    rig.send("config 200,200,1,5,S07,1");
    rig.send("start");
    assert_eq!(
        rig.send("start"),
        vec!["Cannot start: session already active"]
    );
    rig.run_to_completion();
    assert_eq!(
        rig.send("start"),
        vec!["Cannot start: data pending, send get_data or exit"]
    );
    assert_eq!(rig.send("exit"), vec!["exiting", "ready"]);
    assert_eq!(rig.send("frobnicate"), vec!["Unknown command: frobnicate"]);
    assert_eq!(rig.send("   "), Vec::<String>::new());
}

#[test]
fn exit_discards_running_session() {
    let mut rig = Rig::new(DeviceSettings::default());
    rig.send("config 500,300,1,5,S08,1");
    rig.send("start");
    rig.run(1_000);
    assert_eq!(rig.send("exit"), vec!["exiting", "ready"]);
    assert_eq!(rig.engine.state(), EngineState::Idle);
    assert!(rig.engine.records().is_empty());
    assert_eq!(rig.engine.output().writes.last(), Some(&None));
}

#[test]
fn generated_sequence_is_redrawn_each_start() {
    let mut rig = Rig::new(DeviceSettings::default());
    rig.send("config 200,200,2,30,S09,1");
    rig.send("start");
    assert!(!rig.engine.has_custom_sequence());
    let first = rig.engine.sequence().to_vec();
    rig.send("exit");
    rig.send("start");
    assert_ne!(rig.engine.sequence(), &first[..]);

    rig.send("exit");
    rig.send("config 200,200,1,5,S09,1,%blue,blue,blue,blue,blue%");
    rig.send("start");
    rig.send("exit");
    rig.send("start");
    assert!(rig.engine.has_custom_sequence());
    assert_eq!(rig.engine.sequence(), &[Color::Blue; 5]);
}

#[test]
fn short_custom_sequence_warns() {
    let mut rig = Rig::new(DeviceSettings::default());
    let reply = rig.send("config 500,300,1,6,S10,1,%red,teal,blue%");
    assert_eq!(
        &reply[reply.len() - 3..],
        [
            "Configuration applied successfully",
            "Warning: Unknown color name 'teal', defaulting to RED",
            "!!!Warning: Provided sequence has only 3 colors, but 6 trials are configured.!!!",
        ]
    );
    assert_eq!(&rig.engine.sequence()[..3], &[Color::Red, Color::Red, Color::Blue]);
}

#[test]
fn debug_mode_cycles_palette_and_reports_presses() {
    let mut rig = Rig::new(DeviceSettings::default());
    let entered = rig.send("debug");
    assert_eq!(entered[0], "enter debug mode");
    assert_eq!(rig.engine.output().writes.last(), Some(&Some(Color::Red)));

    let lines = rig.run(2_000);
    assert_eq!(
        lines,
        vec!["Debug: Showing color 1 (GREEN)", "Debug: Showing color 2 (BLUE)"]
    );

    let lines = rig.press(Channel::Confirm);
    assert_eq!(lines, vec!["Debug: CONFIRM BUTTON PRESSED!"]);
    assert_eq!(rig.engine.output().writes.last(), Some(&Some(Color::White)));

    assert_eq!(rig.send("exit-debug"), vec!["exiting debug mode", "ready"]);
}

#[test]
fn input_mode_switches_and_rejects_bad_codes() {
    let mut rig = Rig::new(DeviceSettings::default());
    assert_eq!(rig.send("input_mode 1"), vec!["Input mode set to touch"]);
    assert_eq!(
        rig.send("input_mode 7"),
        vec!["Invalid input mode. Use: input_mode 0|1"]
    );
    assert_eq!(
        rig.send("input_mode"),
        vec!["Nback Entering INPUT MODE", "Send 'exit' to return to IDLE state"]
    );
    assert_eq!(rig.send("exit"), vec!["INPUT_MODE_EXIT", "ready"]);
}
