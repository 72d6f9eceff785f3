//! Line-oriented serial commands and their status replies.

use std::str::FromStr;

use nback_core::{EngineState, InputSource, StimulusOutput};
use nback_timing::Clock;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::input::InputMode;
use crate::state::NBackEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Configure {
        config: SessionConfig,
        /// Color list found between `%` markers.
        custom: Option<String>,
    },
    Start,
    Pause,
    Debug,
    ExitDebug,
    Exit,
    GetData,
    SetInputMode(InputMode),
    ForwardInput,
    Sync,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(
        "Invalid config format. Use: config stimDuration,interStimulusInterval,nBackLevel,trialsNumber,study_id,session_number[,%color1,color2,...%]"
    )]
    ConfigFormat,
    #[error("Invalid input mode. Use: input_mode 0|1")]
    InputMode,
    #[error("Unknown command: {0}")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, Some(rest.trim())),
            None => (line, None),
        };

        match (word, rest) {
            ("config", Some(args)) => parse_config(args),
            ("config", None) => Err(CommandError::ConfigFormat),
            ("start", None) => Ok(Command::Start),
            ("pause", None) => Ok(Command::Pause),
            ("debug", None) => Ok(Command::Debug),
            ("exit-debug", None) => Ok(Command::ExitDebug),
            ("exit", None) => Ok(Command::Exit),
            ("get_data", None) => Ok(Command::GetData),
            ("sync", None) => Ok(Command::Sync),
            ("input_mode", None) => Ok(Command::ForwardInput),
            ("input_mode", Some(arg)) => arg
                .parse::<u8>()
                .ok()
                .and_then(InputMode::from_code)
                .map(Command::SetInputMode)
                .ok_or(CommandError::InputMode),
            _ => Err(CommandError::Unknown(line.to_string())),
        }
    }
}

/// `stim,isi,n,trials,study,session[,%c1,c2,...%]`
fn parse_config(args: &str) -> Result<Command, CommandError> {
    let (head, custom) = match args.split_once('%') {
        Some((head, tail)) => {
            let (list, rest) = tail.split_once('%').ok_or(CommandError::ConfigFormat)?;
            if !rest.trim().is_empty() {
                return Err(CommandError::ConfigFormat);
            }
            (head, Some(list.to_string()))
        }
        None => (args, None),
    };

    let head = head.trim().trim_end_matches(',');
    let fields: Vec<&str> = head.split(',').map(str::trim).collect();
    let [stim, isi, n_back, trials, study, session] = fields.as_slice() else {
        return Err(CommandError::ConfigFormat);
    };

    let config = SessionConfig {
        stimulus_duration_ms: number(stim)?,
        inter_stimulus_interval_ms: number(isi)?,
        n_back_level: number(n_back)?,
        trial_count: number(trials)?,
        study_id: study.to_string(),
        session_number: number(session)?,
    };
    Ok(Command::Configure { config, custom })
}

fn number<T: FromStr>(field: &str) -> Result<T, CommandError> {
    field.parse().map_err(|_| CommandError::ConfigFormat)
}

/// Parses one received line and runs it against the engine. Every reply,
/// including rejections, goes to the engine's outbox.
pub fn dispatch<O, I, C, R>(engine: &mut NBackEngine<O, I, C, R>, line: &str)
where
    O: StimulusOutput,
    I: InputSource,
    C: Clock,
    R: Rng,
{
    if line.trim().is_empty() {
        return;
    }
    match line.parse::<Command>() {
        Ok(command) => {
            debug!(?command, "dispatching");
            execute(engine, command);
        }
        Err(err) => {
            debug!(%err, "unparsed command");
            engine.emit(err.to_string());
        }
    }
}

pub fn execute<O, I, C, R>(engine: &mut NBackEngine<O, I, C, R>, command: Command)
where
    O: StimulusOutput,
    I: InputSource,
    C: Clock,
    R: Rng,
{
    match command {
        Command::Configure { config, custom } => {
            match engine.configure(config, custom.as_deref()) {
                Ok(report) => {
                    engine.emit("Configuration applied successfully");
                    if let Some(report) = report {
                        for name in &report.unknown {
                            engine.emit(format!(
                                "Warning: Unknown color name '{name}', defaulting to RED"
                            ));
                        }
                        let trials = engine.config().trial_count;
                        if report.applied < trials {
                            engine.emit(format!(
                                "!!!Warning: Provided sequence has only {} colors, but {} trials are configured.!!!",
                                report.applied, trials
                            ));
                        } else {
                            engine.emit("Custom color sequence applied successfully");
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "configuration rejected");
                    engine.emit("Failed to apply configuration - invalid parameters");
                }
            }
        }
        Command::Start => {
            if let Err(err) = engine.start() {
                warn!(%err, "start rejected");
                let reply = match err {
                    EngineError::InvalidState {
                        state: EngineState::DataReady,
                        ..
                    } => "Cannot start: data pending, send get_data or exit",
                    EngineError::InvalidState {
                        state: EngineState::InputForwarding,
                        ..
                    } => "Cannot start: input mode active, send exit",
                    EngineError::InvalidState { .. } => "Cannot start: session already active",
                    EngineError::Config(_) => "Cannot start: sequence allocation failed",
                };
                engine.emit(reply);
            }
        }
        Command::Pause => quiet(engine.toggle_pause()),
        Command::Debug => quiet(engine.enter_debug()),
        Command::ExitDebug => quiet(engine.exit_debug()),
        Command::Exit => quiet(engine.exit()),
        Command::GetData => {
            if engine.get_data().is_err() {
                engine.emit("No data available. Run task first.");
            }
        }
        Command::SetInputMode(mode) => {
            if let Err(err) = engine.set_input_mode(mode) {
                debug!(%err, "input mode change rejected");
                engine.emit("Cannot change input mode during a session");
            }
        }
        Command::ForwardInput => {
            if let Err(err) = engine.enter_input_forwarding() {
                debug!(%err, "input forwarding rejected");
                engine.emit(format!("Cannot enter input mode while {}", engine.state()));
            }
        }
        Command::Sync => engine.sync(),
    }
}

/// Commands the firmware ignores silently outside their states.
fn quiet(result: Result<(), EngineError>) {
    if let Err(err) = result {
        debug!(%err, "command ignored");
    }
}
