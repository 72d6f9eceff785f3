use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nback_core::EngineState;
use nback_experiment::{dispatch, DeviceSettings, NBackEngine};
use nback_timing::{LoopStats, MonotonicClock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::host::{ConsolePixel, HostAction, SimulatedPins};
use crate::Args;

type Engine = NBackEngine<ConsolePixel, SimulatedPins, MonotonicClock, StdRng>;

/// Drives the engine from a terminal: stdin is the serial RX line, stdout
/// the TX line.
pub struct App {
    engine: Engine,
    clock: MonotonicClock,
    tick: Duration,
    stats: LoopStats,
    stdin_closed: bool,
}

impl App {
    pub fn new(args: &Args) -> Result<Self> {
        let settings = match &args.settings {
            Some(path) => load_settings(path)?,
            None => DeviceSettings::default(),
        };
        let rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let clock = MonotonicClock::new();
        let pins = SimulatedPins::new(clock.clone());
        let engine = NBackEngine::new(settings, ConsolePixel::default(), pins, clock.clone(), rng)
            .context("invalid device settings")?;

        Ok(Self {
            engine,
            clock,
            tick: Duration::from_micros(args.tick_us.into()),
            stats: LoopStats::default(),
            stdin_closed: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            tick_us = self.tick.as_micros() as u64,
            "starting poll loop"
        );
        let lines = spawn_stdin_reader();
        self.engine.boot();
        self.flush()?;

        loop {
            let started = Instant::now();

            // At most one command per iteration, like the serial line.
            match lines.try_recv() {
                Ok(line) => self.handle_line(&line),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    if !self.stdin_closed {
                        debug!("stdin closed");
                        self.stdin_closed = true;
                    }
                }
            }

            self.engine.tick();
            self.flush()?;

            if self.stdin_closed && self.engine.state() != EngineState::Running {
                break;
            }

            self.clock.high_precision_sleep(self.tick);
            self.stats.record(started.elapsed());
        }

        self.cleanup_and_exit()
    }

    fn handle_line(&mut self, line: &str) {
        match HostAction::parse(line) {
            Some(action) => {
                debug!(?action, "simulated input");
                self.engine.input_mut().apply(action);
            }
            None => dispatch(&mut self.engine, line),
        }
    }

    fn flush(&mut self) -> Result<()> {
        let lines = self.engine.drain_output();
        if lines.is_empty() {
            return Ok(());
        }
        let mut out = io::stdout().lock();
        for line in lines {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }

    fn cleanup_and_exit(mut self) -> Result<()> {
        self.flush()?;
        if let Some(s) = self.stats.summary() {
            info!(
                avg_ms = s.average_ns / 1e6,
                jitter_ms = s.jitter_ns / 1e6,
                max_ms = s.max_ns / 1e6,
                hz = s.effective_hz,
                pixel_writes = self.engine.output().writes,
                "poll loop finished"
            );
        }
        if self.engine.state() != EngineState::Idle {
            warn!(state = %self.engine.state(), "exiting with engine not idle");
        }
        Ok(())
    }
}

fn load_settings(path: &Path) -> Result<DeviceSettings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings file {}", path.display()))?;
    let settings = DeviceSettings::from_json(&text)
        .with_context(|| format!("parsing settings file {}", path.display()))?;
    info!(path = %path.display(), "loaded device settings");
    Ok(settings)
}

/// Forwards stdin lines into a channel so the loop never blocks on input.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
