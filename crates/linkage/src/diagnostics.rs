//! Injectable diagnostics sink.
//!
//! The engine never logs through process-wide state on its own: every stage
//! receives a `&dyn Diagnostics` from the caller. `LogDiagnostics` forwards to
//! the `log` facade, `MemoryDiagnostics` keeps events for inspection.

use std::sync::Mutex;

use log::Level;

/// Pipeline stage an event originates from. Used as the `log` target suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Projection,
    Blocking,
    Estimation,
    Training,
    Scoring,
    Linker,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Projection => "projection",
            Self::Blocking => "blocking",
            Self::Estimation => "estimation",
            Self::Training => "training",
            Self::Scoring => "scoring",
            Self::Linker => "linker",
        }
    }

    /// `log` target for events from this stage.
    pub fn log_target(&self) -> String {
        format!("reclink::{}", self.as_str())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Diagnostics: Sync {
    fn event(&self, level: Level, stage: Stage, message: &str);

    fn info(&self, stage: Stage, message: &str) {
        self.event(Level::Info, stage, message);
    }

    fn debug(&self, stage: Stage, message: &str) {
        self.event(Level::Debug, stage, message);
    }

    fn warn(&self, stage: Stage, message: &str) {
        self.event(Level::Warn, stage, message);
    }
}

/// Forwards every event to the `log` facade under `reclink::<stage>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn event(&self, level: Level, stage: Stage, message: &str) {
        let target = stage.log_target();
        log::log!(target: &target, level, "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {
    fn event(&self, _level: Level, _stage: Stage, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub level: Level,
    pub stage: Stage,
    pub message: String,
}

/// Collects events in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn warnings(&self) -> Vec<DiagnosticEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == Level::Warn)
            .collect()
    }
}

impl Diagnostics for MemoryDiagnostics {
    fn event(&self, level: Level, stage: Stage, message: &str) {
        let event = DiagnosticEvent {
            level,
            stage,
            message: message.to_string(),
        };
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
