use std::sync::Mutex;

use crate::traits::StatusSink;

/// One status update.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Model(String),
    EpsilonVersion(String),
    OmegaVersion(String),
    Username(String),
    Detected(String),
    Progress(f32),
    Error { fatal: bool, detail: Option<String> },
    Finished,
    NotFound(String),
    NotCompatible,
}

/// Status sink that keeps every update for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Reported errors, cleared errors (`detail = None`) excluded.
    pub fn errors(&self) -> Vec<(bool, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Error {
                    fatal,
                    detail: Some(detail),
                } => Some((fatal, detail)),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<f32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Progress(percent) => Some(percent),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> bool {
        self.events().contains(&SinkEvent::Finished)
    }

    pub fn contains(&self, event: &SinkEvent) -> bool {
        self.events().contains(event)
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl StatusSink for RecordingSink {
    fn set_model(&self, model: &str) {
        self.push(SinkEvent::Model(model.to_string()));
    }

    fn set_epsilon_version(&self, version: &str) {
        self.push(SinkEvent::EpsilonVersion(version.to_string()));
    }

    fn set_omega_version(&self, version: &str) {
        self.push(SinkEvent::OmegaVersion(version.to_string()));
    }

    fn set_username(&self, username: &str) {
        self.push(SinkEvent::Username(username.to_string()));
    }

    fn calculator_detected(&self, kind: &str) {
        self.push(SinkEvent::Detected(kind.to_string()));
    }

    fn set_progress_percentage(&self, percent: f32) {
        self.push(SinkEvent::Progress(percent));
    }

    fn calculator_error(&self, fatal: bool, detail: Option<String>) {
        self.push(SinkEvent::Error { fatal, detail });
    }

    fn installation_finished(&self) {
        self.push(SinkEvent::Finished);
    }

    fn firmware_not_found(&self, name: &str) {
        self.push(SinkEvent::NotFound(name.to_string()));
    }

    fn installer_not_compatible(&self) {
        self.push(SinkEvent::NotCompatible);
    }
}
