//! Playback phase and the operator commands that drive it.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Playback phase of the streaming core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Phase {
    /// No run has been started yet.
    #[default]
    Idle,
    /// The streaming loop is stepping the simulator.
    Running,
    /// The loop is alive but not stepping.
    Paused,
    /// The last run ended (reset, budget exhausted or simulator lost).
    Stopped,
}

impl Phase {
    /// Whether a run (and therefore a simulator session) is live.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

/// Payload of the `speed` command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SpeedRequest {
    /// Playback speed multiplier; must be positive.
    ///
    /// `speed` is accepted as an alias, matching the original dashboard.
    #[serde(alias = "speed")]
    pub factor: f64,
}

/// A command sent by a viewer over the control channel.
///
/// Encoded as `{"event": "start"}` or
/// `{"event": "speed", "data": {"factor": 2.0}}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum PlaybackCommand {
    /// Start a new run, or resume a paused one.
    Start,
    /// Pause stepping.
    Pause,
    /// End the current run.
    Reset,
    /// Change the step cadence.
    Speed(SpeedRequest),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unit_commands_need_no_payload() {
        let cmd: PlaybackCommand = serde_json::from_str(r#"{"event":"start"}"#).unwrap();
        assert_eq!(cmd, PlaybackCommand::Start);
        let cmd: PlaybackCommand = serde_json::from_str(r#"{"event":"reset"}"#).unwrap();
        assert_eq!(cmd, PlaybackCommand::Reset);
    }

    #[test]
    fn speed_accepts_factor_and_legacy_alias() {
        let cmd: PlaybackCommand =
            serde_json::from_str(r#"{"event":"speed","data":{"factor":2.0}}"#).unwrap();
        assert_eq!(cmd, PlaybackCommand::Speed(SpeedRequest { factor: 2.0 }));
        let cmd: PlaybackCommand =
            serde_json::from_str(r#"{"event":"speed","data":{"speed":1.5}}"#).unwrap();
        assert_eq!(cmd, PlaybackCommand::Speed(SpeedRequest { factor: 1.5 }));
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(serde_json::from_str::<PlaybackCommand>(r#"{"event":"rewind"}"#).is_err());
    }

    #[test]
    fn active_phases() {
        assert!(Phase::Running.is_active());
        assert!(Phase::Paused.is_active());
        assert!(!Phase::Idle.is_active());
        assert!(!Phase::Stopped.is_active());
    }
}
