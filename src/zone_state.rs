//! Classification of a zone's control mode from its power and overlay.

use serde::Serialize;

use crate::models::tado::{self, Power};

/// Semantic control mode of a zone, derived from its current setting and overlay.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneState {
    Unknown,
    Off,
    Auto,
    TemporaryManual,
    Manual,
}

impl core::fmt::Display for ZoneState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ZoneState::Unknown => "unknown",
            ZoneState::Off => "off",
            ZoneState::Auto => "auto",
            ZoneState::TemporaryManual => "temporary manual",
            ZoneState::Manual => "manual",
        };
        f.pad(s)
    }
}

/// How an overlay on top of the schedule ends.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverlayMode {
    None,
    Permanent,
    Timer,
    NextBlock,
    Unknown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationType {
    Manual,
    Timer,
    NextTimeBlock,
    TadoMode,
    Unknown,
}

/// Manual override of a zone's schedule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Overlay {
    pub mode: OverlayMode,
    pub termination: TerminationType,
}

impl Overlay {
    /// Derives the overlay from the API's termination block.
    ///
    /// `typeSkillBasedApp` is the more specific of the two fields (the API reports a
    /// `NEXT_TIME_BLOCK` overlay as `TIMER` with a computed expiry), so it wins when set.
    pub fn from_wire(overlay: &tado::ZoneOverlay) -> Self {
        use tado::ZoneOverlayTerminationType as T;
        use tado::ZoneOverlayTerminationTypeSkillBasedApp as S;

        let termination = overlay.termination.as_ref();
        let skill = termination.and_then(|t| t.type_skill_based_app);
        let kind = termination.and_then(|t| t.r#type);

        let termination = match (skill, kind) {
            (Some(S::Manual), _) => TerminationType::Manual,
            (Some(S::Timer), _) => TerminationType::Timer,
            (Some(S::NextTimeBlock), _) => TerminationType::NextTimeBlock,
            (Some(S::TadoMode), _) => TerminationType::TadoMode,
            (Some(S::Unknown) | None, Some(T::Manual)) => TerminationType::Manual,
            (Some(S::Unknown) | None, Some(T::Timer)) => TerminationType::Timer,
            (Some(S::Unknown) | None, Some(T::NextTimeBlock)) => TerminationType::NextTimeBlock,
            (Some(S::Unknown) | None, Some(T::TadoMode)) => TerminationType::TadoMode,
            (Some(S::Unknown) | None, Some(T::Unknown) | None) => TerminationType::Unknown,
        };

        let mode = match termination {
            TerminationType::Manual => OverlayMode::Permanent,
            TerminationType::Timer => OverlayMode::Timer,
            TerminationType::NextTimeBlock | TerminationType::TadoMode => OverlayMode::NextBlock,
            TerminationType::Unknown => OverlayMode::Unknown,
        };

        Overlay { mode, termination }
    }
}

/// Classifies a zone. Power-off dominates any overlay; `termination` never changes
/// the outcome.
pub fn classify(power: Power, mode: OverlayMode, _termination: Option<TerminationType>) -> ZoneState {
    if power == Power::Off {
        return ZoneState::Off;
    }
    match mode {
        OverlayMode::None => ZoneState::Auto,
        OverlayMode::Permanent => ZoneState::Manual,
        OverlayMode::Timer | OverlayMode::NextBlock => ZoneState::TemporaryManual,
        OverlayMode::Unknown => ZoneState::Unknown,
    }
}
