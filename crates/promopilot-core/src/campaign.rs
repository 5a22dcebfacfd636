//! Campaign lifecycle state machine.
//!
//! Every state change in the system funnels through [`next_state`] so the
//! transition rules live in exactly one place. `expired` is terminal: no
//! event moves a campaign out of it, and activation is refused once the
//! campaign window has closed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignState {
    Draft,
    Scheduled,
    Active,
    Paused,
    Expired,
}

impl CampaignState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignState::Draft => "draft",
            CampaignState::Scheduled => "scheduled",
            CampaignState::Active => "active",
            CampaignState::Paused => "paused",
            CampaignState::Expired => "expired",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignState::Expired)
    }
}

impl std::str::FromStr for CampaignState {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignState::Draft),
            "scheduled" => Ok(CampaignState::Scheduled),
            "active" => Ok(CampaignState::Active),
            "paused" => Ok(CampaignState::Paused),
            "expired" => Ok(CampaignState::Expired),
            other => Err(StateError::UnknownState(other.to_string())),
        }
    }
}

impl std::fmt::Display for CampaignState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who caused the most recent state change. Manual overrides win arbitration
/// against schedule windows whose due edge predates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    System,
    Schedule,
    Manual,
}

impl StateSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StateSource::System => "system",
            StateSource::Schedule => "schedule",
            StateSource::Manual => "manual",
        }
    }
}

impl std::str::FromStr for StateSource {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(StateSource::System),
            "schedule" => Ok(StateSource::Schedule),
            "manual" => Ok(StateSource::Manual),
            other => Err(StateError::UnknownSource(other.to_string())),
        }
    }
}

impl std::fmt::Display for StateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleAction {
    Activate,
    Pause,
}

impl ScheduleAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleAction::Activate => "activate",
            ScheduleAction::Pause => "pause",
        }
    }
}

impl std::str::FromStr for ScheduleAction {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activate" => Ok(ScheduleAction::Activate),
            "pause" => Ok(ScheduleAction::Pause),
            other => Err(StateError::UnknownAction(other.to_string())),
        }
    }
}

impl std::fmt::Display for ScheduleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum StateEvent {
    /// The first schedule rule was attached to a draft campaign.
    ScheduleAttached,
    /// A schedule window edge fired.
    Schedule(ScheduleAction),
    /// An operator forced the state from the dashboard.
    Manual(ScheduleAction),
    /// The campaign's end date passed.
    EndDateReached,
}

impl StateEvent {
    fn describe(self) -> &'static str {
        match self {
            StateEvent::ScheduleAttached => "attach a schedule to",
            StateEvent::Schedule(ScheduleAction::Activate) => "schedule-activate",
            StateEvent::Schedule(ScheduleAction::Pause) => "schedule-pause",
            StateEvent::Manual(ScheduleAction::Activate) => "activate",
            StateEvent::Manual(ScheduleAction::Pause) => "pause",
            StateEvent::EndDateReached => "expire",
        }
    }
}

/// The campaign's overall run window. Activation is only legal while
/// `start_date <= at < end_date`.
#[derive(Debug, Clone, Copy)]
pub struct CampaignWindow {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl CampaignWindow {
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_date <= at && at < self.end_date
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot {event} a campaign in state '{from}'")]
    InvalidTransition {
        from: CampaignState,
        event: &'static str,
    },
    #[error("campaign window is closed at {at} (runs {start} to {end})")]
    WindowClosed {
        at: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("unknown campaign state: {0}")]
    UnknownState(String),
    #[error("unknown state source: {0}")]
    UnknownSource(String),
    #[error("unknown schedule action: {0}")]
    UnknownAction(String),
}

/// Compute the state a campaign moves to when `event` happens at `at`.
///
/// Callers persist the result with a guarded update so a concurrent change
/// loses at most one of the two writes, never both.
///
/// # Errors
///
/// Returns [`StateError::InvalidTransition`] when the event is not legal in
/// the current state and [`StateError::WindowClosed`] when an activation is
/// attempted outside the campaign window.
pub fn next_state(
    current: CampaignState,
    event: StateEvent,
    window: CampaignWindow,
    at: DateTime<Utc>,
) -> Result<CampaignState, StateError> {
    if current.is_terminal() {
        return Err(StateError::InvalidTransition {
            from: current,
            event: event.describe(),
        });
    }

    match event {
        StateEvent::EndDateReached => Ok(CampaignState::Expired),
        StateEvent::ScheduleAttached => match current {
            CampaignState::Draft => Ok(CampaignState::Scheduled),
            _ => Err(StateError::InvalidTransition {
                from: current,
                event: event.describe(),
            }),
        },
        StateEvent::Schedule(ScheduleAction::Activate) => match current {
            CampaignState::Scheduled | CampaignState::Paused => {
                ensure_window_open(window, at)?;
                Ok(CampaignState::Active)
            }
            _ => Err(StateError::InvalidTransition {
                from: current,
                event: event.describe(),
            }),
        },
        StateEvent::Schedule(ScheduleAction::Pause) => match current {
            CampaignState::Active => Ok(CampaignState::Paused),
            _ => Err(StateError::InvalidTransition {
                from: current,
                event: event.describe(),
            }),
        },
        StateEvent::Manual(ScheduleAction::Activate) => {
            ensure_window_open(window, at)?;
            Ok(CampaignState::Active)
        }
        StateEvent::Manual(ScheduleAction::Pause) => Ok(CampaignState::Paused),
    }
}

fn ensure_window_open(window: CampaignWindow, at: DateTime<Utc>) -> Result<(), StateError> {
    if window.contains(at) {
        Ok(())
    } else {
        Err(StateError::WindowClosed {
            at,
            start: window.start_date,
            end: window.end_date,
        })
    }
}
