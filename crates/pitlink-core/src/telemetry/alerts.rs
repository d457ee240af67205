//! Alert derivation
//!
//! Alerts are computed locally from each snapshot against the targets the
//! user last sent; the controller never transmits them. Each kind is
//! throttled on its own so a persistent condition re-notifies at most once
//! per cooldown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::TelemetrySnapshot;

/// Kind of alert raised from telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertKind {
    /// Chamber or a cook probe is well above its target
    OverTemperature,
    /// A cook probe reached the cook target
    CookComplete,
    /// Fire is falling behind with the damper already open
    LowFuel,
}

impl AlertKind {
    pub const ALL: [AlertKind; 3] = [
        AlertKind::OverTemperature,
        AlertKind::CookComplete,
        AlertKind::LowFuel,
    ];

    /// Notification text for this alert
    pub fn message(&self) -> &'static str {
        match self {
            AlertKind::OverTemperature => {
                "Temperature is running hot, the system is doing what it can to fix"
            }
            AlertKind::CookComplete => "Your food is ready!",
            AlertKind::LowFuel => "Fire is falling behind, add more fuel",
        }
    }
}

/// Targets alerts are measured against, in Celsius
///
/// `None` means the user has not sent that target yet; no alert depending
/// on it is raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertTargets {
    pub chamber_c: Option<f32>,
    pub cook_c: Option<f32>,
}

/// Alert thresholds and throttling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertSettings {
    /// Degrees above target before OverTemperature fires
    pub over_temp_margin_c: f32,
    /// Allowed distance from the cook target for CookComplete; 0.0 is exact equality
    pub cook_tolerance_c: f32,
    /// Degrees below the chamber target before LowFuel fires
    pub low_fuel_margin_c: f32,
    /// Minimum time between two events of the same kind
    pub cooldown: Duration,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            over_temp_margin_c: 20.0,
            cook_tolerance_c: 0.0,
            low_fuel_margin_c: 20.0,
            cooldown: Duration::from_secs(300),
        }
    }
}

/// A raised alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub raised_at: DateTime<Utc>,
    /// Snapshot that triggered it
    pub snapshot: TelemetrySnapshot,
}

impl AlertEvent {
    pub fn message(&self) -> &'static str {
        self.kind.message()
    }
}

/// Conditions currently true for a snapshot, ignoring throttling
///
/// Probes flagged as faulted never contribute.
pub fn active_conditions(
    snapshot: &TelemetrySnapshot,
    targets: &AlertTargets,
    settings: &AlertSettings,
) -> Vec<AlertKind> {
    let mut kinds = Vec::new();
    let chamber = (!snapshot.faults.chamber).then_some(snapshot.chamber_temp_c);
    let cooks: Vec<f32> = [
        (snapshot.cook_temp_left_c, snapshot.faults.cook_left),
        (snapshot.cook_temp_right_c, snapshot.faults.cook_right),
    ]
    .into_iter()
    .filter(|&(_, fault)| !fault)
    .map(|(temp, _)| temp)
    .collect();

    let chamber_hot = match (chamber, targets.chamber_c) {
        (Some(temp), Some(target)) => temp > target + settings.over_temp_margin_c,
        _ => false,
    };
    let cook_hot = targets
        .cook_c
        .map(|target| cooks.iter().any(|&t| t > target + settings.over_temp_margin_c))
        .unwrap_or(false);
    if chamber_hot || cook_hot {
        kinds.push(AlertKind::OverTemperature);
    }

    if let Some(target) = targets.cook_c {
        if cooks
            .iter()
            .any(|&t| (t - target).abs() <= settings.cook_tolerance_c)
        {
            kinds.push(AlertKind::CookComplete);
        }
    }

    if let (Some(temp), Some(target)) = (chamber, targets.chamber_c) {
        if snapshot.damper_open && temp < target - settings.low_fuel_margin_c {
            kinds.push(AlertKind::LowFuel);
        }
    }

    kinds
}

/// Per-kind rate limiter
#[derive(Debug, Clone)]
pub struct AlertThrottle {
    cooldown: Duration,
    last_fired: HashMap<AlertKind, Instant>,
}

impl AlertThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: HashMap::new(),
        }
    }

    /// Record a firing of `kind` at `now` if its cooldown has elapsed
    ///
    /// Returns whether the event should be delivered.
    pub fn try_fire(&mut self, kind: AlertKind, now: Instant) -> bool {
        let ready = self
            .last_fired
            .get(&kind)
            .map(|last| now.saturating_duration_since(*last) >= self.cooldown)
            .unwrap_or(true);
        if ready {
            self.last_fired.insert(kind, now);
        }
        ready
    }

    pub fn reset(&mut self) {
        self.last_fired.clear();
    }
}

/// Turns snapshots into throttled alert events
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    settings: AlertSettings,
    throttle: AlertThrottle,
}

impl AlertEvaluator {
    pub fn new(settings: AlertSettings) -> Self {
        Self {
            throttle: AlertThrottle::new(settings.cooldown),
            settings,
        }
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    /// Evaluate one snapshot, returning the events that pass the throttle
    pub fn evaluate(
        &mut self,
        snapshot: &TelemetrySnapshot,
        targets: &AlertTargets,
        now: Instant,
    ) -> Vec<AlertEvent> {
        active_conditions(snapshot, targets, &self.settings)
            .into_iter()
            .filter(|kind| self.throttle.try_fire(*kind, now))
            .map(|kind| AlertEvent {
                kind,
                raised_at: Utc::now(),
                snapshot: *snapshot,
            })
            .collect()
    }
}
