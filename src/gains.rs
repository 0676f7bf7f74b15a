//! The gain-set value object: controller coefficients plus their measured
//! tracking error, with the `name=value` token grammar shared by the log
//! files and the starting-population import.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight applied to the position error in the fitness sum. Position errors
/// are measured in radians and velocity errors in radians per second; the
/// weight compensates for the difference in physical scale.
pub const POSITION_ERROR_WEIGHT: f64 = 10_000.0;

/// What the controller's input signal represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    #[default]
    Position,
    Velocity,
}

impl InputKind {
    fn as_wire(self) -> u8 {
        match self {
            InputKind::Position => 0,
            InputKind::Velocity => 1,
        }
    }

    fn from_wire(value: &str) -> Option<Self> {
        match value {
            "0" => Some(InputKind::Position),
            "1" => Some(InputKind::Velocity),
            _ => None,
        }
    }
}

/// How the controller's output is applied to the joint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    #[default]
    Force,
    DeltaForce,
}

impl UpdateKind {
    fn as_wire(self) -> u8 {
        match self {
            UpdateKind::Force => 0,
            UpdateKind::DeltaForce => 1,
        }
    }

    fn from_wire(value: &str) -> Option<Self> {
        match value {
            "0" => Some(UpdateKind::Force),
            "1" => Some(UpdateKind::DeltaForce),
            _ => None,
        }
    }
}

/// One candidate parameterization of a joint controller, together with the
/// mean squared tracking errors measured over its last evaluation window.
/// The error fields stay NaN until a window has been reduced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GainSet {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    /// Symmetric integral clamp magnitude; the command carries `±i_clamp`.
    pub i_clamp: f64,
    /// Overall multiplier. Parsed and forwarded, not used by the search.
    pub multiplier: f64,
    /// Target velocity cap before damping.
    pub max_vel: f64,
    /// Velocity damping factor.
    pub damping: f64,
    pub input_kind: InputKind,
    pub update_kind: UpdateKind,
    pub vel_sq_mean_error: f64,
    pub pos_sq_mean_error: f64,
}

impl Default for GainSet {
    fn default() -> Self {
        Self {
            p: 0.0,
            i: 0.0,
            d: 0.0,
            i_clamp: 0.0,
            multiplier: 1.0,
            max_vel: 0.0,
            damping: 0.0,
            input_kind: InputKind::default(),
            update_kind: UpdateKind::default(),
            vel_sq_mean_error: f64::NAN,
            pos_sq_mean_error: f64::NAN,
        }
    }
}

impl GainSet {
    /// The weighted search objective; lower is better. Only meaningful when
    /// [`GainSet::is_measured`] is true.
    pub fn fitness(&self) -> f64 {
        self.vel_sq_mean_error + POSITION_ERROR_WEIGHT * self.pos_sq_mean_error
    }

    /// True once both error dimensions carry a strictly positive value.
    /// NaN (unmeasured or empty window) fails this check.
    pub fn is_measured(&self) -> bool {
        self.vel_sq_mean_error > 0.0 && self.pos_sq_mean_error > 0.0
    }

    /// Renders the command-channel message for this set: eight fixed-point
    /// values in the fixed order `p i d i_clamp -i_clamp multiplier max_vel
    /// damping`.
    pub fn command_line(&self) -> String {
        format!(
            "{:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
            self.p,
            self.i,
            self.d,
            self.i_clamp,
            -self.i_clamp,
            self.multiplier,
            self.max_vel,
            self.damping
        )
    }

    /// Parses a token string into a fresh set. Unrecognized and malformed
    /// tokens are skipped with a warning; missing fields keep their
    /// defaults.
    pub fn from_tokens(input: &str) -> Self {
        let mut set = Self::default();
        set.apply_tokens(input);
        set
    }

    /// Applies every recognized `name=value` token in `input` to this set.
    ///
    /// Recognized names are `p, i, d, i_clamp, multiplier, v_max, damp,
    /// vel_error, pos_error, input_type, update_type`, plus `error` as a
    /// legacy alias for `vel_error`. The record-structure names
    /// `generation` and `joint` are consumed by the callers that split
    /// records and are ignored here. Nothing in this grammar is fatal.
    pub fn apply_tokens(&mut self, input: &str) {
        for token in input.split_whitespace() {
            let Some((name, value)) = token.split_once('=') else {
                warn!("malformed token ('{}')", token);
                continue;
            };
            match name {
                "generation" | "joint" => {}
                "p" => {
                    if let Some(v) = parse_number(token, value) {
                        self.p = v;
                    }
                }
                "i" => {
                    if let Some(v) = parse_number(token, value) {
                        self.i = v;
                    }
                }
                "d" => {
                    if let Some(v) = parse_number(token, value) {
                        self.d = v;
                    }
                }
                "i_clamp" => {
                    if let Some(v) = parse_number(token, value) {
                        self.i_clamp = v;
                    }
                }
                "multiplier" => {
                    if let Some(v) = parse_number(token, value) {
                        self.multiplier = v;
                    }
                }
                "v_max" => {
                    if let Some(v) = parse_number(token, value) {
                        self.max_vel = v;
                    }
                }
                "damp" => {
                    if let Some(v) = parse_number(token, value) {
                        self.damping = v;
                    }
                }
                "error" | "vel_error" => {
                    if let Some(v) = parse_number(token, value) {
                        self.vel_sq_mean_error = v;
                    }
                }
                "pos_error" => {
                    if let Some(v) = parse_number(token, value) {
                        self.pos_sq_mean_error = v;
                    }
                }
                "input_type" => match InputKind::from_wire(value) {
                    Some(kind) => self.input_kind = kind,
                    None => warn!("malformed token ('{}')", token),
                },
                "update_type" => match UpdateKind::from_wire(value) {
                    Some(kind) => self.update_kind = kind,
                    None => warn!("malformed token ('{}')", token),
                },
                _ => warn!("unrecognized token ('{}')", token),
            }
        }
    }
}

fn parse_number(token: &str, value: &str) -> Option<f64> {
    match value.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("malformed token ('{}')", token);
            None
        }
    }
}

/// The log-file dump format. `multiplier` is intentionally absent; parsers
/// default it to 1.0.
impl fmt::Display for GainSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vel_error={} pos_error={} p={} i={} d={} i_clamp={} v_max={} damp={} input_type={} update_type={}",
            self.vel_sq_mean_error,
            self.pos_sq_mean_error,
            self.p,
            self.i,
            self.d,
            self.i_clamp,
            self.max_vel,
            self.damping,
            self.input_kind.as_wire(),
            self.update_kind.as_wire()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measured_set(vel: f64, pos: f64) -> GainSet {
        GainSet {
            vel_sq_mean_error: vel,
            pos_sq_mean_error: pos,
            ..GainSet::default()
        }
    }

    #[test]
    fn test_fitness_weighting() {
        let set = measured_set(1.0, 0.01);
        assert_eq!(set.fitness(), 101.0);

        // Position error moves the fitness 10_000 times faster.
        let bumped_pos = measured_set(1.0, 0.01 + 1e-6);
        let bumped_vel = measured_set(1.0 + 1e-6, 0.01);
        let pos_delta = bumped_pos.fitness() - set.fitness();
        let vel_delta = bumped_vel.fitness() - set.fitness();
        assert!((pos_delta / vel_delta - POSITION_ERROR_WEIGHT).abs() < 1e-3);
    }

    #[test]
    fn test_unmeasured_sets_are_flagged() {
        assert!(!GainSet::default().is_measured());
        assert!(!measured_set(0.0, 0.01).is_measured());
        assert!(!measured_set(-1.0, 0.01).is_measured());
        assert!(!measured_set(1.0, f64::NAN).is_measured());
        assert!(measured_set(1.0, 0.01).is_measured());
    }

    #[test]
    fn test_command_line_layout() {
        let set = GainSet {
            p: 4.5,
            i: 0.005,
            d: 0.002,
            i_clamp: 0.05,
            max_vel: 6.0,
            damping: 0.01,
            ..GainSet::default()
        };
        assert_eq!(
            set.command_line(),
            "4.500000 0.005000 0.002000 0.050000 -0.050000 1.000000 6.000000 0.010000"
        );
    }

    #[test]
    fn test_token_round_trip_through_dump_format() {
        let set = GainSet {
            p: 4.25,
            i: 0.004,
            d: 0.001,
            i_clamp: 0.03,
            max_vel: 5.5,
            damping: 0.02,
            input_kind: InputKind::Velocity,
            update_kind: UpdateKind::DeltaForce,
            vel_sq_mean_error: 0.8,
            pos_sq_mean_error: 0.002,
            ..GainSet::default()
        };
        let parsed = GainSet::from_tokens(&set.to_string());
        assert_eq!(parsed.p, set.p);
        assert_eq!(parsed.i, set.i);
        assert_eq!(parsed.d, set.d);
        assert_eq!(parsed.i_clamp, set.i_clamp);
        assert_eq!(parsed.max_vel, set.max_vel);
        assert_eq!(parsed.damping, set.damping);
        assert_eq!(parsed.input_kind, InputKind::Velocity);
        assert_eq!(parsed.update_kind, UpdateKind::DeltaForce);
        assert_eq!(parsed.vel_sq_mean_error, 0.8);
        assert_eq!(parsed.pos_sq_mean_error, 0.002);
        // The dump omits the multiplier, so parsing restores the default.
        assert_eq!(parsed.multiplier, 1.0);
    }

    #[test]
    fn test_malformed_and_unknown_tokens_are_skipped() {
        let parsed = GainSet::from_tokens("p=1.5 bogus d=abc q=3 i=0.2");
        assert_eq!(parsed.p, 1.5);
        assert_eq!(parsed.i, 0.2);
        // "d=abc" is malformed and must not clobber the default.
        assert_eq!(parsed.d, 0.0);
    }

    #[test]
    fn test_legacy_error_alias() {
        let parsed = GainSet::from_tokens("error=0.4 p=2.0");
        assert_eq!(parsed.vel_sq_mean_error, 0.4);
    }

    #[test]
    fn test_record_structure_tokens_are_ignored() {
        let parsed = GainSet::from_tokens("generation=12 joint=3 p=2.5 vel_error=0.1");
        assert_eq!(parsed.p, 2.5);
        assert_eq!(parsed.vel_sq_mean_error, 0.1);
    }
}
