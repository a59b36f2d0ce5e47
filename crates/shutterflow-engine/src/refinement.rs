//! Free-text feedback interpretation.
//!
//! Feedback such as "a bit brighter and blur the background" is matched
//! against keyword and pattern rules, one camera field at a time. Each field
//! that matches contributes to a [`ParameterDelta`]; the delta is then applied
//! to the current parameter snapshot.
//!
//! Keywords match at the start of a word, so `warm` matches "warmer" but `up`
//! does not match "cup".

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::RefinementConfig;
use crate::error::{Result, ShutterflowError};
use crate::model::{CameraParameters, FocusMode, ParameterDelta, SceneMode, WhiteBalance};

const EXPOSURE_KEYWORDS: &[&str] = &[
    "exposure",
    "bright",
    "brightness",
    "dark",
    "darkness",
    "lighting",
];

const ISO_KEYWORDS: &[&str] = &["iso", "grain", "noise", "sensitivity"];

const INCREASE_KEYWORDS: &[&str] = &[
    "increase", "more", "higher", "up", "brighter", "boost", "enhance", "raise",
];

const DECREASE_KEYWORDS: &[&str] = &[
    "decrease", "less", "lower", "down", "darker", "reduce", "diminish", "drop",
];

/// Wide aperture used for background blur.
const WIDE_APERTURE: &str = "f/1.6";

/// Narrow aperture used for depth of field.
const NARROW_APERTURE: &str = "f/5.6";

static EXPOSURE_VALUE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\b(?:exposure|bright\w*|dark\w*)\s*(?:by|to|of|at|:|=)?\s*([+-]?\d+(?:\.\d+)?)")
        .ok()
});

static ISO_VALUE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\biso\s*(?:to|of|at|:|=)?\s*(\d+)").ok());

static F_STOP: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\bf/?(\d+(?:\.\d+)?)\b").ok());

/// Direction requested by directional feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Increase,
    Decrease,
}

/// Result of interpreting one piece of feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    /// What the feedback asked to change.
    pub requested: ParameterDelta,
    /// What actually changed once limits were applied.
    pub delta: ParameterDelta,
    /// The snapshot after applying the delta.
    pub parameters: CameraParameters,
}

/// Turns free-text feedback into parameter changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefinementInterpreter {
    policy: RefinementConfig,
}

impl RefinementInterpreter {
    /// Creates an interpreter with the given step sizes.
    #[must_use]
    pub const fn new(policy: RefinementConfig) -> Self {
        Self { policy }
    }

    /// Returns the step sizes in use.
    #[must_use]
    pub const fn policy(&self) -> &RefinementConfig {
        &self.policy
    }

    /// Interprets `text` against the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::NoAdjustmentRecognized`] if no rule
    /// matched.
    ///
    /// # Examples
    ///
    /// ```
    /// use shutterflow_engine::{RefinementInterpreter, WhiteBalance};
    ///
    /// let interpreter = RefinementInterpreter::default();
    /// let refinement = interpreter
    ///     .interpret("make it warmer and blur the background", None)
    ///     .unwrap();
    ///
    /// assert_eq!(refinement.delta.white_balance, Some(WhiteBalance::Incandescent));
    /// assert_eq!(refinement.delta.aperture.as_deref(), Some("f/1.6"));
    /// assert_eq!(refinement.delta.field_names().len(), 2);
    /// ```
    pub fn interpret(
        &self,
        text: &str,
        current: Option<&CameraParameters>,
    ) -> Result<Refinement> {
        let requested = self.parse(text);
        if requested.is_empty() {
            return Err(ShutterflowError::no_adjustment(text));
        }
        let base = current.cloned().unwrap_or_default();
        let parameters = base.with_delta(&requested);
        let delta = base.applied_delta(&parameters, &requested);
        Ok(Refinement {
            requested,
            delta,
            parameters,
        })
    }

    /// Parses `text` into a delta; an empty delta means nothing matched.
    #[must_use]
    pub fn parse(&self, text: &str) -> ParameterDelta {
        let text = text.to_lowercase();
        ParameterDelta {
            exposure_compensation: self.parse_exposure(&text),
            aperture: parse_aperture(&text),
            iso: self.parse_iso(&text),
            focus_mode: parse_focus(&text),
            white_balance: parse_white_balance(&text),
            scene_mode: parse_scene_mode(&text),
        }
    }

    fn parse_exposure(&self, text: &str) -> Option<f64> {
        let direction = direction(text);

        if let Some(caps) = EXPOSURE_VALUE.as_ref().and_then(|re| re.captures(text)) {
            let raw = &caps[1];
            if let Ok(value) = raw.parse::<f64>() {
                let signed = raw.starts_with(['+', '-']);
                if !signed && direction == Some(Direction::Decrease) {
                    return Some(-value);
                }
                return Some(value);
            }
        }

        if !has_any(text, EXPOSURE_KEYWORDS) {
            return None;
        }
        match direction? {
            Direction::Increase => Some(self.policy.exposure_step),
            Direction::Decrease => Some(-self.policy.exposure_step),
        }
    }

    fn parse_iso(&self, text: &str) -> Option<u32> {
        if let Some(value) = ISO_VALUE
            .as_ref()
            .and_then(|re| re.captures(text))
            .and_then(|caps| caps[1].parse::<u32>().ok())
        {
            return Some(value);
        }

        if !has_any(text, ISO_KEYWORDS) {
            return None;
        }
        match direction(text)? {
            Direction::Increase => Some(self.policy.iso_raise),
            Direction::Decrease => Some(self.policy.iso_lower),
        }
    }
}

/// Increase keywords take precedence when both directions appear.
fn direction(text: &str) -> Option<Direction> {
    if has_any(text, INCREASE_KEYWORDS) {
        Some(Direction::Increase)
    } else if has_any(text, DECREASE_KEYWORDS) {
        Some(Direction::Decrease)
    } else {
        None
    }
}

fn parse_aperture(text: &str) -> Option<String> {
    if let Some(caps) = F_STOP.as_ref().and_then(|re| re.captures(text)) {
        return Some(format!("f/{}", &caps[1]));
    }

    if has_any(text, &["blur", "background", "bokeh"]) {
        Some(WIDE_APERTURE.to_string())
    } else if has_any(text, &["sharp", "depth of field", "clarity"]) {
        Some(NARROW_APERTURE.to_string())
    } else if has_word(text, "aperture") {
        match direction(text)? {
            Direction::Increase => Some(WIDE_APERTURE.to_string()),
            Direction::Decrease => Some(NARROW_APERTURE.to_string()),
        }
    } else {
        None
    }
}

fn parse_focus(text: &str) -> Option<FocusMode> {
    if has_any(text, &["macro focus", "macro", "close"]) {
        Some(FocusMode::Macro)
    } else if has_any(text, &["infinity focus", "infinity", "far", "distance"]) {
        Some(FocusMode::Infinity)
    } else if has_any(text, &["auto focus", "automatic focus"]) {
        Some(FocusMode::Auto)
    } else {
        None
    }
}

fn parse_white_balance(text: &str) -> Option<WhiteBalance> {
    if has_any(text, &["cool", "blue", "cold"]) {
        Some(WhiteBalance::Cloudy)
    } else if has_any(text, &["warm", "yellow", "orange"]) {
        Some(WhiteBalance::Incandescent)
    } else if has_any(text, &["daylight", "sun", "natural"]) {
        Some(WhiteBalance::Daylight)
    } else if has_any(text, &["auto white balance", "automatic white balance"]) {
        Some(WhiteBalance::Auto)
    } else {
        None
    }
}

fn parse_scene_mode(text: &str) -> Option<SceneMode> {
    if has_any(text, &["portrait mode", "portrait", "people", "person"]) {
        Some(SceneMode::Portrait)
    } else if has_any(text, &["landscape mode", "landscape", "scenery", "nature"]) {
        Some(SceneMode::Landscape)
    } else if has_any(text, &["night mode", "night scene", "evening"])
        || (has_word(text, "night") && has_word(text, "mode"))
    {
        Some(SceneMode::Night)
    } else if has_any(text, &["sport mode", "sport", "action", "movement"]) {
        Some(SceneMode::Sport)
    } else if has_any(text, &["auto scene", "automatic scene"]) {
        Some(SceneMode::Auto)
    } else {
        None
    }
}

fn has_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| has_word(text, k))
}

/// Returns `true` if `keyword` occurs in `text` starting at a word boundary.
fn has_word(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(start, _)| {
        text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}
