//! Camera parameters, image analysis results and refinement history.
//!
//! All types serialize to camelCase JSON. Enum tokens are lowercase on output
//! and parsed case-insensitively on input.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ISO_MAX, ISO_MIN};

/// Lowest exposure compensation stored on a parameter snapshot, in EV.
pub const EXPOSURE_MIN: f64 = -3.0;

/// Highest exposure compensation stored on a parameter snapshot, in EV.
pub const EXPOSURE_MAX: f64 = 3.0;

/// Declares a closed token enum with case-insensitive parsing and lowercase
/// serialization.
macro_rules! token_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $token:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Returns the wire token for this value.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $token ),+
                }
            }

            /// Parses a token, case-insensitively.
            fn from_str_case_insensitive(s: &str) -> Option<Self> {
                let lower = s.trim().to_lowercase();
                Self::ALL.iter().copied().find(|v| v.as_str() == lower)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Self::from_str_case_insensitive(s).ok_or_else(|| {
                    let expected: Vec<_> = Self::ALL.iter().map(|v| format!("'{}'", v.as_str())).collect();
                    format!("invalid {} '{s}': expected one of {}", $label, expected.join(", "))
                })
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

// ============================================================================
// Camera setting tokens
// ============================================================================

token_enum! {
    /// How the camera chooses its focus distance.
    FocusMode, "focus mode" {
        /// Continuous autofocus.
        Auto => "auto",
        /// Close-up focus.
        Macro => "macro",
        /// Focus locked at infinity.
        Infinity => "infinity",
        /// Manual focus.
        Manual => "manual",
    }
}

token_enum! {
    /// White balance preset.
    WhiteBalance, "white balance" {
        /// Automatic white balance.
        Auto => "auto",
        /// Direct sunlight.
        Daylight => "daylight",
        /// Overcast light; warms the image.
        Cloudy => "cloudy",
        /// Fluorescent tubes.
        Fluorescent => "fluorescent",
        /// Tungsten bulbs; cools the image.
        Incandescent => "incandescent",
        /// Flash.
        Flash => "flash",
    }
}

token_enum! {
    /// Camera scene program.
    SceneMode, "scene mode" {
        /// Automatic scene selection.
        Auto => "auto",
        /// Subject isolation with shallow depth of field.
        Portrait => "portrait",
        /// Deep depth of field.
        Landscape => "landscape",
        /// Low light.
        Night => "night",
        /// Fast shutter for motion.
        Sport => "sport",
    }
}

// ============================================================================
// Analysis tokens
// ============================================================================

token_enum! {
    /// Scene category inferred from a reference photo.
    SceneType, "scene type" {
        /// Few edges, typically an isolated subject.
        Portrait => "portrait",
        /// Moderate edge density.
        Landscape => "landscape",
        /// Dark image.
        Night => "night",
        /// Many edges, typically buildings or interiors.
        Architecture => "architecture",
    }
}

token_enum! {
    /// Overall color cast of a photo.
    ColorTemperature, "color temperature" {
        /// Blue-dominant.
        Cool => "cool",
        /// Red-dominant.
        Warm => "warm",
        /// Balanced.
        Neutral => "neutral",
    }
}

token_enum! {
    /// One cell of the 3×3 composition grid, in row-major order.
    GridRegion, "grid region" {
        /// Row 0, column 0.
        TopLeft => "top_left",
        /// Row 0, column 1.
        TopCenter => "top_center",
        /// Row 0, column 2.
        TopRight => "top_right",
        /// Row 1, column 0.
        CenterLeft => "center_left",
        /// Row 1, column 1.
        Center => "center",
        /// Row 1, column 2.
        CenterRight => "center_right",
        /// Row 2, column 0.
        BottomLeft => "bottom_left",
        /// Row 2, column 1.
        BottomCenter => "bottom_center",
        /// Row 2, column 2.
        BottomRight => "bottom_right",
    }
}

impl GridRegion {
    /// Returns the cell at `row`, `col` (both in `0..3`).
    #[must_use]
    pub fn at(row: usize, col: usize) -> Option<Self> {
        if row < 3 && col < 3 {
            Self::ALL.get(row * 3 + col).copied()
        } else {
            None
        }
    }

    /// Returns `true` for the four corner cells, which sit on rule-of-thirds
    /// intersections.
    #[must_use]
    pub const fn is_corner(self) -> bool {
        matches!(
            self,
            Self::TopLeft | Self::TopRight | Self::BottomLeft | Self::BottomRight
        )
    }
}

// ============================================================================
// Camera parameters
// ============================================================================

/// A snapshot of camera settings.
///
/// Every field is independently optional: `None` means no recommendation has
/// been made for it yet. Snapshots are replaced, never edited in place, when
/// feedback is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraParameters {
    /// Exposure compensation in EV, within `[-3, 3]`.
    #[serde(default, alias = "exposure", skip_serializing_if = "Option::is_none")]
    pub exposure_compensation: Option<f64>,

    /// F-stop token such as `f/2.8`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture: Option<String>,

    /// Sensor sensitivity, within `[25, 3200]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,

    /// Focus mode.
    #[serde(default, alias = "focus", skip_serializing_if = "Option::is_none")]
    pub focus_mode: Option<FocusMode>,

    /// White balance preset.
    #[serde(default, alias = "white_balance", skip_serializing_if = "Option::is_none")]
    pub white_balance: Option<WhiteBalance>,

    /// Scene program.
    #[serde(default, alias = "scene_mode", skip_serializing_if = "Option::is_none")]
    pub scene_mode: Option<SceneMode>,
}

impl CameraParameters {
    /// Returns `true` if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.exposure_compensation.is_none()
            && self.aperture.is_none()
            && self.iso.is_none()
            && self.focus_mode.is_none()
            && self.white_balance.is_none()
            && self.scene_mode.is_none()
    }

    /// Produces a new snapshot with `delta` applied.
    ///
    /// Exposure is added to the current value (or 0) and clamped to `[-3, 3]`.
    /// Every other field in the delta replaces the current value; ISO is
    /// clamped to the supported range.
    #[must_use]
    pub fn with_delta(&self, delta: &ParameterDelta) -> Self {
        let mut next = self.clone();

        if let Some(offset) = delta.exposure_compensation {
            let base = self.exposure_compensation.unwrap_or(0.0);
            next.exposure_compensation = Some((base + offset).clamp(EXPOSURE_MIN, EXPOSURE_MAX));
        }
        if let Some(aperture) = &delta.aperture {
            next.aperture = Some(aperture.clone());
        }
        if let Some(iso) = delta.iso {
            next.iso = Some(iso.clamp(ISO_MIN, ISO_MAX));
        }
        if delta.focus_mode.is_some() {
            next.focus_mode = delta.focus_mode;
        }
        if delta.white_balance.is_some() {
            next.white_balance = delta.white_balance;
        }
        if delta.scene_mode.is_some() {
            next.scene_mode = delta.scene_mode;
        }

        next
    }

    /// Returns the change that actually took `self` to `next`, limited to the
    /// fields `requested` touched.
    ///
    /// Exposure is the clamped difference, so a saturated offset records
    /// `0.0`. ISO is the value after clamping.
    #[must_use]
    pub fn applied_delta(&self, next: &Self, requested: &ParameterDelta) -> ParameterDelta {
        ParameterDelta {
            exposure_compensation: requested.exposure_compensation.map(|_| {
                next.exposure_compensation.unwrap_or(0.0)
                    - self.exposure_compensation.unwrap_or(0.0)
            }),
            aperture: requested.aperture.clone(),
            iso: requested.iso.and(next.iso),
            focus_mode: requested.focus_mode,
            white_balance: requested.white_balance,
            scene_mode: requested.scene_mode,
        }
    }
}

/// The partial change produced by one piece of feedback.
///
/// `exposure_compensation` here is an offset added to the current value, not
/// an absolute setting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDelta {
    /// Exposure offset in EV.
    #[serde(default, alias = "exposure", skip_serializing_if = "Option::is_none")]
    pub exposure_compensation: Option<f64>,

    /// Replacement f-stop token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture: Option<String>,

    /// Replacement ISO.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,

    /// Replacement focus mode.
    #[serde(default, alias = "focus", skip_serializing_if = "Option::is_none")]
    pub focus_mode: Option<FocusMode>,

    /// Replacement white balance.
    #[serde(default, alias = "white_balance", skip_serializing_if = "Option::is_none")]
    pub white_balance: Option<WhiteBalance>,

    /// Replacement scene program.
    #[serde(default, alias = "scene_mode", skip_serializing_if = "Option::is_none")]
    pub scene_mode: Option<SceneMode>,
}

impl ParameterDelta {
    /// Returns `true` if the delta changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    /// Returns the camelCase names of the fields this delta touches.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.exposure_compensation.is_some() {
            names.push("exposureCompensation");
        }
        if self.aperture.is_some() {
            names.push("aperture");
        }
        if self.iso.is_some() {
            names.push("iso");
        }
        if self.focus_mode.is_some() {
            names.push("focusMode");
        }
        if self.white_balance.is_some() {
            names.push("whiteBalance");
        }
        if self.scene_mode.is_some() {
            names.push("sceneMode");
        }
        names
    }
}

// ============================================================================
// Image analysis
// ============================================================================

/// Where the visual weight of a photo sits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionSummary {
    /// Grid cell with the most edge energy.
    pub dominant_region: GridRegion,
    /// Sum of edge intensities per grid cell.
    pub edge_density: BTreeMap<GridRegion, u64>,
    /// Whether the dominant region is a rule-of-thirds corner.
    pub rule_of_thirds: bool,
    /// Fraction of pixels classified as edges.
    pub edge_pixel_ratio: f64,
}

/// Color statistics of a photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorSummary {
    /// Most frequent hue bucket, in `0..180`.
    pub dominant_hue: u8,
    /// Mean HSV saturation in `[0, 1]`.
    pub mean_saturation: f64,
    /// Mean HSV value in `[0, 1]`.
    pub mean_value: f64,
    /// Overall color cast.
    pub color_temperature: ColorTemperature,
}

/// Result of analyzing a reference photo. Produced once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    /// Estimated exposure offset of the photo, within `[-3, 3]`.
    pub exposure_estimate: f64,
    /// Mean channel intensity in `[0, 1]`.
    pub brightness: f64,
    /// Mean channel standard deviation in `[0, 1]`.
    pub contrast: f64,
    /// Mean HSV saturation in `[0, 1]`.
    pub saturation: f64,
    /// Composition grid summary.
    pub composition_summary: CompositionSummary,
    /// Color statistics.
    pub color_summary: ColorSummary,
    /// Inferred scene category.
    pub scene_type: SceneType,
}

// ============================================================================
// Refinement history
// ============================================================================

/// One accepted piece of feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementRecord {
    /// The feedback exactly as the user wrote it.
    pub raw_user_text: String,
    /// What the feedback changed.
    pub applied_delta: ParameterDelta,
    /// When it was applied.
    pub timestamp: DateTime<Utc>,
}

impl RefinementRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(raw_user_text: impl Into<String>, applied_delta: ParameterDelta) -> Self {
        Self {
            raw_user_text: raw_user_text.into(),
            applied_delta,
            timestamp: Utc::now(),
        }
    }
}
