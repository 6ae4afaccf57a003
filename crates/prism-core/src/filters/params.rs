use serde::{Deserialize, Serialize};

use super::kernels::white_balance::NEUTRAL_TEMPERATURE;

/// The shape of parameters a filter accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Intensity,
    WhiteBalance,
    Exposure,
    Contrast,
    Saturation,
}

/// Filter-specific numeric parameters.
///
/// Every variant has a neutral value at which the filter contributes
/// nothing. Edit states never store neutral parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterParams {
    /// Blend amount in [0, 1].
    Intensity { amount: f32 },
    /// Scene illuminant in Kelvin [2000, 12000] and green-magenta tint [-150, 150].
    WhiteBalance { temperature: f32, tint: f32 },
    /// Exposure compensation in EV stops [-4, 4].
    Exposure { ev: f32 },
    /// [-100, 100]
    Contrast { amount: f32 },
    /// [-100, 100]
    Saturation { amount: f32 },
}

impl FilterParams {
    pub fn neutral(kind: ParamKind) -> Self {
        match kind {
            ParamKind::Intensity => Self::Intensity { amount: 0.0 },
            ParamKind::WhiteBalance => Self::WhiteBalance {
                temperature: NEUTRAL_TEMPERATURE,
                tint: 0.0,
            },
            ParamKind::Exposure => Self::Exposure { ev: 0.0 },
            ParamKind::Contrast => Self::Contrast { amount: 0.0 },
            ParamKind::Saturation => Self::Saturation { amount: 0.0 },
        }
    }

    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Intensity { .. } => ParamKind::Intensity,
            Self::WhiteBalance { .. } => ParamKind::WhiteBalance,
            Self::Exposure { .. } => ParamKind::Exposure,
            Self::Contrast { .. } => ParamKind::Contrast,
            Self::Saturation { .. } => ParamKind::Saturation,
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral(self.kind())
    }

    /// Clamp every field into its documented range. NaN becomes neutral.
    pub fn clamped(self) -> Self {
        fn clamp(v: f32, lo: f32, hi: f32, neutral: f32) -> f32 {
            if v.is_nan() { neutral } else { v.clamp(lo, hi) }
        }

        match self {
            Self::Intensity { amount } => Self::Intensity {
                amount: clamp(amount, 0.0, 1.0, 0.0),
            },
            Self::WhiteBalance { temperature, tint } => Self::WhiteBalance {
                temperature: clamp(temperature, 2000.0, 12000.0, NEUTRAL_TEMPERATURE),
                tint: clamp(tint, -150.0, 150.0, 0.0),
            },
            Self::Exposure { ev } => Self::Exposure {
                ev: clamp(ev, -4.0, 4.0, 0.0),
            },
            Self::Contrast { amount } => Self::Contrast {
                amount: clamp(amount, -100.0, 100.0, 0.0),
            },
            Self::Saturation { amount } => Self::Saturation {
                amount: clamp(amount, -100.0, 100.0, 0.0),
            },
        }
    }

    /// Feed a canonical byte encoding into `hasher`.
    pub(crate) fn hash_into(&self, hasher: &mut blake3::Hasher) {
        let (tag, fields): (u8, [f32; 2]) = match *self {
            Self::Intensity { amount } => (0, [amount, 0.0]),
            Self::WhiteBalance { temperature, tint } => (1, [temperature, tint]),
            Self::Exposure { ev } => (2, [ev, 0.0]),
            Self::Contrast { amount } => (3, [amount, 0.0]),
            Self::Saturation { amount } => (4, [amount, 0.0]),
        };
        hasher.update(&[tag]);
        for field in fields {
            hasher.update(&field.to_le_bytes());
        }
    }
}
