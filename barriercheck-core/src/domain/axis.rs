//! The twelve WCAG 2.1 success-criterion groups evaluated independently

use serde::{Deserialize, Serialize};

/// WCAG principle a success-criterion group belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principle {
    Perceivable,
    Operable,
    Understandable,
    Robust,
}

impl Principle {
    /// Relative weight of this principle in the weighted technical score.
    ///
    /// Perceivable and operable barriers lock users out entirely, so they
    /// carry the largest share; the four weights sum to 1.0.
    pub fn weight(&self) -> f64 {
        match self {
            Principle::Perceivable => 0.30,
            Principle::Operable => 0.30,
            Principle::Understandable => 0.25,
            Principle::Robust => 0.15,
        }
    }
}

/// One of the twelve WCAG 2.1 success-criterion groups.
///
/// The string key is the stable identifier used for prompt template files,
/// the `module_name` column of persisted results and the slicer registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    #[serde(rename = "1_1_text_alternatives")]
    TextAlternatives,
    #[serde(rename = "1_2_time_based_media")]
    TimeBasedMedia,
    #[serde(rename = "1_3_adaptable")]
    Adaptable,
    #[serde(rename = "1_4_distinguishable")]
    Distinguishable,
    #[serde(rename = "2_1_keyboard")]
    Keyboard,
    #[serde(rename = "2_2_enough_time")]
    EnoughTime,
    #[serde(rename = "2_3_seizures")]
    Seizures,
    #[serde(rename = "2_4_navigable")]
    Navigable,
    #[serde(rename = "3_1_readable")]
    Readable,
    #[serde(rename = "3_2_predictable")]
    Predictable,
    #[serde(rename = "3_3_input_assistance")]
    InputAssistance,
    #[serde(rename = "4_1_compatible")]
    Compatible,
}

impl Axis {
    /// All twelve axes, in criterion order.
    pub const ALL: [Axis; 12] = [
        Axis::TextAlternatives,
        Axis::TimeBasedMedia,
        Axis::Adaptable,
        Axis::Distinguishable,
        Axis::Keyboard,
        Axis::EnoughTime,
        Axis::Seizures,
        Axis::Navigable,
        Axis::Readable,
        Axis::Predictable,
        Axis::InputAssistance,
        Axis::Compatible,
    ];

    /// Stable string key (matches the serde rename).
    pub fn key(&self) -> &'static str {
        match self {
            Axis::TextAlternatives => "1_1_text_alternatives",
            Axis::TimeBasedMedia => "1_2_time_based_media",
            Axis::Adaptable => "1_3_adaptable",
            Axis::Distinguishable => "1_4_distinguishable",
            Axis::Keyboard => "2_1_keyboard",
            Axis::EnoughTime => "2_2_enough_time",
            Axis::Seizures => "2_3_seizures",
            Axis::Navigable => "2_4_navigable",
            Axis::Readable => "3_1_readable",
            Axis::Predictable => "3_2_predictable",
            Axis::InputAssistance => "3_3_input_assistance",
            Axis::Compatible => "4_1_compatible",
        }
    }

    /// Human-readable group name as published in reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            Axis::TextAlternatives => "1.1 Text Alternatives",
            Axis::TimeBasedMedia => "1.2 Time-based Media",
            Axis::Adaptable => "1.3 Adaptable",
            Axis::Distinguishable => "1.4 Distinguishable",
            Axis::Keyboard => "2.1 Keyboard Accessible",
            Axis::EnoughTime => "2.2 Enough Time",
            Axis::Seizures => "2.3 Seizures and Physical Reactions",
            Axis::Navigable => "2.4 Navigable",
            Axis::Readable => "3.1 Readable",
            Axis::Predictable => "3.2 Predictable",
            Axis::InputAssistance => "3.3 Input Assistance",
            Axis::Compatible => "4.1 Compatible",
        }
    }

    pub fn principle(&self) -> Principle {
        match self {
            Axis::TextAlternatives
            | Axis::TimeBasedMedia
            | Axis::Adaptable
            | Axis::Distinguishable => Principle::Perceivable,
            Axis::Keyboard | Axis::EnoughTime | Axis::Seizures | Axis::Navigable => {
                Principle::Operable
            }
            Axis::Readable | Axis::Predictable | Axis::InputAssistance => {
                Principle::Understandable
            }
            Axis::Compatible => Principle::Robust,
        }
    }

    /// Parse a stable key back into an axis.
    pub fn from_key(key: &str) -> Option<Axis> {
        Axis::ALL.iter().copied().find(|a| a.key() == key)
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}
