use std::fmt;

use serde::{Deserialize, Serialize};

/// Standardised vehicular safety message families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafetyKind {
    Cam,
    Denm,
    Bsm,
    Spat,
    Map,
    Emergency,
    /// Labelled "safety" without naming a standard family.
    Generic,
}

impl SafetyKind {
    /// Keyword table in match priority order.
    pub const KEYWORDS: [(&'static str, SafetyKind); 7] = [
        ("cam", SafetyKind::Cam),
        ("denm", SafetyKind::Denm),
        ("bsm", SafetyKind::Bsm),
        ("spat", SafetyKind::Spat),
        ("map", SafetyKind::Map),
        ("emergency", SafetyKind::Emergency),
        ("safety", SafetyKind::Generic),
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SafetyKind::Cam => "CAM",
            SafetyKind::Denm => "DENM",
            SafetyKind::Bsm => "BSM",
            SafetyKind::Spat => "SPAT",
            SafetyKind::Map => "MAP",
            SafetyKind::Emergency => "emergency",
            SafetyKind::Generic => "safety",
        }
    }
}

/// What a V2V message carries, tagged at construction time.
///
/// Channel selection only ever looks at the variant, so a safety message
/// cannot end up on a service channel because of how its label was spelled.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Safety(SafetyKind),
    NonSafety(String),
}

impl MessageKind {
    /// Tags a free-form label: any case-insensitive occurrence of a safety
    /// keyword makes it a safety message.
    pub fn classify(label: &str) -> Self {
        let lowered = label.to_ascii_lowercase();
        SafetyKind::KEYWORDS
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, kind)| MessageKind::Safety(*kind))
            .unwrap_or_else(|| MessageKind::NonSafety(label.to_string()))
    }

    pub fn is_safety(&self) -> bool {
        matches!(self, MessageKind::Safety(_))
    }

    pub fn label(&self) -> &str {
        match self {
            MessageKind::Safety(kind) => kind.label(),
            MessageKind::NonSafety(label) => label,
        }
    }
}

impl From<SafetyKind> for MessageKind {
    fn from(kind: SafetyKind) -> Self {
        MessageKind::Safety(kind)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_classify_as_safety() {
        let cases = [
            ("CAM", SafetyKind::Cam),
            ("denm_hazard", SafetyKind::Denm),
            ("Bsm", SafetyKind::Bsm),
            ("spat-update", SafetyKind::Spat),
            ("MAP", SafetyKind::Map),
            ("EMERGENCY_BRAKE", SafetyKind::Emergency),
            ("road safety notice", SafetyKind::Generic),
        ];
        for (label, expected) in cases {
            assert_eq!(MessageKind::classify(label), MessageKind::Safety(expected), "{label}");
        }
    }

    #[test]
    fn test_other_labels_are_non_safety() {
        let kind = MessageKind::classify("infotainment");
        assert_eq!(kind, MessageKind::NonSafety("infotainment".into()));
        assert!(!kind.is_safety());
        assert_eq!(kind.to_string(), "infotainment");
    }
}
