use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Geographic hierarchy level of an area.
///
/// A closed enumeration of the four levels the upstream API reports, from
/// coarsest (Nation) to finest (Lower tier local authority). Serialized
/// records carry the human-readable label; cache keys use the variant name
/// (e.g. `Cases.Nation.2020-03`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
)]
pub enum AreaLevel {
    #[serde(rename = "Nation")]
    Nation,
    #[serde(rename = "Region")]
    Region,
    #[serde(rename = "Upper tier local authority")]
    UpperTierLocalAuthority,
    #[serde(rename = "Lower tier local authority")]
    LowerTierLocalAuthority,
}

impl AreaLevel {
    /// Level vocabulary used by the upstream API (`areaType=` filter).
    pub fn api_name(&self) -> &'static str {
        match self {
            AreaLevel::Nation => "nation",
            AreaLevel::Region => "region",
            AreaLevel::UpperTierLocalAuthority => "utla",
            AreaLevel::LowerTierLocalAuthority => "ltla",
        }
    }

    /// Human-readable label, as shown on the dashboard and stored in records.
    pub fn label(&self) -> &'static str {
        match self {
            AreaLevel::Nation => "Nation",
            AreaLevel::Region => "Region",
            AreaLevel::UpperTierLocalAuthority => "Upper tier local authority",
            AreaLevel::LowerTierLocalAuthority => "Lower tier local authority",
        }
    }

    /// Levels ordered finest-first, used when resolving an ambiguous area
    /// name (lower tier authorities take precedence).
    pub fn finest_first() -> [AreaLevel; 4] {
        [
            AreaLevel::LowerTierLocalAuthority,
            AreaLevel::UpperTierLocalAuthority,
            AreaLevel::Region,
            AreaLevel::Nation,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_api_names_are_distinct() {
        let names: Vec<&str> = AreaLevel::iter().map(|l| l.api_name()).collect();
        assert_eq!(names, vec!["nation", "region", "utla", "ltla"]);
    }

    #[test]
    fn test_key_segment_is_single_token() {
        for level in AreaLevel::iter() {
            assert!(!level.to_string().contains(' '));
        }
        assert_eq!(
            AreaLevel::UpperTierLocalAuthority.to_string(),
            "UpperTierLocalAuthority"
        );
    }

    #[test]
    fn test_serde_uses_human_label() {
        let json = serde_json::to_string(&AreaLevel::LowerTierLocalAuthority).unwrap();
        assert_eq!(json, "\"Lower tier local authority\"");
        let back: AreaLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AreaLevel::LowerTierLocalAuthority);
    }
}
