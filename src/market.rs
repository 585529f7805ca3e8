use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Deserialize;

/// Markets the catalog is queried in. Track availability (and therefore the
/// dropped count) depends on the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    #[default]
    Us,
    Gb,
    De,
    Fr,
    Ca,
    Au,
    Br,
    Jp,
}

impl Market {
    pub const ALL: [Market; 8] = [
        Market::Us,
        Market::Gb,
        Market::De,
        Market::Fr,
        Market::Ca,
        Market::Au,
        Market::Br,
        Market::Jp,
    ];

    /// ISO 3166-1 alpha-2 code sent to the catalog API.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Us => "US",
            Self::Gb => "GB",
            Self::De => "DE",
            Self::Fr => "FR",
            Self::Ca => "CA",
            Self::Au => "AU",
            Self::Br => "BR",
            Self::Jp => "JP",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Market {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.code() == upper)
            .ok_or_else(|| {
                let codes: Vec<&str> = Self::ALL.iter().map(|m| m.code()).collect();
                format!("Unknown market '{}'. Supported: {}", s, codes.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("us".parse::<Market>().unwrap(), Market::Us);
        assert_eq!(" JP ".parse::<Market>().unwrap(), Market::Jp);
        assert_eq!("Gb".parse::<Market>().unwrap(), Market::Gb);
    }

    #[test]
    fn test_unknown_market() {
        let err = "XX".parse::<Market>().unwrap_err();
        assert!(err.contains("Unknown market"));
        assert!(err.contains("US"));
    }

    #[test]
    fn test_codes_round_trip_through_display() {
        for m in Market::ALL {
            assert_eq!(m.to_string().parse::<Market>().unwrap(), m);
        }
    }

    #[test]
    fn test_deserialize_from_config_value() {
        #[derive(Deserialize)]
        struct Wrapper {
            market: Market,
        }
        let w: Wrapper = toml::from_str(r#"market = "DE""#).unwrap();
        assert_eq!(w.market, Market::De);
    }
}
