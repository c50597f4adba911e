//! Risk band table: composite score -> risk class.

use risk_types::RiskClass;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::types::BandFile;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskBand {
    pub class: RiskClass,
    /// Exclusive upper bound; `None` for the last, open-ended band
    pub below: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskBands {
    bands: Vec<RiskBand>,
}

impl RiskBands {
    /// Every band but the last needs a `below` bound inside (0, 100]; bounds
    /// must increase and each class may appear only once.
    pub fn from_file(bands: &[BandFile]) -> Result<Self, ConfigError> {
        let Some((last, bounded)) = bands.split_last() else {
            return Err(ConfigError::InvalidBands("no bands declared".into()));
        };
        if let Some(below) = last.below {
            return Err(ConfigError::InvalidBands(format!(
                "last band {} must be open-ended, found below {}",
                last.class, below
            )));
        }

        let mut previous: Option<Decimal> = None;
        for band in bounded {
            let below = band.below.ok_or_else(|| {
                ConfigError::InvalidBands(format!("band {} is missing below", band.class))
            })?;
            if below <= Decimal::ZERO || below > Decimal::ONE_HUNDRED {
                return Err(ConfigError::InvalidBands(format!(
                    "band {} bound {} is outside (0, 100]",
                    band.class, below
                )));
            }
            if previous.is_some_and(|p| below <= p) {
                return Err(ConfigError::InvalidBands(format!(
                    "band {} bound {} does not increase",
                    band.class, below
                )));
            }
            previous = Some(below);
        }

        for (i, band) in bands.iter().enumerate() {
            if bands[..i].iter().any(|b| b.class == band.class) {
                return Err(ConfigError::InvalidBands(format!(
                    "class {} declared more than once",
                    band.class
                )));
            }
        }

        Ok(Self {
            bands: bands
                .iter()
                .map(|b| RiskBand {
                    class: b.class,
                    below: b.below,
                })
                .collect(),
        })
    }

    pub fn bands(&self) -> &[RiskBand] {
        &self.bands
    }

    pub fn classify(&self, score: Decimal) -> RiskClass {
        self.bands
            .iter()
            .find(|band| band.below.map_or(true, |below| score < below))
            .map(|band| band.class)
            .unwrap_or(RiskClass::High)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(class: RiskClass, below: Option<i64>) -> BandFile {
        BandFile {
            class,
            below: below.map(|b| Decimal::new(b, 0)),
        }
    }

    fn standard() -> RiskBands {
        RiskBands::from_file(&[
            band(RiskClass::Low, Some(34)),
            band(RiskClass::Medium, Some(67)),
            band(RiskClass::High, None),
        ])
        .unwrap()
    }

    #[test]
    fn classify_boundaries() {
        let bands = standard();
        assert_eq!(bands.classify(Decimal::ZERO), RiskClass::Low);
        assert_eq!(bands.classify(Decimal::new(3399, 2)), RiskClass::Low);
        assert_eq!(bands.classify(Decimal::new(34, 0)), RiskClass::Medium);
        assert_eq!(bands.classify(Decimal::new(6699, 2)), RiskClass::Medium);
        assert_eq!(bands.classify(Decimal::new(67, 0)), RiskClass::High);
        assert_eq!(bands.classify(Decimal::ONE_HUNDRED), RiskClass::High);
    }

    #[test]
    fn rejects_empty_table() {
        assert!(matches!(
            RiskBands::from_file(&[]),
            Err(ConfigError::InvalidBands(_))
        ));
    }

    #[test]
    fn rejects_bounded_last_band() {
        let err = RiskBands::from_file(&[band(RiskClass::Low, Some(50))]).unwrap_err();
        assert!(err.to_string().contains("open-ended"));
    }

    #[test]
    fn rejects_missing_bound() {
        let err = RiskBands::from_file(&[band(RiskClass::Low, None), band(RiskClass::High, None)])
            .unwrap_err();
        assert!(err.to_string().contains("missing below"));
    }

    #[test]
    fn rejects_decreasing_bounds() {
        let err = RiskBands::from_file(&[
            band(RiskClass::Low, Some(60)),
            band(RiskClass::Medium, Some(40)),
            band(RiskClass::High, None),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("does not increase"));
    }

    #[test]
    fn rejects_duplicate_class() {
        let err = RiskBands::from_file(&[
            band(RiskClass::Low, Some(40)),
            band(RiskClass::Low, None),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
