use std::{fmt::Display, str::FromStr};

use chrono::{Datelike, Days, NaiveDate};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneIdError {
    #[error("`{0}` is not a Landsat 8 scene identifier")]
    Unrecognized(String),
    #[error("`{id}` has an invalid {field}")]
    InvalidField { id: String, field: &'static str },
}

/// Product identifier layouts used by the USGS archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdFormat {
    /// `LC8PPPRRRYYYYDDDGSIVV`
    PreCollection { station: String, version: u8 },
    /// `LC08_LLLL_PPPRRR_YYYYMMDD_YYYYMMDD_CC_TX`
    Collection {
        level: String,
        processed: NaiveDate,
        collection: u8,
        tier: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneId {
    sensor: String,
    path: u16,
    row: u16,
    acquired: NaiveDate,
    format: IdFormat,
}

impl SceneId {
    pub fn footprint(&self) -> (u16, u16) {
        (self.path, self.row)
    }

    pub fn acquired(&self) -> NaiveDate {
        self.acquired
    }

    pub fn format(&self) -> &IdFormat {
        &self.format
    }

    /// Level-2 products store scaled surface reflectance instead of digital
    /// numbers.
    pub fn is_surface_reflectance(&self) -> bool {
        matches!(&self.format, IdFormat::Collection { level, .. } if level.starts_with("L2"))
    }

    /// Returns `true` if `other` covers the same WRS path/row and was acquired
    /// exactly `days` before `self`.
    pub fn is_revisit_of(&self, other: &SceneId, days: u64) -> bool {
        self.footprint() == other.footprint()
            && self.acquired.checked_sub_days(Days::new(days)) == Some(other.acquired)
    }

    fn parse_pre_collection(s: &str) -> Result<Self, SceneIdError> {
        let invalid = |field| SceneIdError::InvalidField {
            id: s.to_string(),
            field,
        };

        if s.len() != 21 || !s.is_ascii() {
            return Err(SceneIdError::Unrecognized(s.to_string()));
        }
        let path = parse_digits(&s[3..6]).ok_or_else(|| invalid("path"))?;
        let row = parse_digits(&s[6..9]).ok_or_else(|| invalid("row"))?;
        let year = parse_digits(&s[9..13]).ok_or_else(|| invalid("year"))?;
        let day = parse_digits(&s[13..16]).ok_or_else(|| invalid("day of year"))?;
        let acquired = NaiveDate::from_yo_opt(year.into(), day.into())
            .ok_or_else(|| invalid("acquisition date"))?;
        let station = &s[16..19];
        if !station.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(invalid("ground station"));
        }
        let version = parse_digits(&s[19..21]).ok_or_else(|| invalid("version"))?;

        Ok(Self {
            sensor: s[..3].to_string(),
            path,
            row,
            acquired,
            format: IdFormat::PreCollection {
                station: station.to_string(),
                version: version as u8,
            },
        })
    }

    fn parse_collection(s: &str) -> Result<Self, SceneIdError> {
        let invalid = |field| SceneIdError::InvalidField {
            id: s.to_string(),
            field,
        };

        let parts = s.split('_').collect::<Vec<_>>();
        let &[sensor, level, footprint, acquired, processed, collection, tier] = parts.as_slice()
        else {
            return Err(SceneIdError::Unrecognized(s.to_string()));
        };
        if footprint.len() != 6 || !footprint.is_ascii() {
            return Err(invalid("path/row"));
        }
        let path = parse_digits(&footprint[..3]).ok_or_else(|| invalid("path"))?;
        let row = parse_digits(&footprint[3..]).ok_or_else(|| invalid("row"))?;
        let acquired =
            NaiveDate::parse_from_str(acquired, "%Y%m%d").map_err(|_| invalid("acquisition date"))?;
        let processed =
            NaiveDate::parse_from_str(processed, "%Y%m%d").map_err(|_| invalid("processing date"))?;
        if collection.len() != 2 {
            return Err(invalid("collection number"));
        }
        let collection = parse_digits(collection).ok_or_else(|| invalid("collection number"))?;

        Ok(Self {
            sensor: sensor.to_string(),
            path,
            row,
            acquired,
            format: IdFormat::Collection {
                level: level.to_string(),
                processed,
                collection: collection as u8,
                tier: tier.to_string(),
            },
        })
    }
}

fn parse_digits(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for SceneId {
    type Err = SceneIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("LC08_") || s.starts_with("LO08_") {
            Self::parse_collection(s)
        } else if s.starts_with("LC8") || s.starts_with("LO8") {
            Self::parse_pre_collection(s)
        } else {
            Err(SceneIdError::Unrecognized(s.to_string()))
        }
    }
}

impl Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.format {
            IdFormat::PreCollection { station, version } => write!(
                f,
                "{}{:03}{:03}{:04}{:03}{}{:02}",
                self.sensor,
                self.path,
                self.row,
                self.acquired.year(),
                self.acquired.ordinal(),
                station,
                version
            ),
            IdFormat::Collection {
                level,
                processed,
                collection,
                tier,
            } => write!(
                f,
                "{}_{}_{:03}{:03}_{}_{}_{:02}_{}",
                self.sensor,
                level,
                self.path,
                self.row,
                self.acquired.format("%Y%m%d"),
                processed.format("%Y%m%d"),
                collection,
                tier
            ),
        }
    }
}
