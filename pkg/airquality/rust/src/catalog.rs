//! Fixed enumerations: monitoring sites, pollutants and provenance classes.
//!
//! Site names, display names, units and colours are methods on typed enums
//! rather than parallel lists indexed by position, so a selection value cannot
//! drift out of step with the table it indexes.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::QueryError;

/// A fixed air-quality monitoring location.
///
/// Declaration order is the dashboard order and drives palette assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SiteId {
    #[serde(rename = "AJ_Jacobs")]
    AjJacobs,
    #[serde(rename = "Bongani_Mabaso_Eco_Park")]
    BonganiMabasoEcoPark,
    #[serde(rename = "Leitrim")]
    Leitrim,
    #[serde(rename = "North_West_University_Vaal_campus")]
    NorthWestUniversityVaalCampus,
    #[serde(rename = "Sharpeville")]
    Sharpeville,
    #[serde(rename = "Vanderbijlpark_NAQI")]
    VanderbijlparkNaqi,
    #[serde(rename = "Zamdela_NAQI")]
    ZamdelaNaqi,
}

/// Plotly's qualitative palette, used for Observed and HeldOut markers.
const SITE_COLORS: [&str; 7] = [
    "#636EFA", "#EF553B", "#00CC96", "#AB63FA", "#FFA15A", "#19D3F3", "#FF6692",
];

/// Darker counterparts used for Forecast markers.
const FORECAST_COLORS: [&str; 7] = [
    "#131EAA", "#950000", "#003d2d", "#320365", "#672d00", "#04424c", "#6b001f",
];

impl SiteId {
    pub const ALL: [SiteId; 7] = [
        SiteId::AjJacobs,
        SiteId::BonganiMabasoEcoPark,
        SiteId::Leitrim,
        SiteId::NorthWestUniversityVaalCampus,
        SiteId::Sharpeville,
        SiteId::VanderbijlparkNaqi,
        SiteId::ZamdelaNaqi,
    ];

    /// Identifier used by both backing stores (table name, CSV file prefix).
    pub fn identifier(&self) -> &'static str {
        match self {
            SiteId::AjJacobs => "AJ_Jacobs",
            SiteId::BonganiMabasoEcoPark => "Bongani_Mabaso_Eco_Park",
            SiteId::Leitrim => "Leitrim",
            SiteId::NorthWestUniversityVaalCampus => "North_West_University_Vaal_campus",
            SiteId::Sharpeville => "Sharpeville",
            SiteId::VanderbijlparkNaqi => "Vanderbijlpark_NAQI",
            SiteId::ZamdelaNaqi => "Zamdela_NAQI",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SiteId::AjJacobs => "AJ Jacobs",
            SiteId::BonganiMabasoEcoPark => "Bongani Mabaso Eco Park",
            SiteId::Leitrim => "Leitrim",
            SiteId::NorthWestUniversityVaalCampus => "North West University Vaal campus",
            SiteId::Sharpeville => "Sharpeville",
            SiteId::VanderbijlparkNaqi => "Vanderbijlpark-NAQI",
            SiteId::ZamdelaNaqi => "Zamdela-NAQI",
        }
    }

    /// Position in [`SiteId::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn color(&self) -> &'static str {
        SITE_COLORS[self.index()]
    }

    pub fn forecast_color(&self) -> &'static str {
        FORECAST_COLORS[self.index()]
    }

    /// Resolve a positional selection (checklist value) to a site.
    pub fn from_index(index: usize) -> Result<Self, QueryError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or_else(|| QueryError::UnknownSite(index.to_string()))
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for SiteId {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|site| site.identifier() == s)
            .ok_or_else(|| QueryError::UnknownSite(s.to_string()))
    }
}

/// Measurement unit of a pollutant concentration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Ppb,
    Ppm,
    MicrogramsPerCubicMetre,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Ppb => "ppb",
            Unit::Ppm => "ppm",
            Unit::MicrogramsPerCubicMetre => "\u{03BC}g/m3",
        }
    }
}

/// A tracked pollutant species or particulate class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Pollutant {
    SO2,
    NO2,
    NO,
    NOx,
    O3,
    CO,
    PM2_5,
    PM10,
}

impl Pollutant {
    pub const ALL: [Pollutant; 8] = [
        Pollutant::SO2,
        Pollutant::NO2,
        Pollutant::NO,
        Pollutant::NOx,
        Pollutant::O3,
        Pollutant::CO,
        Pollutant::PM2_5,
        Pollutant::PM10,
    ];

    /// Column name in both backing stores.
    pub fn column(&self) -> &'static str {
        match self {
            Pollutant::SO2 => "SO2",
            Pollutant::NO2 => "NO2",
            Pollutant::NO => "NO",
            Pollutant::NOx => "NOx",
            Pollutant::O3 => "O3",
            Pollutant::CO => "CO",
            Pollutant::PM2_5 => "PM2_5",
            Pollutant::PM10 => "PM10",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Pollutant::PM2_5 => "PM2.5",
            other => other.column(),
        }
    }

    pub fn unit(&self) -> Unit {
        match self {
            Pollutant::SO2 | Pollutant::NO2 | Pollutant::NO | Pollutant::NOx | Pollutant::O3 => {
                Unit::Ppb
            }
            Pollutant::CO => Unit::Ppm,
            Pollutant::PM2_5 | Pollutant::PM10 => Unit::MicrogramsPerCubicMetre,
        }
    }

    /// Y-axis label, e.g. `PM2.5 (μg/m3)`.
    pub fn axis_label(&self) -> String {
        format!("{} ({})", self.display_name(), self.unit().symbol())
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Resolve a positional selection (radio value) to a pollutant.
    pub fn from_index(index: usize) -> Result<Self, QueryError> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            QueryError::InvalidSelection(format!("pollutant index {} out of range", index))
        })
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Pollutant {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.column() == s || p.display_name() == s)
            .ok_or_else(|| QueryError::InvalidSelection(format!("unknown pollutant: {}", s)))
    }
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Historical data up to and including the forecast cutoff.
    Observed,
    /// Historical data strictly after the cutoff, kept back for validation.
    HeldOut,
    /// Model output, loaded from its own store.
    Forecast,
}

/// Marker shape for a plotted trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Marker {
    Circle,
    CircleOpen,
}

impl Provenance {
    pub const ALL: [Provenance; 3] = [
        Provenance::Observed,
        Provenance::HeldOut,
        Provenance::Forecast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Observed => "observed",
            Provenance::HeldOut => "held_out",
            Provenance::Forecast => "forecast",
        }
    }

    pub fn marker(&self) -> Marker {
        match self {
            Provenance::HeldOut => Marker::CircleOpen,
            Provenance::Observed | Provenance::Forecast => Marker::Circle,
        }
    }

    /// Only the Observed trace gets a legend entry; the other two share it.
    pub fn shows_legend(&self) -> bool {
        matches!(self, Provenance::Observed)
    }

    pub fn color_for(&self, site: SiteId) -> &'static str {
        match self {
            Provenance::Forecast => site.forecast_color(),
            Provenance::Observed | Provenance::HeldOut => site.color(),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
