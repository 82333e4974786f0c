//! Age-matched ventricle removal.

use std::fmt;
use std::str::FromStr;
use burn::tensor::backend::Backend;
use ctlesion_core::filter::subtract;
use ctlesion_core::image::{Volume, VolumeKind};
use serde::{Deserialize, Serialize};
use crate::error::{PipelineError, Result, Stage, StageResultExt};

/// Inclusive integer age interval, written `lower-upper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgeBand {
    pub lower: u32,
    pub upper: u32,
}

impl AgeBand {
    pub fn new(lower: u32, upper: u32) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, age: u32) -> bool {
        self.lower <= age && age <= self.upper
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lower, self.upper)
    }
}

impl FromStr for AgeBand {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| PipelineError::invalid_input(format!("invalid age band `{}`", s)))
        };
        match s.split_once('-') {
            Some((lower, upper)) => {
                let band = Self::new(parse(lower)?, parse(upper)?);
                if band.lower > band.upper {
                    return Err(PipelineError::invalid_input(format!("invalid age band `{}`", s)));
                }
                Ok(band)
            }
            None => Err(PipelineError::invalid_input(format!("invalid age band `{}`", s))),
        }
    }
}

/// Contiguous, ordered age bands. Ages below the first band clamp to it,
/// ages above the last clamp to the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeBandTable {
    bands: Vec<AgeBand>,
}

impl AgeBandTable {
    /// Bands must be non-empty, ordered and leave no gap between them.
    pub fn new(bands: Vec<AgeBand>) -> Result<Self> {
        if bands.is_empty() {
            return Err(PipelineError::invalid_input("age band table is empty"));
        }
        for pair in bands.windows(2) {
            let next = pair[0].upper.checked_add(1).ok_or_else(|| {
                PipelineError::invalid_input(format!("age band {} cannot be followed by {}", pair[0], pair[1]))
            })?;
            if pair[1].lower != next {
                return Err(PipelineError::invalid_input(format!(
                    "age bands {} and {} are not contiguous",
                    pair[0], pair[1]
                )));
            }
        }
        if let Some(band) = bands.iter().find(|b| b.lower > b.upper) {
            return Err(PipelineError::invalid_input(format!("invalid age band {}", band)));
        }
        Ok(Self { bands })
    }

    /// The eleven five-year bands `35-39` to `85-89`.
    pub fn standard() -> Self {
        Self {
            bands: (0..11).map(|k| AgeBand::new(35 + 5 * k, 39 + 5 * k)).collect(),
        }
    }

    pub fn bands(&self) -> &[AgeBand] {
        &self.bands
    }

    /// Band of `age`. Fractional ages are floored first.
    pub fn select(&self, age: f64) -> Result<AgeBand> {
        if !age.is_finite() {
            return Err(PipelineError::metadata(format!("age {} is not a finite number", age)));
        }
        let (first, last) = match (self.bands.first(), self.bands.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(PipelineError::invalid_input("age band table is empty")),
        };
        let age = age.floor();
        if age < first.lower as f64 {
            return Ok(first);
        }
        if age > last.upper as f64 {
            return Ok(last);
        }
        let age = age as u32;
        self.bands
            .iter()
            .copied()
            .find(|band| band.contains(age))
            .ok_or_else(|| PipelineError::metadata(format!("no age band contains {}", age)))
    }
}

impl Default for AgeBandTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Band of `age` in the standard table.
pub fn select_band(age: f64) -> Result<AgeBand> {
    AgeBandTable::standard().select(age)
}

/// `binarize((lesion - ventricle) > 0)` on the lesion's grid.
pub fn remove_ventricles<B: Backend>(lesion: &Volume<B, 3>, ventricle: &Volume<B, 3>) -> Result<Volume<B, 3>> {
    if !lesion.geometry().same_grid(&ventricle.geometry()) {
        return Err(PipelineError::space_mismatch(format!(
            "lesion grid {:?} differs from ventricle grid {:?}",
            lesion.shape(),
            ventricle.shape()
        )));
    }
    let lesion = as_label(lesion);
    let ventricle = as_label(ventricle);
    subtract(&lesion, &ventricle).stage(Stage::VentricleRemoval)
}

fn as_label<B: Backend>(volume: &Volume<B, 3>) -> Volume<B, 3> {
    match volume.kind() {
        VolumeKind::BinaryLabel => volume.clone(),
        VolumeKind::ContinuousIntensity => Volume::binarized(volume.image().clone()),
    }
}
