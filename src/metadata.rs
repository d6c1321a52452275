//! Serde representations of the OME-NGFF (0.4) attributes written by this crate.
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const NGFF_VERSION: &str = "0.4";

/// Unstructured attributes of a group.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisType {
    Channel,
    Space,
    Time,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub axis_type: Option<AxisType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Axis {
    pub fn channel(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            axis_type: Some(AxisType::Channel),
            unit: None,
        }
    }

    pub fn space(name: impl Into<String>, unit: SpatialUnit) -> Self {
        Self {
            name: name.into(),
            axis_type: Some(AxisType::Space),
            unit: Some(unit.ngff_name().to_string()),
        }
    }

    pub fn is_spatial(&self) -> bool {
        self.axis_type == Some(AxisType::Space)
    }
}

/// Axes of a channel-first image with the given number of dimensions:
/// `c, y, x` or `c, z, y, x`.
pub fn image_axes(ndim: usize, unit: SpatialUnit) -> Result<Vec<Axis>> {
    let spatial: &[&str] = match ndim {
        3 => &["y", "x"],
        4 => &["z", "y", "x"],
        _ => return Err(Error::UnsupportedDimensionality(ndim)),
    };
    let mut axes = vec![Axis::channel("c")];
    axes.extend(spatial.iter().map(|n| Axis::space(*n, unit)));
    Ok(axes)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinateTransformation {
    Scale { scale: Vec<f64> },
    Translation { translation: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub path: String,
    #[serde(rename = "coordinateTransformations")]
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

impl Dataset {
    /// The first scale transformation, if any.
    pub fn scale(&self) -> Option<&[f64]> {
        self.coordinate_transformations.iter().find_map(|ct| match ct {
            CoordinateTransformation::Scale { scale } => Some(scale.as_slice()),
            _ => None,
        })
    }

    fn scale_mut(&mut self) -> Option<&mut Vec<f64>> {
        self.coordinate_transformations
            .iter_mut()
            .find_map(|ct| match ct {
                CoordinateTransformation::Scale { scale } => Some(scale),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multiscale {
    pub axes: Vec<Axis>,
    /// Ordered from highest to lowest resolution.
    pub datasets: Vec<Dataset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Multiscale {
    pub fn new(axes: Vec<Axis>, datasets: Vec<Dataset>) -> Self {
        Self {
            axes,
            datasets,
            name: Some("/".to_string()),
            version: Some(NGFF_VERSION.to_string()),
        }
    }

    /// Multiply the level-0 scale element-wise by `factors`.
    ///
    /// Lower-resolution levels keep their relative scale factors.
    pub fn calibrate_base(&mut self, factors: &[f64]) -> Result<()> {
        let ndim = self.axes.len();
        if factors.len() != ndim {
            return Err(Error::AxisMismatch {
                axes: ndim,
                ndim: factors.len(),
            });
        }
        let Some(scale) = self.datasets.first_mut().and_then(Dataset::scale_mut) else {
            return Err(Error::general("multiscale has no level-0 scale"));
        };
        if scale.len() != ndim {
            return Err(Error::AxisMismatch {
                axes: ndim,
                ndim: scale.len(),
            });
        }
        for (s, f) in scale.iter_mut().zip(factors) {
            *s *= f;
        }
        Ok(())
    }
}

/// Read the first multiscale from a group's attributes.
pub fn first_multiscale(attrs: &Attributes) -> Result<Multiscale> {
    let value = attrs
        .get("multiscales")
        .and_then(|m| m.get(0))
        .ok_or_else(|| Error::general("group has no multiscales metadata"))?;
    Ok(serde_json::from_value(value.clone())?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialUnit {
    Micrometer,
}

impl SpatialUnit {
    /// Parse the unit as declared by the acquisition software.
    pub fn parse(unit: &str) -> Result<Self> {
        match unit {
            "um" | "µm" | "micrometer" => Ok(Self::Micrometer),
            u => Err(Error::UnsupportedUnit(u.to_string())),
        }
    }

    pub fn ngff_name(&self) -> &'static str {
        match self {
            SpatialUnit::Micrometer => "micrometer",
        }
    }
}

fn default_z_scaling() -> f64 {
    1.0
}

/// Physical pixel calibration of an acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalCalibration {
    #[serde(rename = "spatial-calibration-x")]
    pub x: f64,
    #[serde(rename = "spatial-calibration-y")]
    pub y: f64,
    #[serde(rename = "spatial-calibration-units")]
    pub units: String,
    #[serde(rename = "z-scaling", default = "default_z_scaling")]
    pub z: f64,
    #[serde(rename = "pixel-type", skip_serializing_if = "Option::is_none")]
    pub pixel_type: Option<String>,
}

impl PhysicalCalibration {
    pub fn new(x: f64, y: f64, units: impl Into<String>) -> Self {
        Self {
            x,
            y,
            units: units.into(),
            z: default_z_scaling(),
            pixel_type: None,
        }
    }

    pub fn with_z_scaling(mut self, z: f64) -> Self {
        self.z = z;
        self
    }

    /// Set the z scaling to the smallest step between the given plane positions.
    ///
    /// Fewer than two positions leave the scaling unchanged.
    pub fn with_z_positions(mut self, positions: &[f64]) -> Self {
        let mut sorted = positions.to_vec();
        sorted.sort_by(f64::total_cmp);
        if let Some(step) = sorted
            .windows(2)
            .map(|w| w[1] - w[0])
            .min_by(f64::total_cmp)
        {
            self.z = step;
        }
        self
    }

    pub fn unit(&self) -> Result<SpatialUnit> {
        SpatialUnit::parse(&self.units)
    }

    /// Physical size of one pixel along the given axis; 1 for non-spatial axes.
    pub fn axis_scale(&self, axis: &Axis) -> f64 {
        match axis.name.as_str() {
            "x" => self.x,
            "y" => self.y,
            "z" => self.z,
            _ => 1.0,
        }
    }

    pub fn scale_factors(&self, axes: &[Axis]) -> Vec<f64> {
        axes.iter().map(|a| self.axis_scale(a)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntry {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateWell {
    pub path: String,
    #[serde(rename = "rowIndex")]
    pub row_index: usize,
    #[serde(rename = "columnIndex")]
    pub column_index: usize,
}

/// The `plate` attribute of a plate root group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateMetadata {
    pub columns: Vec<NamedEntry>,
    pub rows: Vec<NamedEntry>,
    pub wells: Vec<PlateWell>,
    pub name: String,
    pub field_count: usize,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellImage {
    pub path: String,
}

/// The `well` attribute of a well group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellMetadata {
    pub images: Vec<WellImage>,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub min: u64,
    pub max: u64,
    pub start: u64,
    pub end: u64,
}

/// OMERO-style display metadata for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub active: bool,
    pub coefficient: f64,
    pub color: String,
    pub family: String,
    pub inverted: bool,
    pub label: String,
    pub wavelength_id: String,
    pub window: Window,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Omero {
    pub channels: Vec<ChannelDescriptor>,
}
