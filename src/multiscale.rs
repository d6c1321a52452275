//! Writing resolution pyramids and their metadata to image groups.
use ndarray::ArrayViewD;
use serde_json::Value;
use zarrs::storage::{ReadableStorageTraits, WritableStorageTraits};

use crate::channel::{build_omero_metadata, histogram_file_name};
use crate::chunking::{ChunkOptions, plan_pyramid};
use crate::dtype::Pixel;
use crate::histogram::UIntHistogram;
use crate::metadata::{
    Attributes, Axis, CoordinateTransformation, Dataset, Multiscale, PhysicalCalibration,
    first_multiscale, image_axes,
};
use crate::pyramid::{Downsampler, NearestDownsampler};
use crate::store::{NgffStore, join_path};
use crate::{Error, Result};

pub const LABELS_GROUP: &str = "labels";

/// Writes multiscale images into groups of an [NgffStore].
pub struct MultiscaleWriter<'a, S, D = NearestDownsampler> {
    store: &'a NgffStore<S>,
    downsampler: D,
    options: ChunkOptions,
}

impl<'a, S> MultiscaleWriter<'a, S, NearestDownsampler> {
    pub fn new(store: &'a NgffStore<S>) -> Self {
        Self {
            store,
            downsampler: NearestDownsampler,
            options: ChunkOptions::default(),
        }
    }
}

impl<'a, S, D> MultiscaleWriter<'a, S, D> {
    pub fn with_downsampler<D2: Downsampler>(self, downsampler: D2) -> MultiscaleWriter<'a, S, D2> {
        MultiscaleWriter {
            store: self.store,
            downsampler,
            options: self.options,
        }
    }

    pub fn with_options(mut self, options: ChunkOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ChunkOptions {
        &self.options
    }
}

impl<S, D> MultiscaleWriter<'_, S, D>
where
    S: ReadableStorageTraits + WritableStorageTraits + 'static,
    D: Downsampler,
{
    /// Write the pyramid of `image` into the group at `path`.
    ///
    /// Returns the uncalibrated multiscale metadata; nothing is written to
    /// the group's attributes.
    pub fn write_pyramid<T: Pixel>(
        &self,
        path: &str,
        image: ArrayViewD<'_, T>,
        axes: &[Axis],
    ) -> Result<Multiscale> {
        if axes.len() != image.ndim() {
            return Err(Error::AxisMismatch {
                axes: axes.len(),
                ndim: image.ndim(),
            });
        }
        let shape: Vec<u64> = image.shape().iter().map(|&n| n as u64).collect();
        let plan = plan_pyramid(&shape, &self.options)?;
        let levels = self.downsampler.downsample(image, plan.max_level);
        if levels.len() != plan.n_levels() {
            return Err(Error::general(format!(
                "downsampler produced {} levels, planned {}",
                levels.len(),
                plan.n_levels()
            )));
        }

        self.store.create_group(path)?;
        let mut datasets = Vec::with_capacity(levels.len());
        for (descriptor, data) in plan.levels.iter().zip(&levels) {
            let level_path = descriptor.level.to_string();
            log::debug!(
                "writing level {} of {path:?}: shape {:?}, chunks {:?}",
                descriptor.level,
                data.shape(),
                descriptor.chunks
            );
            self.store.write_array(
                &join_path(path, &level_path),
                data.view(),
                &descriptor.chunks,
                descriptor.write_empty_chunks,
            )?;
            datasets.push(Dataset {
                path: level_path,
                coordinate_transformations: vec![CoordinateTransformation::Scale {
                    scale: self.downsampler.scale_factors(axes, descriptor.level),
                }],
            });
        }
        log::info!("wrote {} pyramid levels to {path:?}", datasets.len());
        Ok(Multiscale::new(axes.to_vec(), datasets))
    }

    /// Write a channel-first image (`c, y, x` or `c, z, y, x`) and its
    /// metadata into the field group at `path`.
    ///
    /// All metadata is validated and composed before any data is written.
    /// Each histogram sidecar is stored before its path is recorded in
    /// the group's attributes.
    pub fn write_image<T: Pixel>(
        &self,
        path: &str,
        image: ArrayViewD<'_, T>,
        histograms: &[UIntHistogram],
        channel_metadata: &[Attributes],
        calibration: &PhysicalCalibration,
    ) -> Result<Multiscale> {
        let unit = calibration.unit()?;
        let axes = image_axes(image.ndim(), unit)?;
        let n_channels = image.shape()[0];
        if channel_metadata.len() != n_channels {
            return Err(Error::general(format!(
                "image has {n_channels} channels but {} channel metadata records",
                channel_metadata.len()
            )));
        }
        let omero = build_omero_metadata(channel_metadata, T::TYPE, histograms)?;
        let histogram_names = channel_metadata
            .iter()
            .enumerate()
            .map(|(i, acq)| histogram_file_name(i, acq))
            .collect::<Result<Vec<_>>>()?;

        let mut multiscale = self.write_pyramid(path, image, &axes)?;
        multiscale.calibrate_base(&calibration.scale_factors(&axes))?;

        for (name, hist) in histogram_names.iter().zip(histograms) {
            self.store.set_bytes(path, name, hist.to_npz_bytes()?)?;
            log::debug!("stored histogram {name:?} in {path:?}");
        }

        let mut update = Attributes::new();
        update.insert(
            "multiscales".to_string(),
            Value::Array(vec![serde_json::to_value(&multiscale)?]),
        );
        update.insert("omero".to_string(), serde_json::to_value(&omero)?);
        update.insert(
            "acquisition_metadata".to_string(),
            serde_json::json!({ "channels": channel_metadata }),
        );
        update.insert(
            "histograms".to_string(),
            serde_json::to_value(&histogram_names)?,
        );
        self.store.merge_attributes(path, update)?;
        Ok(multiscale)
    }

    /// Write a label image below the image group at `parent`, as
    /// `labels/<name>`, reusing the parent's axes and level-0 calibration.
    ///
    /// The label's own pyramid decides its datasets, so a label smaller than
    /// its parent lists fewer levels.
    ///
    /// An existing label group is reused; with `overwrite` it is erased first.
    pub fn write_labels<T: Pixel>(
        &self,
        parent: &str,
        name: &str,
        labels: ArrayViewD<'_, T>,
        overwrite: bool,
    ) -> Result<Multiscale> {
        let parent_multiscale = first_multiscale(&self.store.attributes(parent)?)?;
        if parent_multiscale.axes.len() != labels.ndim() {
            return Err(Error::AxisMismatch {
                axes: parent_multiscale.axes.len(),
                ndim: labels.ndim(),
            });
        }
        let base_scale = parent_multiscale
            .datasets
            .first()
            .and_then(Dataset::scale)
            .ok_or_else(|| Error::general(format!("image {parent:?} has no level-0 scale")))?
            .to_vec();

        let labels_path = join_path(parent, LABELS_GROUP);
        let label_path = join_path(&labels_path, name);
        if self.store.group_exists(&label_path)? && overwrite {
            log::warn!("overwriting label group {label_path:?}");
            self.store.erase_node(&label_path)?;
        }
        self.store.create_group(&labels_path)?;
        self.store.create_group(&label_path)?;

        let mut label_names: Vec<String> = self
            .store
            .attributes(&labels_path)?
            .get(LABELS_GROUP)
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        if !label_names.iter().any(|n| n == name) {
            label_names.push(name.to_string());
        }
        let mut update = Attributes::new();
        update.insert(
            LABELS_GROUP.to_string(),
            serde_json::to_value(&label_names)?,
        );
        self.store.merge_attributes(&labels_path, update)?;

        let mut multiscale = self.write_pyramid(&label_path, labels, &parent_multiscale.axes)?;
        multiscale.calibrate_base(&base_scale)?;

        let mut update = Attributes::new();
        update.insert(
            "multiscales".to_string(),
            Value::Array(vec![serde_json::to_value(&multiscale)?]),
        );
        update.insert(
            "image-label".to_string(),
            serde_json::json!({ "version": crate::metadata::NGFF_VERSION }),
        );
        self.store.merge_attributes(&label_path, update)?;
        Ok(multiscale)
    }
}
