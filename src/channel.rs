use ndarray::ArrayViewD;

use crate::dtype::{Pixel, PixelType};
use crate::histogram::UIntHistogram;
use crate::metadata::{Attributes, ChannelDescriptor, Omero, Window};
use crate::{Error, Result};

pub const CHANNEL_NAME: &str = "channel-name";
pub const DISPLAY_COLOR: &str = "display-color";
pub const PROJECTION_METHOD: &str = "z-projection-method";

/// Lower and upper quantiles of the display window.
pub const WINDOW_QUANTILES: (f64, f64) = (0.01, 0.99);

fn required_str<'a>(
    acquisition: &'a Attributes,
    channel: usize,
    field: &'static str,
) -> Result<&'a str> {
    acquisition
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or(Error::MissingChannelField { channel, field })
}

/// Display label of a channel: the channel name, prefixed by the projection
/// method if the channel is a projection.
pub fn channel_label(acquisition: &Attributes, channel: usize) -> Result<String> {
    let name = required_str(acquisition, channel, CHANNEL_NAME)?;
    let label = match acquisition.get(PROJECTION_METHOD).and_then(|v| v.as_str()) {
        Some(method) => format!("{}-Projection_{name}", method.replace(' ', "-")),
        None => name.to_string(),
    };
    Ok(label)
}

/// Compose the display descriptor of the channel at (zero-based) `index`.
pub fn compose_channel(
    index: usize,
    acquisition: &Attributes,
    pixel_type: PixelType,
    histogram: &UIntHistogram,
) -> Result<ChannelDescriptor> {
    let label = channel_label(acquisition, index)?;
    let color = required_str(acquisition, index, DISPLAY_COLOR)?.to_string();
    let (lower, upper) = WINDOW_QUANTILES;
    Ok(ChannelDescriptor {
        active: true,
        coefficient: 1.0,
        color,
        family: "linear".to_string(),
        inverted: false,
        label,
        wavelength_id: format!("C{:02}", index + 1),
        window: Window {
            min: pixel_type.min(),
            max: pixel_type.max(),
            start: histogram.quantile(lower)?,
            end: histogram.quantile(upper)?,
        },
    })
}

/// Compose descriptors for all channels of an image.
pub fn build_omero_metadata(
    acquisition: &[Attributes],
    pixel_type: PixelType,
    histograms: &[UIntHistogram],
) -> Result<Omero> {
    if acquisition.len() != histograms.len() {
        return Err(Error::general(format!(
            "{} channel metadata records but {} histograms",
            acquisition.len(),
            histograms.len()
        )));
    }
    let channels = acquisition
        .iter()
        .zip(histograms)
        .enumerate()
        .map(|(i, (acq, hist))| compose_channel(i, acq, pixel_type, hist))
        .collect::<Result<Vec<_>>>()?;
    Ok(Omero { channels })
}

/// Histogram of every channel (axis 0) of an image.
pub fn channel_histograms<T: Pixel>(image: ArrayViewD<'_, T>) -> Result<Vec<UIntHistogram>> {
    image
        .axis_iter(ndarray::Axis(0))
        .map(|channel| UIntHistogram::from_samples(channel.iter().copied()))
        .collect()
}

/// Sidecar file name of a channel's histogram.
///
/// Keyed on the zero-based channel index and the raw channel name (not the
/// display label), with spaces and slashes replaced by underscores.
pub fn histogram_file_name(index: usize, acquisition: &Attributes) -> Result<String> {
    let name = required_str(acquisition, index, CHANNEL_NAME)?.replace([' ', '/'], "_");
    Ok(format!("C{index:02}_{name}_histogram.npz"))
}
