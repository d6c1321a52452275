use ndarray::{ArrayD, ArrayViewD, Slice};

use crate::dtype::Pixel;
use crate::metadata::Axis;

/// Produces the resolution pyramid of an image.
pub trait Downsampler {
    /// Return `max_level + 1` arrays, starting with the full-resolution image.
    ///
    /// The last two axes are y and x.
    fn downsample<T: Pixel>(&self, image: ArrayViewD<'_, T>, max_level: usize) -> Vec<ArrayD<T>>;

    /// Scale of `level` relative to full resolution, one factor per axis.
    fn scale_factors(&self, axes: &[Axis], level: usize) -> Vec<f64>;
}

/// Halves y and x per level by keeping every second sample.
///
/// Odd edges lose their last row/column, so the extent at level `i` is
/// `edge >> i`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestDownsampler;

impl NearestDownsampler {
    fn halve<T: Pixel>(image: ArrayViewD<'_, T>) -> ArrayD<T> {
        let ndim = image.ndim();
        image
            .slice_each_axis(|ax| {
                if ax.axis.index() + 2 >= ndim {
                    let end = (ax.len / 2 * 2) as isize;
                    Slice::new(0, Some(end), 2)
                } else {
                    Slice::from(..)
                }
            })
            .to_owned()
    }
}

impl Downsampler for NearestDownsampler {
    fn downsample<T: Pixel>(&self, image: ArrayViewD<'_, T>, max_level: usize) -> Vec<ArrayD<T>> {
        let mut levels = Vec::with_capacity(max_level + 1);
        levels.push(image.to_owned());
        for _ in 0..max_level {
            let next = match levels.last() {
                Some(prev) => Self::halve(prev.view()),
                None => break,
            };
            levels.push(next);
        }
        levels
    }

    fn scale_factors(&self, axes: &[Axis], level: usize) -> Vec<f64> {
        let ndim = axes.len();
        let factor = 2f64.powi(level as i32);
        (0..ndim)
            .map(|i| if i + 2 >= ndim { factor } else { 1.0 })
            .collect()
    }
}
