//! Exact, mergeable histograms over unsigned integer intensities.
use std::io::Cursor;
use std::path::Path;

use npyz::WriterBuilder;
use npyz::npz::{NpzArchive, NpzWriter};

use crate::dtype::Pixel;
use crate::{Error, Result};

/// Largest number of bins a histogram may span.
///
/// Bins are dense, so 8- and 16-bit data always fit; 32-bit data fits as
/// long as the observed range stays below this bound.
pub const MAX_BINS: u64 = 1 << 24;

/// Count histogram with one bin per integer value between the smallest and
/// largest observed sample.
///
/// The bin range is always tight: a non-empty histogram has non-zero counts
/// in its first and last bins, so two histograms over the same samples are
/// equal regardless of how the samples were partitioned and merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UIntHistogram {
    offset: u64,
    frequencies: Vec<u64>,
}

impl UIntHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a histogram from the given samples.
    ///
    /// Fails with [Error::HistogramTooWide] if the samples span more than [MAX_BINS] values.
    pub fn from_samples<T, I>(samples: I) -> Result<Self>
    where
        T: Pixel,
        I: IntoIterator<Item = T>,
        I::IntoIter: Clone,
    {
        let samples = samples.into_iter();
        let Some((min, max)) = samples.clone().fold(None, |acc, s| {
            let v: u64 = s.into();
            match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((v.min(lo), v.max(hi))),
            }
        }) else {
            return Ok(Self::default());
        };

        let mut frequencies = vec![0; n_bins(min, max + 1)?];
        for s in samples {
            let v: u64 = s.into();
            frequencies[(v - min) as usize] += 1;
        }
        Ok(Self {
            offset: min,
            frequencies,
        })
    }

    /// Add samples to the histogram.
    pub fn record<T, I>(&mut self, samples: I) -> Result<()>
    where
        T: Pixel,
        I: IntoIterator<Item = T>,
        I::IntoIter: Clone,
    {
        let other = Self::from_samples(samples)?;
        self.merge(&other)
    }

    /// Add the counts of another histogram to this one.
    ///
    /// On error, `self` is unchanged.
    pub fn merge(&mut self, other: &UIntHistogram) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            *self = other.clone();
            return Ok(());
        }

        let offset = self.offset.min(other.offset);
        let end = self.end().max(other.end());
        let mut frequencies = vec![0; n_bins(offset, end)?];
        for h in [&*self, other] {
            let start = (h.offset - offset) as usize;
            for (dst, src) in frequencies[start..].iter_mut().zip(&h.frequencies) {
                *dst += src;
            }
        }
        self.offset = offset;
        self.frequencies = frequencies;
        Ok(())
    }

    /// Return a new histogram holding the counts of both.
    pub fn merged(&self, other: &UIntHistogram) -> Result<UIntHistogram> {
        let mut out = self.clone();
        out.merge(other)?;
        Ok(out)
    }

    /// One past the largest observed value.
    fn end(&self) -> u64 {
        self.offset + self.frequencies.len() as u64
    }

    /// Value of the first bin.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Counts per bin, starting at [UIntHistogram::offset].
    pub fn frequencies(&self) -> &[u64] {
        &self.frequencies
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Total number of recorded samples.
    pub fn total(&self) -> u64 {
        self.frequencies.iter().sum()
    }

    /// Number of samples with value `value`.
    pub fn count(&self, value: u64) -> u64 {
        value
            .checked_sub(self.offset)
            .and_then(|i| self.frequencies.get(i as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Smallest observed value.
    pub fn min(&self) -> Result<u64> {
        if self.is_empty() {
            return Err(Error::EmptyHistogram);
        }
        Ok(self.offset)
    }

    /// Largest observed value.
    pub fn max(&self) -> Result<u64> {
        if self.is_empty() {
            return Err(Error::EmptyHistogram);
        }
        Ok(self.end() - 1)
    }

    pub fn mean(&self) -> Result<f64> {
        let total = self.total();
        if total == 0 {
            return Err(Error::EmptyHistogram);
        }
        let sum: f64 = self
            .bins()
            .map(|(v, n)| v as f64 * n as f64)
            .sum();
        Ok(sum / total as f64)
    }

    /// Population standard deviation.
    pub fn std(&self) -> Result<f64> {
        let mean = self.mean()?;
        let total = self.total() as f64;
        let var: f64 = self
            .bins()
            .map(|(v, n)| (v as f64 - mean).powi(2) * n as f64)
            .sum::<f64>()
            / total;
        Ok(var.sqrt())
    }

    /// Nearest-rank quantile: the smallest value whose cumulative count
    /// reaches `q * total`.
    pub fn quantile(&self, q: f64) -> Result<u64> {
        if !(0.0..=1.0).contains(&q) {
            return Err(Error::InvalidQuantile(q));
        }
        let total = self.total();
        if total == 0 {
            return Err(Error::EmptyHistogram);
        }
        let target = q * total as f64;
        let mut cumulative = 0u64;
        for (value, n) in self.bins() {
            cumulative += n;
            if cumulative as f64 >= target {
                return Ok(value);
            }
        }
        // float rounding at q == 1
        self.max()
    }

    /// Iterate over `(value, count)` for every bin in range.
    pub fn bins(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        (self.offset..).zip(self.frequencies.iter().copied())
    }

    /// Serialize as an `.npz` archive with `frequencies`, `offset` and `bins` arrays.
    pub fn to_npz_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut npz = NpzWriter::new(&mut buf);

            let frequencies: Vec<i64> = self
                .frequencies
                .iter()
                .map(|&n| to_i64(n))
                .collect::<Result<_>>()?;
            let mut writer = npz
                .array("frequencies", Default::default())?
                .default_dtype()
                .shape(&[frequencies.len() as u64])
                .begin_nd()?;
            writer.extend(frequencies)?;
            writer.finish()?;

            // bins counts edges, as in numpy.histogram
            let scalars = [
                ("offset", to_i64(self.offset)?),
                ("bins", to_i64(self.frequencies.len() as u64 + 1)?),
            ];
            for (name, value) in scalars {
                let mut writer = npz
                    .array(name, Default::default())?
                    .default_dtype()
                    .shape(&[])
                    .begin_nd()?;
                writer.extend(vec![value])?;
                writer.finish()?;
            }
        }
        Ok(buf.into_inner())
    }

    /// Deserialize from an `.npz` archive written by [UIntHistogram::to_npz_bytes]
    /// (or numpy with the same array names).
    pub fn from_npz_bytes(bytes: &[u8]) -> Result<Self> {
        let mut npz = NpzArchive::new(Cursor::new(bytes))?;

        let frequencies = read_npz_i64(&mut npz, "frequencies")?
            .into_iter()
            .map(to_u64)
            .collect::<Result<Vec<_>>>()?;
        let offset = read_npz_i64(&mut npz, "offset")?
            .first()
            .copied()
            .ok_or_else(|| Error::general("histogram offset array is empty"))?;

        let mut hist = Self {
            offset: to_u64(offset)?,
            frequencies,
        };
        hist.trim();
        Ok(hist)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_npz_bytes()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_npz_bytes(&bytes)
    }

    /// Drop empty bins at either end, restoring the tight-range invariant
    /// for histograms written by other tools.
    fn trim(&mut self) {
        let Some(first) = self.frequencies.iter().position(|&n| n > 0) else {
            *self = Self::default();
            return;
        };
        let last = self
            .frequencies
            .iter()
            .rposition(|&n| n > 0)
            .unwrap_or(first);
        self.frequencies.truncate(last + 1);
        self.frequencies.drain(..first);
        self.offset += first as u64;
    }
}

fn read_npz_i64<R: std::io::Read + std::io::Seek>(
    npz: &mut NpzArchive<R>,
    name: &str,
) -> Result<Vec<i64>> {
    let npy = npz
        .by_name(name)?
        .ok_or_else(|| Error::general(format!("histogram archive has no {name:?} array")))?;
    Ok(npy.into_vec::<i64>()?)
}

fn to_i64(n: u64) -> Result<i64> {
    i64::try_from(n).map_err(Error::wrap)
}

fn to_u64(n: i64) -> Result<u64> {
    u64::try_from(n).map_err(Error::wrap)
}

/// Number of dense bins for values in `start..end`.
fn n_bins(start: u64, end: u64) -> Result<usize> {
    let span = end - start;
    if span > MAX_BINS {
        return Err(Error::HistogramTooWide {
            span,
            max: MAX_BINS,
        });
    }
    Ok(span as usize)
}
