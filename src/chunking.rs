use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Chunking and pyramid-depth configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOptions {
    /// Largest chunk edge along y and x. Default 2048.
    #[serde(default = "default_max_chunk_edge")]
    pub max_chunk_edge: u64,
    /// Deepest pyramid level which may be produced. Default 4.
    #[serde(default = "default_max_levels")]
    pub max_levels: usize,
    /// Whether chunks containing only the fill value are written. Default true.
    #[serde(default = "default_write_empty_chunks")]
    pub write_empty_chunks: bool,
}

fn default_max_chunk_edge() -> u64 {
    2048
}

fn default_max_levels() -> usize {
    4
}

fn default_write_empty_chunks() -> bool {
    true
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chunk_edge: default_max_chunk_edge(),
            max_levels: default_max_levels(),
            write_empty_chunks: default_write_empty_chunks(),
        }
    }
}

/// Storage options for one pyramid level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelDescriptor {
    pub level: usize,
    /// One entry per array dimension; 1 for every non-spatial-plane axis.
    pub chunks: Vec<u64>,
    pub write_empty_chunks: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidPlan {
    /// Ordered from full resolution; `levels.len() == max_level + 1`.
    pub levels: Vec<LevelDescriptor>,
    /// Deepest level, passed as-is to the downsampler.
    pub max_level: usize,
}

impl PyramidPlan {
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }
}

/// Plan chunk shapes for a pyramid over an image of the given shape.
///
/// The last two axes are y and x. Every level gets a y/x chunk edge of
/// `min(max_chunk_edge, edge >> level)`; planning stops at the first level
/// where both edges are at most half of `max_chunk_edge`, or at `max_levels`.
pub fn plan_pyramid(shape: &[u64], options: &ChunkOptions) -> Result<PyramidPlan> {
    let ndim = shape.len();
    if ndim < 2 {
        return Err(Error::general(format!(
            "image needs at least y and x axes, got shape {shape:?}"
        )));
    }
    let (h_full, w_full) = (shape[ndim - 2], shape[ndim - 1]);
    let half = options.max_chunk_edge as f64 / 2.0;

    let mut levels = Vec::with_capacity(options.max_levels + 1);
    let mut chunks = vec![1u64; ndim];
    for level in 0..=options.max_levels {
        let h = options.max_chunk_edge.min(halve(h_full, level));
        let w = options.max_chunk_edge.min(halve(w_full, level));
        // zero-sized chunks are invalid; the level array is empty or tiny anyway
        chunks[ndim - 2] = h.max(1);
        chunks[ndim - 1] = w.max(1);
        levels.push(LevelDescriptor {
            level,
            chunks: chunks.clone(),
            write_empty_chunks: options.write_empty_chunks,
        });
        if h as f64 <= half && w as f64 <= half {
            log::debug!("planned {} pyramid levels for shape {shape:?}", level + 1);
            return Ok(PyramidPlan {
                levels,
                max_level: level,
            });
        }
    }
    log::debug!(
        "pyramid for shape {shape:?} capped at max level {}",
        options.max_levels
    );
    Ok(PyramidPlan {
        levels,
        max_level: options.max_levels,
    })
}

/// `edge` halved `level` times with floor division.
pub(crate) fn halve(edge: u64, level: usize) -> u64 {
    u32::try_from(level)
        .ok()
        .and_then(|l| edge.checked_shr(l))
        .unwrap_or(0)
}
