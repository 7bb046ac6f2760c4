//! Periodic subsample selection over a ping index range.
//!
//! A subsample cycle keeps `chunk_size` consecutive pings out of every
//! `100 * chunk_size / percent` pings. Successive cycles shift the starting
//! ping by one chunk, so `100 / percent` cycles tile the segment completely.

use crate::types::PingMask;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SubsampleError {
    #[error("subsample percent must lie in (0, 100], got {0}")]
    InvalidPercent(f64),
    #[error("subsample chunk size must be at least 1")]
    ZeroChunkSize,
    #[error("start ping {start} is beyond the segment of {total} pings")]
    StartBeyondSegment { start: usize, total: usize },
}

/// One subsample cycle's selection: the keep-mask plus the chunk bounds used
/// for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub mask: PingMask,
    /// Ordered (start, inclusive end) ping index per chunk.
    pub chunks: Vec<(usize, usize)>,
}

/// Periodic chunk selector configured once per processing run.
#[derive(Debug, Clone)]
pub struct Subsampler {
    chunk_size: usize,
    percent: f64,
    skip: usize,
}

impl Subsampler {
    pub fn new(chunk_size: usize, percent: f64) -> Result<Self, SubsampleError> {
        if !(percent > 0.0 && percent <= 100.0) {
            return Err(SubsampleError::InvalidPercent(percent));
        }
        if chunk_size == 0 {
            return Err(SubsampleError::ZeroChunkSize);
        }
        // Integer stepping, as the chunk bounds are ping indices. percent is
        // at most 100, so skip >= chunk_size >= 1.
        let skip = (100.0 * chunk_size as f64 / percent) as usize;
        Ok(Self {
            chunk_size,
            percent,
            skip,
        })
    }

    /// Pings skipped from one chunk start to the next.
    pub fn skip(&self) -> usize {
        self.skip
    }

    /// Phase index of a given cycle.
    ///
    /// Both the 1-based `chunk_start` and the iteration count wrap modulo
    /// `100 / percent`: configuring more iterations than distinct phases
    /// silently repeats earlier phases. Historical behavior, preserved.
    pub fn cycle_phase(&self, iteration: usize, chunk_start: usize) -> usize {
        let modulus = 100.0 / self.percent;
        ((iteration + chunk_start.saturating_sub(1)) as f64 % modulus) as usize
    }

    /// Starting ping of a given cycle phase.
    pub fn cycle_start_ping(&self, phase: usize) -> usize {
        phase * self.chunk_size
    }

    /// Select the keep-chunks for one cycle over `total_pings` pings,
    /// starting at `start_ping`.
    ///
    /// A start beyond the segment is the one fatal error of this layer. A
    /// start exactly at `total_pings` yields an empty selection.
    pub fn select(&self, total_pings: usize, start_ping: usize) -> Result<Selection, SubsampleError> {
        if start_ping > total_pings {
            return Err(SubsampleError::StartBeyondSegment {
                start: start_ping,
                total: total_pings,
            });
        }

        let mut mask = vec![false; total_pings];
        let mut chunks = Vec::new();
        let mut start = start_ping;
        while start < total_pings {
            // The final chunk is clipped so its end stays inside the segment.
            let stop = (start + self.chunk_size).min(total_pings);
            for flag in &mut mask[start..stop] {
                *flag = true;
            }
            chunks.push((start, stop - 1));
            start += self.skip;
        }
        Ok(Selection { mask, chunks })
    }
}
