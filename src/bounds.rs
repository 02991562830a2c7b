//! Bounding-box reduction and transparent-border trimming
//!
//! The reducer finds the smallest rectangle containing every pixel with
//! alpha > 0. Large images are split into disjoint regions that are scanned
//! on scoped worker threads; each worker hands its region result back through
//! its join handle and the caller merges them. The merge is commutative and
//! associative with [`Bounds::Empty`] as identity, so the final box does not
//! depend on worker count, region shape, or join order.

use crate::config::RemovalConfig;
use crate::error::{BgRemovalError, Result};
use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};
use std::thread;

const BYTES_PER_PIXEL: usize = 4;
const ALPHA_OFFSET: usize = 3;

/// Inclusive, non-empty pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl BoundingBox {
    /// Returns `None` unless `min <= max` on both axes
    #[must_use]
    pub fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Option<Self> {
        (min_x <= max_x && min_y <= max_y).then_some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Box covering a single pixel
    #[must_use]
    pub fn point(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    #[must_use]
    pub fn min_x(&self) -> u32 {
        self.min_x
    }

    #[must_use]
    pub fn min_y(&self) -> u32 {
        self.min_y
    }

    #[must_use]
    pub fn max_x(&self) -> u32 {
        self.max_x
    }

    #[must_use]
    pub fn max_y(&self) -> u32 {
        self.max_y
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Smallest box containing both
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// Scan result for an image or region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Bounds {
    /// No pixel with alpha > 0
    #[default]
    Empty,
    /// Minimal box around all non-transparent pixels
    Region(BoundingBox),
}

impl Bounds {
    /// Combine two partial results
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, b) | (b, Self::Empty) => b,
            (Self::Region(a), Self::Region(b)) => Self::Region(a.union(b)),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            Self::Empty => None,
            Self::Region(b) => Some(*b),
        }
    }
}

/// Half-open rectangle `[x0, x1) x [y0, y1)` scanned by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Region {
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: width,
            y1: height,
        }
    }

    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.x1.saturating_sub(self.x0)) * u64::from(self.y1.saturating_sub(self.y0))
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Split a `width` x `height` image into `workers` disjoint regions
///
/// Four workers get quadrants (the right and bottom halves absorb odd
/// remainders). Any other count gets equal-height horizontal strips with the
/// last strip absorbing the remainder. Regions may be empty on tiny images.
#[must_use]
pub fn partition(width: u32, height: u32, workers: usize) -> Vec<Region> {
    match workers {
        0 | 1 => vec![Region::full(width, height)],
        4 => {
            let half_w = width / 2;
            let half_h = height / 2;
            vec![
                Region { x0: 0, y0: 0, x1: half_w, y1: half_h },
                Region { x0: half_w, y0: 0, x1: width, y1: half_h },
                Region { x0: 0, y0: half_h, x1: half_w, y1: height },
                Region { x0: half_w, y0: half_h, x1: width, y1: height },
            ]
        },
        n => {
            let count = u32::try_from(n).unwrap_or(u32::MAX);
            let strip = height / count;
            (0..count)
                .map(|i| Region {
                    x0: 0,
                    y0: i * strip,
                    x1: width,
                    y1: if i == count - 1 { height } else { (i + 1) * strip },
                })
                .collect()
        },
    }
}

/// Scan one region of `image`
///
/// Rows are scanned for their first and last non-transparent pixel, which
/// yields the same box as visiting every pixel.
#[must_use]
pub fn scan_region(image: &RgbaImage, region: Region) -> Bounds {
    let raw: &[u8] = image.as_raw();
    let stride = image.width() as usize * BYTES_PER_PIXEL;
    let x1 = region.x1.min(image.width());
    let y1 = region.y1.min(image.height());
    if region.x0 >= x1 || region.y0 >= y1 {
        return Bounds::Empty;
    }

    let mut bounds = Bounds::Empty;
    for y in region.y0..y1 {
        let row_start = y as usize * stride;
        let start = row_start + region.x0 as usize * BYTES_PER_PIXEL;
        let end = row_start + x1 as usize * BYTES_PER_PIXEL;
        let Some(row) = raw.get(start..end) else {
            continue;
        };

        let mut pixels = row.chunks_exact(BYTES_PER_PIXEL);
        let Some(first) = pixels.position(is_visible) else {
            continue;
        };
        let last = row
            .chunks_exact(BYTES_PER_PIXEL)
            .rposition(is_visible)
            .unwrap_or(first);

        let row_box = BoundingBox {
            min_x: region.x0 + first as u32,
            min_y: y,
            max_x: region.x0 + last as u32,
            max_y: y,
        };
        bounds = bounds.merge(Bounds::Region(row_box));
    }
    bounds
}

fn is_visible(pixel: &[u8]) -> bool {
    pixel.get(ALPHA_OFFSET).copied().unwrap_or(0) > 0
}

/// How the reducer walks the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStrategy {
    /// One row-major pass on the calling thread
    Sequential,
    /// One scoped thread per region
    Parallel { workers: usize },
}

/// Result of trimming one image
#[derive(Debug, Clone)]
pub struct TrimResult {
    /// Cropped image, or the 1x1 transparent placeholder
    pub image: RgbaImage,
    /// Bounds the crop was taken from
    pub bounds: Bounds,
    /// Strategy that produced the bounds
    pub strategy: ScanStrategy,
}

/// Chooses a scan strategy and trims transparent borders
#[derive(Debug, Clone)]
pub struct BoundsReducer {
    parallel_pixel_threshold: u64,
    min_workers: usize,
    max_workers: usize,
    available_units: usize,
}

impl BoundsReducer {
    /// Reducer using the thresholds in `config`
    ///
    /// Execution units come from `config.available_units` or, when unset,
    /// from [`std::thread::available_parallelism`].
    #[must_use]
    pub fn from_config(config: &RemovalConfig) -> Self {
        let available_units = config.available_units.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        });
        Self {
            parallel_pixel_threshold: config.parallel_pixel_threshold,
            min_workers: config.min_workers.max(1),
            max_workers: config.max_workers.max(config.min_workers.max(1)),
            available_units,
        }
    }

    #[must_use]
    pub fn available_units(&self) -> usize {
        self.available_units
    }

    /// Parallel only for large images on machines with enough units
    #[must_use]
    pub fn choose_strategy(&self, width: u32, height: u32) -> ScanStrategy {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.parallel_pixel_threshold && self.available_units >= self.min_workers {
            ScanStrategy::Parallel {
                workers: self.available_units.clamp(self.min_workers, self.max_workers),
            }
        } else {
            ScanStrategy::Sequential
        }
    }

    /// Bounds of the visible content using the automatically chosen strategy
    ///
    /// # Errors
    /// - A region worker could not be spawned or panicked
    pub fn find_bounds(&self, image: &RgbaImage) -> Result<Bounds> {
        find_bounds_with(image, self.choose_strategy(image.width(), image.height()))
    }

    /// Crop `image` to its visible content
    ///
    /// # Errors
    /// - A region worker could not be spawned or panicked
    pub fn trim(&self, image: &RgbaImage) -> Result<TrimResult> {
        let strategy = self.choose_strategy(image.width(), image.height());
        let bounds = find_bounds_with(image, strategy)?;
        tracing::debug!(?strategy, ?bounds, "computed trim bounds");
        Ok(TrimResult {
            image: crop_to_bounds(image, bounds),
            bounds,
            strategy,
        })
    }
}

/// Bounds of the visible content using an explicit strategy
///
/// # Errors
/// - A region worker could not be spawned or panicked
pub fn find_bounds_with(image: &RgbaImage, strategy: ScanStrategy) -> Result<Bounds> {
    match strategy {
        ScanStrategy::Sequential => Ok(scan_region(image, Region::full(image.width(), image.height()))),
        ScanStrategy::Parallel { workers } => scan_parallel(image, workers),
    }
}

fn scan_parallel(image: &RgbaImage, workers: usize) -> Result<Bounds> {
    let regions = partition(image.width(), image.height(), workers);

    let joined = thread::scope(|scope| {
        let handles = regions
            .iter()
            .enumerate()
            .map(|(index, &region)| {
                thread::Builder::new()
                    .name(format!("trim-region-{}", index))
                    .spawn_scoped(scope, move || scan_region(image, region))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok::<_, std::io::Error>(handles.into_iter().map(thread::ScopedJoinHandle::join).collect::<Vec<_>>())
    })
    .map_err(|e| {
        if e.kind() == std::io::ErrorKind::OutOfMemory {
            BgRemovalError::memory_pressure(format!("Could not spawn trim worker: {}", e))
        } else {
            BgRemovalError::processing_stage_error(
                "trim",
                &format!("could not spawn region worker: {}", e),
                Some(&format!("{} regions", regions.len())),
            )
        }
    })?;

    joined.into_iter().try_fold(Bounds::Empty, |acc, result| {
        result.map(|bounds| acc.merge(bounds)).map_err(|_| {
            BgRemovalError::processing_stage_error("trim", "region worker panicked", None)
        })
    })
}

/// Crop to `bounds`; empty bounds give a 1x1 fully transparent image
#[must_use]
pub fn crop_to_bounds(image: &RgbaImage, bounds: Bounds) -> RgbaImage {
    match bounds {
        Bounds::Empty => RgbaImage::new(1, 1),
        Bounds::Region(b) => {
            imageops::crop_imm(image, b.min_x, b.min_y, b.width(), b.height()).to_image()
        },
    }
}
