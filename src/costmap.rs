//! Cost grids shared with external sensor pipelines.
//!
//! A [`CostGrid`] is a plain 2-D array of cost bytes over a world-anchored
//! window. A [`CostmapHandle`] wraps one grid for concurrent use: sensor
//! layers mutate it from their own threads, the coordinator reads it, and
//! every multi-cell access goes through the grid mutex.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{NavError, Result};
use crate::geometry::Pose;
use crate::transform::TransformBuffer;

/// Cost values for path planning
pub mod costs {
    /// Safe to traverse, no penalty
    pub const FREE_SPACE: u8 = 0;
    /// Within the inscribed robot radius of an obstacle
    pub const INSCRIBED: u8 = 253;
    /// Obstacle cell, blocked
    pub const LETHAL: u8 = 254;
    /// Never observed
    pub const NO_INFORMATION: u8 = 255;
}

/// 2-D cost grid with a static layer snapshot.
///
/// The static layer is whatever the grid contained when it was built (or
/// when [`CostGrid::rebase_static_layer`] was last called); `reset_layers`
/// and the window-reverting recovery restore cells to it.
#[derive(Clone, Debug)]
pub struct CostGrid {
    origin_x: f64,
    origin_y: f64,
    resolution: f64,
    width: u32,
    height: u32,
    cells: Vec<u8>,
    static_cells: Vec<u8>,
}

impl CostGrid {
    /// Create a grid of free cells.
    pub fn new(width: u32, height: u32, resolution: f64, origin_x: f64, origin_y: f64) -> Self {
        let cells = vec![costs::FREE_SPACE; (width * height) as usize];
        Self {
            origin_x,
            origin_y,
            resolution,
            width,
            height,
            static_cells: cells.clone(),
            cells,
        }
    }

    /// Create a grid from existing cell data, row-major, bottom row first.
    pub fn from_cells(
        width: u32,
        height: u32,
        resolution: f64,
        origin_x: f64,
        origin_y: f64,
        cells: Vec<u8>,
    ) -> Result<Self> {
        if cells.len() != (width * height) as usize {
            return Err(NavError::Config(format!(
                "cost grid data has {} cells, expected {}",
                cells.len(),
                width * height
            )));
        }
        Ok(Self {
            origin_x,
            origin_y,
            resolution,
            width,
            height,
            static_cells: cells.clone(),
            cells,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    #[inline]
    pub fn origin(&self) -> (f64, f64) {
        (self.origin_x, self.origin_y)
    }

    /// Convert world coordinates to cell coordinates.
    pub fn world_to_map(&self, wx: f64, wy: f64) -> Result<(u32, u32)> {
        if wx < self.origin_x || wy < self.origin_y {
            return Err(NavError::OffMap(wx, wy));
        }
        let mx = ((wx - self.origin_x) / self.resolution) as u32;
        let my = ((wy - self.origin_y) / self.resolution) as u32;
        if mx >= self.width || my >= self.height {
            return Err(NavError::OffMap(wx, wy));
        }
        Ok((mx, my))
    }

    /// Convert cell coordinates to the world position of the cell center.
    #[inline]
    pub fn map_to_world(&self, mx: u32, my: u32) -> (f64, f64) {
        (
            self.origin_x + (mx as f64 + 0.5) * self.resolution,
            self.origin_y + (my as f64 + 0.5) * self.resolution,
        )
    }

    #[inline]
    fn index(&self, mx: u32, my: u32) -> usize {
        (my * self.width + mx) as usize
    }

    /// Cost at a cell. Out-of-bounds cells read as lethal.
    #[inline]
    pub fn cost(&self, mx: u32, my: u32) -> u8 {
        if mx >= self.width || my >= self.height {
            return costs::LETHAL;
        }
        self.cells[self.index(mx, my)]
    }

    #[inline]
    pub fn set_cost(&mut self, mx: u32, my: u32, cost: u8) {
        if mx < self.width && my < self.height {
            let idx = self.index(mx, my);
            self.cells[idx] = cost;
        }
    }

    /// Set every cell inside a convex polygon (world coordinates) to `cost`.
    ///
    /// Returns false when the polygon is degenerate or lies entirely off the
    /// map.
    pub fn set_convex_polygon_cost(&mut self, points: &[(f64, f64)], cost: u8) -> bool {
        if points.len() < 3 {
            return false;
        }

        // scanline fill between the polygon edge crossings, clamped to the map
        let min_wy = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_wy = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

        let mut touched = false;
        let mut my = 0;
        while my < self.height {
            let (_, wy) = self.map_to_world(0, my);
            if wy < min_wy || wy > max_wy {
                my += 1;
                continue;
            }

            let mut min_x = f64::INFINITY;
            let mut max_x = f64::NEG_INFINITY;
            for i in 0..points.len() {
                let (x0, y0) = points[i];
                let (x1, y1) = points[(i + 1) % points.len()];
                if (y0 <= wy && wy <= y1) || (y1 <= wy && wy <= y0) {
                    let wx = if (y1 - y0).abs() < f64::EPSILON {
                        x0.min(x1)
                    } else {
                        x0 + (wy - y0) * (x1 - x0) / (y1 - y0)
                    };
                    min_x = min_x.min(wx);
                    max_x = max_x.max(wx);
                }
            }

            if min_x.is_finite() && max_x.is_finite() {
                let from = ((min_x - self.origin_x) / self.resolution).floor().max(0.0) as u32;
                let to = ((max_x - self.origin_x) / self.resolution).ceil() as i64;
                let to = to.clamp(0, self.width as i64 - 1) as u32;
                for mx in from..=to {
                    self.set_cost(mx, my, cost);
                    touched = true;
                }
            }
            my += 1;
        }

        touched
    }

    /// Revert every cell outside a square window around `(wx, wy)` to the
    /// static layer. `half_size` is half the window edge in meters.
    pub fn revert_outside_window(&mut self, wx: f64, wy: f64, half_size: f64) {
        for my in 0..self.height {
            for mx in 0..self.width {
                let (cx, cy) = self.map_to_world(mx, my);
                if (cx - wx).abs() > half_size || (cy - wy).abs() > half_size {
                    let idx = self.index(mx, my);
                    self.cells[idx] = self.static_cells[idx];
                }
            }
        }
    }

    /// Restore every cell to the static layer.
    pub fn reset_layers(&mut self) {
        self.cells.copy_from_slice(&self.static_cells);
    }

    /// Capture the current cells as the new static layer.
    pub fn rebase_static_layer(&mut self) {
        self.static_cells.copy_from_slice(&self.cells);
    }
}

/// Shared, mutex-guarded costmap with freshness and pause state.
#[derive(Clone)]
pub struct CostmapHandle {
    inner: Arc<CostmapShared>,
}

struct CostmapShared {
    name: String,
    global_frame: String,
    grid: Mutex<CostGrid>,
    tf: Arc<dyn TransformBuffer>,
    transform_tolerance: Duration,
    current: AtomicBool,
    updates_enabled: AtomicBool,
}

impl CostmapHandle {
    pub fn new(
        name: &str,
        global_frame: &str,
        grid: CostGrid,
        tf: Arc<dyn TransformBuffer>,
        transform_tolerance: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CostmapShared {
                name: name.to_string(),
                global_frame: global_frame.to_string(),
                grid: Mutex::new(grid),
                tf,
                transform_tolerance,
                current: AtomicBool::new(true),
                updates_enabled: AtomicBool::new(true),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn global_frame(&self) -> &str {
        &self.inner.global_frame
    }

    /// Lock the grid for a multi-cell read or write.
    pub fn lock(&self) -> MutexGuard<'_, CostGrid> {
        self.inner.grid.lock()
    }

    pub fn resolution(&self) -> f64 {
        self.inner.grid.lock().resolution()
    }

    /// Whether the sensor layers feeding this map are up to date. Sensor
    /// pipelines clear this when their buffers exceed tolerance.
    pub fn is_current(&self) -> bool {
        self.inner.current.load(Ordering::Acquire)
    }

    pub fn set_current(&self, current: bool) {
        self.inner.current.store(current, Ordering::Release);
    }

    /// Stop accepting sensor updates. Updaters are expected to check
    /// [`CostmapHandle::updates_enabled`] before writing.
    pub fn pause(&self) {
        self.inner.updates_enabled.store(false, Ordering::Release);
    }

    pub fn resume(&self) {
        self.inner.updates_enabled.store(true, Ordering::Release);
    }

    pub fn updates_enabled(&self) -> bool {
        self.inner.updates_enabled.load(Ordering::Acquire)
    }

    /// Robot pose in this costmap's global frame.
    ///
    /// Fails with [`NavError::TransformUnavailable`] when the transform is
    /// missing or the returned pose is staler than the transform tolerance.
    pub fn robot_pose(&self) -> Result<Pose> {
        let pose = self.inner.tf.robot_pose(&self.inner.global_frame)?;
        if let Some(stamp) = pose.stamp
            && stamp.elapsed() > self.inner.transform_tolerance
        {
            return Err(NavError::TransformUnavailable(format!(
                "transform timeout for {}: pose is {:.3}s old, tolerance {:.3}s",
                self.inner.name,
                stamp.elapsed().as_secs_f64(),
                self.inner.transform_tolerance.as_secs_f64()
            )));
        }
        Ok(pose)
    }

    /// Set a `size_x` by `size_y` window around the robot to free space.
    pub fn clear_window_around_robot(&self, size_x: f64, size_y: f64) -> Result<()> {
        let pose = self.robot_pose()?;
        let polygon = [
            (pose.x - size_x / 2.0, pose.y - size_y / 2.0),
            (pose.x + size_x / 2.0, pose.y - size_y / 2.0),
            (pose.x + size_x / 2.0, pose.y + size_y / 2.0),
            (pose.x - size_x / 2.0, pose.y + size_y / 2.0),
        ];
        self.lock()
            .set_convex_polygon_cost(&polygon, costs::FREE_SPACE);
        Ok(())
    }

    /// Reset the grid to its static layer under the mutex.
    pub fn reset_layers(&self) {
        self.lock().reset_layers();
    }
}
