use ultraviolet::Vec3;

/// CPU solver for a damped wave equation on a regular 2D grid.
///
/// The grid topology is fixed at construction; `update` advances the height
/// field in whole sub-steps of `time_step` and recomputes normals by central
/// differencing. Vertices are row-major, `row * cols + col`.
pub struct Waves {
    rows: usize,
    cols: usize,

    time_step: f32,
    spatial_step: f32,

    // integration coefficients, fixed by (speed, damping, dt, dx)
    k1: f32,
    k2: f32,
    k3: f32,

    /// Wall-clock time not yet consumed by whole sub-steps.
    accumulated: f32,

    prev_solution: Vec<Vec3>,
    curr_solution: Vec<Vec3>,
    normals: Vec<Vec3>,
}

impl Waves {
    pub fn new(rows: usize, cols: usize, dx: f32, dt: f32, speed: f32, damping: f32) -> Waves {
        assert!(rows >= 3 && cols >= 3, "wave grid too small");

        let d = damping * dt + 2.0;
        let e = (speed * speed) * (dt * dt) / (dx * dx);
        let k1 = (damping * dt - 2.0) / d;
        let k2 = (4.0 - 8.0 * e) / d;
        let k3 = (2.0 * e) / d;

        let half_width = (cols - 1) as f32 * dx * 0.5;
        let half_depth = (rows - 1) as f32 * dx * 0.5;

        let mut positions = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            let z = half_depth - i as f32 * dx;
            for j in 0..cols {
                let x = -half_width + j as f32 * dx;
                positions.push(Vec3::new(x, 0.0, z));
            }
        }

        Waves {
            rows,
            cols,
            time_step: dt,
            spatial_step: dx,
            k1,
            k2,
            k3,
            accumulated: 0.0,
            prev_solution: positions.clone(),
            normals: vec![Vec3::new(0.0, 1.0, 0.0); rows * cols],
            curr_solution: positions,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.cols
    }

    pub fn vertex_count(&self) -> usize {
        self.rows * self.cols
    }

    pub fn triangle_count(&self) -> usize {
        (self.rows - 1) * (self.cols - 1) * 2
    }

    pub fn width(&self) -> f32 {
        (self.cols - 1) as f32 * self.spatial_step
    }

    pub fn depth(&self) -> f32 {
        (self.rows - 1) as f32 * self.spatial_step
    }

    pub fn position(&self, i: usize) -> Vec3 {
        self.curr_solution[i]
    }

    pub fn normal(&self, i: usize) -> Vec3 {
        self.normals[i]
    }

    /// Advances the simulation by `dt` seconds of wall-clock time, running as
    /// many whole `time_step` sub-steps as have accumulated. A fractional
    /// remainder carries over to the next call.
    pub fn update(&mut self, dt: f32) {
        self.accumulated += dt;

        let mut stepped = false;
        while self.accumulated >= self.time_step {
            self.accumulated -= self.time_step;
            self.step();
            stepped = true;
        }

        if stepped {
            self.update_normals();
        }
    }

    fn step(&mut self) {
        let n = self.cols;
        // Only interior vertices move; the boundary stays pinned at zero so
        // the buffers written here never read outside the grid.
        for i in 1..self.rows - 1 {
            for j in 1..self.cols - 1 {
                // After this update, prev holds the new solution. The roles
                // swap below, so we can overwrite prev in place.
                self.prev_solution[i * n + j].y = self.k1 * self.prev_solution[i * n + j].y
                    + self.k2 * self.curr_solution[i * n + j].y
                    + self.k3
                        * (self.curr_solution[(i + 1) * n + j].y
                            + self.curr_solution[(i - 1) * n + j].y
                            + self.curr_solution[i * n + j + 1].y
                            + self.curr_solution[i * n + j - 1].y);
            }
        }
        std::mem::swap(&mut self.prev_solution, &mut self.curr_solution);
    }

    fn update_normals(&mut self) {
        let n = self.cols;
        for i in 1..self.rows - 1 {
            for j in 1..self.cols - 1 {
                let l = self.curr_solution[i * n + j - 1].y;
                let r = self.curr_solution[i * n + j + 1].y;
                let t = self.curr_solution[(i - 1) * n + j].y;
                let b = self.curr_solution[(i + 1) * n + j].y;

                let mut normal = Vec3::new(l - r, 2.0 * self.spatial_step, b - t);
                normal.normalize();
                self.normals[i * n + j] = normal;
            }
        }
    }

    /// Adds a droplet at `(row, col)`: `magnitude` at the cell and half of it
    /// at the four cross neighbors. Out-of-range coordinates are clamped into
    /// the interior instead of touching adjacent memory.
    pub fn disturb(&mut self, row: usize, col: usize, magnitude: f32) {
        let i = row.clamp(1, self.rows - 2);
        let j = col.clamp(1, self.cols - 2);
        let n = self.cols;

        let half = 0.5 * magnitude;
        self.curr_solution[i * n + j].y += magnitude;
        self.curr_solution[i * n + j + 1].y += half;
        self.curr_solution[i * n + j - 1].y += half;
        self.curr_solution[(i + 1) * n + j].y += half;
        self.curr_solution[(i - 1) * n + j].y += half;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heights(waves: &Waves) -> Vec<f32> {
        (0..waves.vertex_count())
            .map(|i| waves.position(i).y)
            .collect()
    }

    #[test]
    fn starts_flat() {
        let waves = Waves::new(32, 32, 1.0, 0.03, 4.0, 0.2);
        assert!(heights(&waves).iter().all(|&h| h == 0.0));
        assert_eq!(waves.vertex_count(), 32 * 32);
        assert_eq!(waves.triangle_count(), 31 * 31 * 2);
    }

    #[test]
    fn disturb_touches_exactly_five_cells() {
        let mut waves = Waves::new(32, 32, 1.0, 0.03, 4.0, 0.2);
        waves.disturb(10, 12, 1.0);

        let n = waves.column_count();
        let changed: Vec<usize> = heights(&waves)
            .iter()
            .enumerate()
            .filter(|(_, &h)| h != 0.0)
            .map(|(i, _)| i)
            .collect();

        let expected = vec![
            9 * n + 10,
            10 * n + 11,
            10 * n + 12,
            10 * n + 13,
            11 * n + 10,
        ];
        let mut changed_sorted = changed.clone();
        changed_sorted.sort_unstable();
        assert_eq!(changed_sorted, expected);
        assert_eq!(waves.position(10 * n + 12).y, 1.0);
        assert_eq!(waves.position(10 * n + 11).y, 0.5);
    }

    #[test]
    fn disturb_clamps_out_of_range_indices() {
        let mut waves = Waves::new(16, 16, 1.0, 0.03, 4.0, 0.2);
        waves.disturb(0, 0, 1.0);
        waves.disturb(1000, 1000, 1.0);
        // Both clamped onto valid interior cells; nothing panicked and the
        // boundary row/column neighbors stayed addressable.
        assert!(heights(&waves).iter().any(|&h| h != 0.0));
    }

    #[test]
    fn fractional_time_carries_between_updates() {
        let mut a = Waves::new(16, 16, 1.0, 0.03, 4.0, 0.2);
        let mut b = Waves::new(16, 16, 1.0, 0.03, 4.0, 0.2);
        a.disturb(8, 8, 0.5);
        b.disturb(8, 8, 0.5);

        // Two half-steps must integrate exactly as far as one full step.
        a.update(0.015);
        a.update(0.015);
        b.update(0.03);

        assert_eq!(heights(&a), heights(&b));
    }

    #[test]
    fn integration_is_deterministic() {
        let run = || {
            let mut waves = Waves::new(32, 32, 1.0, 0.03, 4.0, 0.2);
            waves.disturb(10, 10, 0.4);
            waves.disturb(20, 14, 0.3);
            for _ in 0..50 {
                waves.update(0.016);
            }
            heights(&waves)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn normals_stay_unit_length_and_upward_on_average() {
        let mut waves = Waves::new(32, 32, 1.0, 0.03, 4.0, 0.2);
        waves.disturb(16, 16, 0.5);
        for _ in 0..20 {
            waves.update(0.03);
        }
        for i in 0..waves.vertex_count() {
            let n = waves.normal(i);
            assert!((n.mag() - 1.0).abs() < 1e-4);
            assert!(n.y > 0.0);
        }
    }
}
