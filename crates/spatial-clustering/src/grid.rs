//! Neighborhood search over geodesic distance.
//!
//! The grid is only a broad phase: cell sizes are derived from `eps` so that any
//! pair within `eps` meters is guaranteed to fall into the same or an adjacent
//! cell, then every candidate is confirmed with an exact haversine check. The
//! resulting neighbor lists are identical to the brute-force ones.

use std::collections::HashMap;

use geo_distance::{distance, meters_to_radians, Coordinate};

use crate::config::NeighborSearch;

/// Slack applied to cell geometry so boundary rounding never drops a pair
const CELL_SLACK: f64 = 1.01;

/// Build neighbor lists (self included, ascending index order) for every point.
pub(crate) fn neighbor_lists(
    points: &[Coordinate],
    eps_m: f64,
    search: NeighborSearch,
) -> Vec<Vec<usize>> {
    match search {
        NeighborSearch::BruteForce => brute_force(points, eps_m),
        NeighborSearch::Grid => GeoGrid::build(points, eps_m).neighbor_lists(points, eps_m),
    }
}

fn brute_force(points: &[Coordinate], eps_m: f64) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut lists = vec![Vec::new(); n];
    for i in 0..n {
        lists[i].push(i);
        for j in (i + 1)..n {
            if distance(points[i], points[j]) <= eps_m {
                lists[i].push(j);
                lists[j].push(i);
            }
        }
    }
    for list in &mut lists {
        list.sort_unstable();
    }
    lists
}

/// Latitude bands crossed with equal-width longitude cells that wrap at the antimeridian
struct GeoGrid {
    lat_cell_deg: f64,
    lon_cells: i64,
    lon_cell_deg: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl GeoGrid {
    fn build(points: &[Coordinate], eps_m: f64) -> Self {
        let eps_rad = meters_to_radians(eps_m * CELL_SLACK);
        let lat_cell_deg = eps_rad.to_degrees();

        // cos(lat1) * cos(lat2) >= cos^2(max |lat|), which bounds the longitude gap:
        // sin(dlon / 2) <= sin(eps / 2) / cos(max |lat|)
        let max_abs_lat = points.iter().map(|p| p.lat().abs()).fold(0.0, f64::max);
        let ratio = (eps_rad / 2.0).sin() / max_abs_lat.to_radians().cos();

        let lon_cells = if ratio.is_finite() && ratio < 1.0 {
            let lon_width_deg = (2.0 * ratio.asin()).to_degrees();
            (360.0 / lon_width_deg).floor() as i64
        } else {
            1
        };
        // Fewer than three cells cannot express "adjacent" without aliasing
        let lon_cells = if lon_cells < 3 { 1 } else { lon_cells };
        let lon_cell_deg = 360.0 / lon_cells as f64;

        let mut grid = Self {
            lat_cell_deg,
            lon_cells,
            lon_cell_deg,
            cells: HashMap::new(),
        };
        for (i, p) in points.iter().enumerate() {
            let key = grid.cell_of(*p);
            grid.cells.entry(key).or_default().push(i);
        }
        grid
    }

    fn cell_of(&self, p: Coordinate) -> (i64, i64) {
        let band = ((p.lat() + 90.0) / self.lat_cell_deg).floor() as i64;
        let offset = (p.lon() + 180.0).rem_euclid(360.0);
        let column = ((offset / self.lon_cell_deg).floor() as i64).min(self.lon_cells - 1);
        (band, column)
    }

    fn neighbor_lists(&self, points: &[Coordinate], eps_m: f64) -> Vec<Vec<usize>> {
        let mut lists = Vec::with_capacity(points.len());
        let mut columns = Vec::with_capacity(3);

        for (i, p) in points.iter().enumerate() {
            let (band, column) = self.cell_of(*p);

            columns.clear();
            if self.lon_cells == 1 {
                columns.push(0);
            } else {
                for dc in -1..=1 {
                    columns.push((column + dc).rem_euclid(self.lon_cells));
                }
            }

            let mut list = Vec::new();
            for db in -1..=1 {
                for &c in &columns {
                    if let Some(cell) = self.cells.get(&(band + db, c)) {
                        for &j in cell {
                            if j == i || distance(*p, points[j]) <= eps_m {
                                list.push(j);
                            }
                        }
                    }
                }
            }
            list.sort_unstable();
            lists.push(list);
        }
        lists
    }
}
