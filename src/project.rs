use crate::config::MapConfig;
use geo::{LineString, MultiPolygon};

/// Albers equal-area conic projection, centered like the original view of
/// metropolitan France (2°E / 46.2°N, standard parallels 43° and 62°).
/// Output is SVG pixel space: y grows downward, the configured center lands
/// at the middle of the canvas.
#[derive(Debug, Clone)]
pub struct Albers {
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
    scale: f64,
    tx: f64,
    ty: f64,
}

impl Albers {
    pub fn new(map: &MapConfig) -> Self {
        let phi1 = map.parallel_lower.to_radians();
        let phi2 = map.parallel_upper.to_radians();
        let phi0 = map.center_lat.to_radians();

        let n = (phi1.sin() + phi2.sin()) / 2.0;
        let c = phi1.cos().powi(2) + 2.0 * n * phi1.sin();
        let rho0 = (c - 2.0 * n * phi0.sin()).sqrt() / n;

        Albers {
            n,
            c,
            rho0,
            lon0: map.center_lon,
            scale: map.scale,
            tx: map.width / 2.0,
            ty: map.height / 2.0,
        }
    }

    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lambda = (lon - self.lon0).to_radians();
        let phi = lat.to_radians();

        let rho = (self.c - 2.0 * self.n * phi.sin()).sqrt() / self.n;
        let theta = self.n * lambda;

        let x = rho * theta.sin();
        let y = self.rho0 - rho * theta.cos();

        (self.tx + self.scale * x, self.ty - self.scale * y)
    }

    /// SVG path data for a projected multipolygon, exterior and interior
    /// rings alike.
    pub fn path_data(&self, geometry: &MultiPolygon<f64>) -> String {
        let mut d = String::new();
        for polygon in &geometry.0 {
            self.push_ring(&mut d, polygon.exterior());
            for interior in polygon.interiors() {
                self.push_ring(&mut d, interior);
            }
        }
        d
    }

    fn push_ring(&self, d: &mut String, ring: &LineString<f64>) {
        for (i, coord) in ring.coords().enumerate() {
            let (x, y) = self.project(coord.x, coord.y);
            let cmd = if i == 0 { 'M' } else { 'L' };
            d.push_str(&format!("{cmd}{x:.2},{y:.2}"));
        }
        d.push('Z');
    }

    /// Graticule polylines: meridians and parallels every `step` degrees,
    /// sampled finely enough to curve under the conic projection.
    pub fn graticule(&self, step: f64) -> Vec<String> {
        let mut lines = Vec::new();
        let mut lon = -180.0;
        while lon <= 180.0 {
            lines.push(self.polyline((-80..=80).map(|lat| (lon, lat as f64))));
            lon += step;
        }
        let mut lat = -80.0;
        while lat <= 80.0 {
            lines.push(self.polyline((-180..=180).map(|lon| (lon as f64, lat))));
            lat += step;
        }
        lines
    }

    fn polyline(&self, points: impl Iterator<Item = (f64, f64)>) -> String {
        let mut d = String::new();
        for (i, (lon, lat)) in points.enumerate() {
            let (x, y) = self.project(lon, lat);
            let cmd = if i == 0 { 'M' } else { 'L' };
            d.push_str(&format!("{cmd}{x:.2},{y:.2}"));
        }
        d
    }

    pub fn canvas_center(&self) -> (f64, f64) {
        (self.tx, self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn map_config() -> MapConfig {
        MapConfig {
            width: 700.0,
            height: 460.0,
            center_lon: 2.0,
            center_lat: 46.2,
            parallel_lower: 43.0,
            parallel_upper: 62.0,
            scale: 2500.0,
            graticule_step: 5.0,
        }
    }

    #[test]
    fn center_projects_to_canvas_midpoint() {
        let proj = Albers::new(&map_config());
        let (x, y) = proj.project(2.0, 46.2);
        let (cx, cy) = proj.canvas_center();
        assert!((x - cx).abs() < 1e-9);
        assert!((y - cy).abs() < 1e-9);
    }

    #[test]
    fn north_is_up_and_east_is_right() {
        let proj = Albers::new(&map_config());
        let (cx, cy) = proj.project(2.0, 46.2);
        let (_, y_north) = proj.project(2.0, 48.0);
        let (x_east, _) = proj.project(4.0, 46.2);
        assert!(y_north < cy);
        assert!(x_east > cx);
    }

    #[test]
    fn path_data_closes_each_ring() {
        let proj = Albers::new(&map_config());
        let poly = polygon![
            (x: 1.0, y: 45.0),
            (x: 3.0, y: 45.0),
            (x: 3.0, y: 47.0),
            (x: 1.0, y: 47.0),
        ];
        let d = proj.path_data(&MultiPolygon::new(vec![poly]));
        assert!(d.starts_with('M'));
        assert!(d.ends_with('Z'));
        assert_eq!(d.matches('Z').count(), 1);
    }
}
