use iced::{
    mouse,
    widget::canvas::{self, Frame, Geometry, Path, Stroke},
    Color, Point, Rectangle, Renderer, Size, Theme,
};
use limnocore::model::{BoundaryShape, GeoBounds, GeoPoint};
use limnocore::scene::MarkerSpec;

/// Maps geographic coordinates onto a canvas stretched over `bounds`.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    bounds: GeoBounds,
    size: Size,
}

impl Projection {
    pub fn new(bounds: GeoBounds, size: Size) -> Self {
        let bounds = if bounds.is_usable() {
            bounds
        } else {
            GeoBounds::FALLBACK
        };
        Self { bounds, size }
    }

    pub fn project(&self, point: GeoPoint) -> Point {
        let b = &self.bounds;
        let x = (point.longitude - b.west) / (b.east - b.west) * self.size.width as f64;
        let y = (b.north - point.latitude) / (b.north - b.south) * self.size.height as f64;
        Point::new(x as f32, y as f32)
    }
}

/// Blue for low values through red for the largest one on screen.
fn marker_color(value: f64, max: f64, alpha: f32) -> Color {
    let t = if max > 0.0 && value.is_finite() {
        (value / max).clamp(0.0, 1.0) as f32
    } else {
        0.0
    };
    Color::from_rgba(0.15 + 0.8 * t, 0.35, 0.95 - 0.8 * t, alpha)
}

/// Boundary, reference dots and measurement markers drawn over the overlay.
#[derive(Debug, Clone)]
pub struct LakeMap {
    pub bounds: GeoBounds,
    pub boundary: BoundaryShape,
    pub markers: Vec<MarkerSpec>,
    pub marker_opacity: f32,
    pub reference_points: Vec<GeoPoint>,
}

impl<Message> canvas::Program<Message> for LakeMap {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        let projection = Projection::new(self.bounds, bounds.size());

        for ring in &self.boundary.rings {
            if ring.len() < 2 {
                continue;
            }
            let outline = Path::new(|builder| {
                for (i, point) in ring.iter().enumerate() {
                    let p = projection.project(*point);
                    if i == 0 {
                        builder.move_to(p);
                    } else {
                        builder.line_to(p);
                    }
                }
                builder.close();
            });
            frame.stroke(
                &outline,
                Stroke::default()
                    .with_width(2.0)
                    .with_color(Color::from_rgb(0.2, 0.45, 0.9)),
            );
        }

        for point in &self.reference_points {
            let dot = Path::circle(projection.project(*point), 2.0);
            frame.fill(&dot, Color::BLACK);
        }

        if self.marker_opacity > 0.0 {
            let max = self
                .markers
                .iter()
                .map(|m| m.measurement.value)
                .filter(|v| v.is_finite())
                .fold(0.0, f64::max);
            for marker in &self.markers {
                let center = projection.project(marker.position());
                let circle = Path::circle(center, marker.radius as f32);
                frame.fill(
                    &circle,
                    marker_color(marker.measurement.value, max, 0.6 * self.marker_opacity),
                );
                frame.stroke(
                    &circle,
                    Stroke::default()
                        .with_width(1.0)
                        .with_color(Color::from_rgba(1.0, 1.0, 1.0, self.marker_opacity)),
                );
            }
        }

        vec![frame.into_geometry()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_project_to_canvas_corners() {
        let projection = Projection::new(GeoBounds::FALLBACK, Size::new(200.0, 100.0));
        let b = GeoBounds::FALLBACK;
        let nw = projection.project(GeoPoint {
            latitude: b.north,
            longitude: b.west,
        });
        let se = projection.project(GeoPoint {
            latitude: b.south,
            longitude: b.east,
        });
        assert!(nw.x.abs() < 1e-3 && nw.y.abs() < 1e-3);
        assert!((se.x - 200.0).abs() < 1e-3 && (se.y - 100.0).abs() < 1e-3);
    }

    #[test]
    fn degenerate_bounds_use_fallback_extent() {
        let flat = GeoBounds {
            south: 1.0,
            west: 1.0,
            north: 1.0,
            east: 1.0,
        };
        let projection = Projection::new(flat, Size::new(100.0, 100.0));
        let center = projection.project(GeoBounds::FALLBACK.center());
        assert!((center.x - 50.0).abs() < 1e-3);
        assert!((center.y - 50.0).abs() < 1e-3);
    }

    #[test]
    fn marker_color_runs_blue_to_red() {
        let low = marker_color(0.0, 10.0, 1.0);
        let high = marker_color(10.0, 10.0, 1.0);
        assert!(low.b > low.r);
        assert!(high.r > high.b);
    }
}
