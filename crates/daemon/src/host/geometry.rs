// Selected-shape geometry and its fingerprint.

use gdslink_common::selection::SelectionFingerprint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerInfo {
    pub layer: u32,
    pub datatype: u32,
}

impl LayerInfo {
    pub const fn new(layer: u32, datatype: u32) -> Self {
        Self { layer, datatype }
    }
}

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i64,
    pub bottom: i64,
    pub right: i64,
    pub top: i64,
}

impl Rect {
    pub const fn new(left: i64, bottom: i64, right: i64, top: i64) -> Self {
        Self { left, bottom, right, top }
    }

    /// Hull in the order a box-derived polygon reports it.
    pub fn hull(&self) -> Vec<Point> {
        vec![
            Point::new(self.left, self.bottom),
            Point::new(self.left, self.top),
            Point::new(self.right, self.top),
            Point::new(self.right, self.bottom),
        ]
    }
}

/// Simple orthogonal transformation: optional mirror about the x axis,
/// then counter-clockwise rotation in quarter turns, then displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub rotation: u8,
    pub mirror: bool,
    pub dx: i64,
    pub dy: i64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self { rotation: 0, mirror: false, dx: 0, dy: 0 };

    pub const fn displacement(dx: i64, dy: i64) -> Self {
        Self { rotation: 0, mirror: false, dx, dy }
    }

    /// Transformed point, or `None` when a coordinate leaves the `i64` range.
    pub fn apply(&self, point: Point) -> Option<Point> {
        let y = if self.mirror { point.y.checked_neg()? } else { point.y };
        let (x, y) = match self.rotation % 4 {
            0 => (point.x, y),
            1 => (y.checked_neg()?, point.x),
            2 => (point.x.checked_neg()?, y.checked_neg()?),
            _ => (y, point.x.checked_neg()?),
        };
        Some(Point::new(x.checked_add(self.dx)?, y.checked_add(self.dy)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeGeometry {
    Polygon { hull: Vec<Point> },
    Box { rect: Rect },
    /// Paths, texts, instances: selectable but never fingerprinted.
    Other,
}

/// One entry of the application's object selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedShape {
    pub layer: LayerInfo,
    pub geometry: ShapeGeometry,
    #[serde(default)]
    pub transform: Transform,
}

impl SelectedShape {
    pub fn polygon(layer: LayerInfo, hull: Vec<Point>) -> Self {
        Self { layer, geometry: ShapeGeometry::Polygon { hull }, transform: Transform::IDENTITY }
    }

    pub fn rect(layer: LayerInfo, rect: Rect) -> Self {
        Self { layer, geometry: ShapeGeometry::Box { rect }, transform: Transform::IDENTITY }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Transformed hull, or `None` for shapes that are not polygons or boxes
    /// and for shapes whose transformed coordinates overflow.
    pub fn hull(&self) -> Option<Vec<Point>> {
        let hull = match &self.geometry {
            ShapeGeometry::Polygon { hull } => hull.clone(),
            ShapeGeometry::Box { rect } => rect.hull(),
            ShapeGeometry::Other => return None,
        };
        hull.into_iter().map(|point| self.transform.apply(point)).collect()
    }

    pub fn fingerprint(&self) -> Option<SelectionFingerprint> {
        let points = self.hull()?.into_iter().map(|point| (point.x, point.y)).collect();
        Some(SelectionFingerprint {
            layer: self.layer.layer,
            datatype: self.layer.datatype,
            points,
        })
    }
}

/// Fingerprint of the first selected shape that has one.
pub fn fingerprint_selection(selection: &[SelectedShape]) -> Option<String> {
    selection.iter().find_map(SelectedShape::fingerprint).map(|fingerprint| fingerprint.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const METAL1: LayerInfo = LayerInfo::new(1, 0);

    #[test]
    fn polygon_fingerprint_lists_hull_points() {
        let triangle = SelectedShape::polygon(
            METAL1,
            vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10)],
        );
        assert_eq!(fingerprint_selection(&[triangle]).as_deref(), Some("1/0@0_0_10_0_10_10"));
    }

    #[test]
    fn box_fingerprint_uses_box_hull_order() {
        let rect = SelectedShape::rect(LayerInfo::new(2, 5), Rect::new(0, 0, 4, 2));
        assert_eq!(fingerprint_selection(&[rect]).as_deref(), Some("2/5@0_0_0_2_4_2_4_0"));
    }

    #[test]
    fn transform_is_applied_before_fingerprinting() {
        let rect = SelectedShape::rect(METAL1, Rect::new(0, 0, 4, 2))
            .with_transform(Transform::displacement(100, -50));
        assert_eq!(
            fingerprint_selection(&[rect]).as_deref(),
            Some("1/0@100_-50_100_-48_104_-48_104_-50")
        );
    }

    #[test]
    fn rotation_and_mirror_follow_orthogonal_rules() {
        let point = Point::new(3, 1);
        let r90 = Transform { rotation: 1, ..Transform::IDENTITY };
        assert_eq!(r90.apply(point), Some(Point::new(-1, 3)));
        let r180 = Transform { rotation: 2, ..Transform::IDENTITY };
        assert_eq!(r180.apply(point), Some(Point::new(-3, -1)));
        let r270 = Transform { rotation: 3, ..Transform::IDENTITY };
        assert_eq!(r270.apply(point), Some(Point::new(1, -3)));
        let mirrored = Transform { mirror: true, ..Transform::IDENTITY };
        assert_eq!(mirrored.apply(point), Some(Point::new(3, -1)));
        let m90 = Transform { rotation: 1, mirror: true, dx: 10, dy: 0 };
        assert_eq!(m90.apply(point), Some(Point::new(11, 3)));
    }

    #[test]
    fn overflowing_shapes_have_no_fingerprint() {
        let far = SelectedShape::rect(METAL1, Rect::new(0, 0, 1, 1))
            .with_transform(Transform::displacement(i64::MAX, 0));
        assert_eq!(fingerprint_selection(&[far.clone()]), None);

        let flipped = SelectedShape::polygon(METAL1, vec![Point::new(i64::MIN, 0)])
            .with_transform(Transform { rotation: 2, ..Transform::IDENTITY });
        assert_eq!(flipped.hull(), None);

        let rect = SelectedShape::rect(LayerInfo::new(3, 0), Rect::new(0, 0, 1, 1));
        assert_eq!(fingerprint_selection(&[far, rect]).as_deref(), Some("3/0@0_0_0_1_1_1_1_0"));
    }

    #[test]
    fn non_polygon_shapes_are_skipped() {
        let other = SelectedShape {
            layer: METAL1,
            geometry: ShapeGeometry::Other,
            transform: Transform::IDENTITY,
        };
        let rect = SelectedShape::rect(LayerInfo::new(3, 0), Rect::new(0, 0, 1, 1));
        assert_eq!(fingerprint_selection(&[other.clone()]), None);
        assert_eq!(fingerprint_selection(&[other, rect]).as_deref(), Some("3/0@0_0_0_1_1_1_1_0"));
        assert_eq!(fingerprint_selection(&[]), None);
    }
}
