//! External contour extraction on binary masks.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

use crate::frame::{BoundingBox, Point};

/// Outer boundary of one connected foreground region.
#[derive(Clone, Debug, PartialEq)]
pub struct ContourBox {
    /// Tight box around the boundary pixels, exclusive bottom-right.
    pub bbox: BoundingBox,
    /// Polygon area enclosed by the boundary (shoelace formula).
    pub area: f64,
}

/// Outermost contours only; holes and nested regions are skipped.
pub fn external_contours(mask: &GrayImage) -> Vec<ContourBox> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .filter_map(|contour| {
            let points = contour.points;
            let first = points.first()?;
            let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
            for p in &points {
                x0 = x0.min(p.x);
                y0 = y0.min(p.y);
                x1 = x1.max(p.x);
                y1 = y1.max(p.y);
            }
            Some(ContourBox {
                bbox: BoundingBox::from_corners(Point::new(x0, y0), Point::new(x1 + 1, y1 + 1)),
                area: polygon_area(&points),
            })
        })
        .collect()
}

/// Sort largest first. Ties fall back to the bounding-box area.
pub fn sort_by_area_desc(contours: &mut [ContourBox]) {
    contours.sort_by(|a, b| {
        b.area
            .total_cmp(&a.area)
            .then_with(|| b.bbox.area().cmp(&a.bbox.area()))
    });
}

fn polygon_area(points: &[imageproc::point::Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice += i64::from(p.x) * i64::from(q.y) - i64::from(q.x) * i64::from(p.y);
    }
    (twice as f64 / 2.0).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask_with_squares(squares: &[(u32, u32, u32)]) -> GrayImage {
        let mut mask = GrayImage::new(60, 60);
        for &(x, y, side) in squares {
            for j in y..y + side {
                for i in x..x + side {
                    mask.put_pixel(i, j, Luma([255]));
                }
            }
        }
        mask
    }

    #[test]
    fn finds_one_box_per_region() {
        let mask = mask_with_squares(&[(5, 5, 10), (30, 30, 20)]);
        let mut contours = external_contours(&mask);
        sort_by_area_desc(&mut contours);

        assert_eq!(contours.len(), 2);
        assert_eq!(contours[0].bbox, BoundingBox::from_xywh(30, 30, 20, 20));
        assert_eq!(contours[1].bbox, BoundingBox::from_xywh(5, 5, 10, 10));
        assert!(contours[0].area > contours[1].area);
    }

    #[test]
    fn holes_are_not_reported() {
        let mut mask = mask_with_squares(&[(10, 10, 30)]);
        for j in 20..30 {
            for i in 20..30 {
                mask.put_pixel(i, j, Luma([0]));
            }
        }
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].bbox, BoundingBox::from_xywh(10, 10, 30, 30));
    }

    #[test]
    fn empty_mask_has_no_contours() {
        assert!(external_contours(&GrayImage::new(8, 8)).is_empty());
    }
}
