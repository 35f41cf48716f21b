//! Image-processing building blocks shared by the detection modes.
//!
//! - `color`: HSV conversion, range masks, grayscale, blur
//! - `contours`: external contour extraction and bounding boxes
//! - `draw`: overlays (boxes, trajectories, labelled detections)

pub mod color;
pub mod contours;
pub mod draw;

pub use color::{
    grayscale, in_range, median_blur, rgb_to_hsv, threshold_range, HsvBounds, HUE_MAX,
};
pub use contours::{external_contours, sort_by_area_desc, ContourBox};
pub use draw::{LabelFont, BOX_COLOR, PALETTE, TRAJECTORY_COLOR};
