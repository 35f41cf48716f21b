use serde::Serialize;

use crate::frame::BoundingBox;

/// One object found by the neural detector, in frame coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    /// Index into the class list.
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Raw network output: a dense f32 tensor and its shape.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Prediction {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Prediction {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }
}
