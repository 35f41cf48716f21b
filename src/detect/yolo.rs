//! YOLOv8-style output decoding and non-maximum suppression.
//!
//! The detection head emits `[1, 4 + nc, N]` (or the transposed
//! `[1, N, 4 + nc]`): per anchor a `cx, cy, w, h` box in canvas pixels
//! followed by one score per class.

use anyhow::{anyhow, bail, Result};

use super::result::Prediction;
use crate::frame::BoundingBox;

const CXYWH_OFFSET: usize = 4;

/// A decoded anchor above the confidence threshold, in canvas space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    /// `[4 + nc, N]`
    AttributesFirst { anchors: usize },
    /// `[N, 4 + nc]`
    AnchorsFirst { anchors: usize },
}

fn layout(shape: &[usize], num_classes: usize) -> Result<Layout> {
    let dims: Vec<usize> = match shape {
        [1, a, b] => vec![*a, *b],
        [a, b] => vec![*a, *b],
        other => bail!("unexpected output shape {:?}", other),
    };
    let attrs = CXYWH_OFFSET + num_classes;
    if dims[0] == attrs {
        Ok(Layout::AttributesFirst { anchors: dims[1] })
    } else if dims[1] == attrs {
        Ok(Layout::AnchorsFirst { anchors: dims[0] })
    } else {
        Err(anyhow!(
            "output shape {:?} does not match {} classes",
            shape,
            num_classes
        ))
    }
}

/// Decode every anchor whose best class score reaches `confidence_threshold`.
pub fn decode(
    prediction: &Prediction,
    num_classes: usize,
    confidence_threshold: f32,
) -> Result<Vec<Candidate>> {
    if num_classes == 0 {
        bail!("class list is empty");
    }
    let layout = layout(&prediction.shape, num_classes)?;
    let attrs = CXYWH_OFFSET + num_classes;
    let anchors = match layout {
        Layout::AttributesFirst { anchors } | Layout::AnchorsFirst { anchors } => anchors,
    };
    if prediction.data.len() != attrs * anchors {
        bail!(
            "output has {} values, expected {}",
            prediction.data.len(),
            attrs * anchors
        );
    }

    let at = |anchor: usize, attr: usize| -> f32 {
        match layout {
            Layout::AttributesFirst { anchors } => prediction.data[attr * anchors + anchor],
            Layout::AnchorsFirst { .. } => prediction.data[anchor * attrs + attr],
        }
    };

    let mut out = Vec::new();
    for anchor in 0..anchors {
        let mut best = (0usize, f32::NEG_INFINITY);
        for class_id in 0..num_classes {
            let score = at(anchor, CXYWH_OFFSET + class_id);
            if score > best.1 {
                best = (class_id, score);
            }
        }
        if !best.1.is_finite() || best.1 < confidence_threshold {
            continue;
        }
        out.push(Candidate {
            class_id: best.0,
            confidence: best.1,
            cx: at(anchor, 0),
            cy: at(anchor, 1),
            w: at(anchor, 2),
            h: at(anchor, 3),
        });
    }
    Ok(out)
}

/// Greedy NMS: keep the most confident box, drop any later box overlapping a kept one.
pub fn non_max_suppression<T, F>(items: &mut Vec<T>, iou_threshold: f32, key: F)
where
    F: Fn(&T) -> (f32, BoundingBox),
{
    items.sort_by(|a, b| key(b).0.total_cmp(&key(a).0));

    let mut kept = 0;
    for index in 0..items.len() {
        let (_, candidate) = key(&items[index]);
        let overlaps = items[..kept]
            .iter()
            .any(|prev| key(prev).1.iou(&candidate) > iou_threshold);
        if !overlaps {
            items.swap(kept, index);
            kept += 1;
        }
    }
    items.truncate(kept);
}
