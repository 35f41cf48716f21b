//! Bounded history of tracked centroids.

use std::collections::VecDeque;

use crate::frame::Point;

/// Maximum number of retained points.
pub const TRAJECTORY_CAPACITY: usize = 100;

/// Fixed-capacity FIFO; pushing onto a full buffer evicts the oldest point.
#[derive(Clone, Debug)]
pub struct TrajectoryBuffer {
    points: VecDeque<Point>,
    capacity: usize,
}

impl Default for TrajectoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TrajectoryBuffer {
    pub fn new() -> Self {
        Self::with_capacity(TRAJECTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: Point) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<Point> {
        self.points.back().copied()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Point> + '_ {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_last_hundred_points_in_order() {
        let mut buffer = TrajectoryBuffer::new();
        for i in 0..150 {
            buffer.push(Point::new(i, -i));
            assert!(buffer.len() <= TRAJECTORY_CAPACITY);
        }
        assert_eq!(buffer.len(), 100);
        let xs: Vec<i32> = buffer.iter().map(|p| p.x).collect();
        assert_eq!(xs, (50..150).collect::<Vec<_>>());
    }

    #[test]
    fn clear_empties_the_buffer() {
        let mut buffer = TrajectoryBuffer::with_capacity(3);
        buffer.push(Point::new(1, 1));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.last(), None);
    }
}
