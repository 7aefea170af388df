//! Bounded rolling price series for the chart

use std::collections::VecDeque;

use crate::types::PricePoint;

/// Default number of points kept on the chart
pub const DEFAULT_CAPACITY: usize = 20;

/// FIFO buffer of chart points; the oldest point is evicted on overflow
#[derive(Debug, Clone)]
pub struct PriceSeries {
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl Default for PriceSeries {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl PriceSeries {
    /// Capacity is clamped to at least one point
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a point, evicting from the front past capacity.
    /// Returns the evicted point, if any.
    pub fn append(&mut self, label: impl Into<String>, value: f64) -> Option<PricePoint> {
        self.points.push_back(PricePoint {
            label: label.into(),
            value,
        });
        if self.points.len() > self.capacity {
            self.points.pop_front()
        } else {
            None
        }
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
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

    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// (min, max) over the buffered values
    pub fn range(&self) -> Option<(f64, f64)> {
        self.points.iter().fold(None, |acc, p| match acc {
            None => Some((p.value, p.value)),
            Some((lo, hi)) => Some((lo.min(p.value), hi.max(p.value))),
        })
    }
}
