use serde::{Deserialize, Serialize};

use crate::error::{PoseError, PoseResult};
use crate::types::Vec3;

/// Cascade depth of the exponential smoother.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterOrder {
    First,
    #[default]
    Second,
    Third,
}

impl FilterOrder {
    pub fn from_number(order: u8) -> Option<Self> {
        match order {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            3 => Some(Self::Third),
            _ => None,
        }
    }
}

/// Rolling memory of one channel: `inputs[k]` is X_{t-1-k}, `outputs[k]` is Y_{t-1-k}.
/// Empty until the first sample, which fills every slot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ChannelMemory {
    inputs: [f64; 3],
    outputs: [f64; 3],
    seeded: bool,
}

impl ChannelMemory {
    fn step(&mut self, x: f64, alpha: f64, order: FilterOrder) -> f64 {
        if !self.seeded {
            self.inputs = [x; 3];
            self.outputs = [x; 3];
            self.seeded = true;
            return x;
        }
        let a = alpha.clamp(0.0, 1.0);
        let b = 1.0 - a;
        let y = match order {
            FilterOrder::First => a * x + b * self.outputs[0],
            FilterOrder::Second => a * x + a * b * self.inputs[0] + b * b * self.outputs[1],
            FilterOrder::Third => {
                a * x + a * b * self.inputs[0] + a * b * b * self.inputs[1] + b * b * b * self.outputs[2]
            }
        };
        // Shift by exactly one step whatever the order
        self.inputs = [x, self.inputs[0], self.inputs[1]];
        self.outputs = [y, self.outputs[0], self.outputs[1]];
        y
    }
}

/// Cascaded exponential low-pass filter over a group of independent channels.
///
/// Order 1: Y = αX + (1−α)·Y₋₁
/// Order 2: Y = αX + α(1−α)·X₋₁ + (1−α)²·Y₋₂
/// Order 3: Y = αX + α(1−α)·X₋₁ + α(1−α)²·X₋₂ + (1−α)³·Y₋₃
///
/// Each channel's history is seeded from its first sample, so the first
/// output equals the first input for every order and α.
///
/// The memory is order-agnostic. Changing the order mid-stream is allowed
/// but the new order starts from history produced by the old one: with a
/// constant α the result is unchanged, with a varying α it depends on which
/// order wrote the history. Pick the order once per session.
#[derive(Clone, Debug)]
pub struct CascadedExponentialFilter {
    order: FilterOrder,
    channels: Vec<ChannelMemory>,
}

impl CascadedExponentialFilter {
    pub fn new(order: FilterOrder) -> Self {
        Self { order, channels: Vec::new() }
    }

    pub fn with_channels(order: FilterOrder, channel_count: usize) -> Self {
        Self { order, channels: vec![ChannelMemory::default(); channel_count] }
    }

    pub fn order(&self) -> FilterOrder {
        self.order
    }

    pub fn set_order(&mut self, order: FilterOrder) {
        self.order = order;
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn ensure_channels(&mut self, count: usize) {
        if self.channels.len() < count {
            self.channels.resize(count, ChannelMemory::default());
        }
    }

    /// Single scalar on channel 0.
    pub fn filter(&mut self, x: f64, alpha: f64) -> f64 {
        self.ensure_channels(1);
        let order = self.order;
        self.channels[0].step(x, alpha, order)
    }

    /// Three channels sharing one α.
    pub fn filter_vec3(&mut self, v: Vec3, alpha: f64) -> Vec3 {
        self.filter_vec3_per_axis(v, Vec3::repeat(alpha))
    }

    /// Three channels, one α per axis.
    pub fn filter_vec3_per_axis(&mut self, v: Vec3, alphas: Vec3) -> Vec3 {
        self.ensure_channels(3);
        let order = self.order;
        Vec3::new(
            self.channels[0].step(v.x, alphas.x, order),
            self.channels[1].step(v.y, alphas.y, order),
            self.channels[2].step(v.z, alphas.z, order),
        )
    }

    /// Independent channels sharing one α.
    pub fn filter_slice(&mut self, xs: &[f64], alpha: f64) -> Vec<f64> {
        self.ensure_channels(xs.len());
        let order = self.order;
        xs.iter()
            .zip(self.channels.iter_mut())
            .map(|(&x, memory)| memory.step(x, alpha, order))
            .collect()
    }

    /// Independent channels with one α each; lengths must match.
    pub fn filter_slice_per_channel(&mut self, xs: &[f64], alphas: &[f64]) -> PoseResult<Vec<f64>> {
        if xs.len() != alphas.len() {
            return Err(PoseError::DimensionMismatch {
                op: "filter_slice_per_channel",
                expected: (xs.len(), 1),
                found: (alphas.len(), 1),
            });
        }
        self.ensure_channels(xs.len());
        let order = self.order;
        Ok(xs
            .iter()
            .zip(alphas)
            .zip(self.channels.iter_mut())
            .map(|((&x, &alpha), memory)| memory.step(x, alpha, order))
            .collect())
    }

    /// Clear all rolling memory; the next sample reseeds it. Filters never
    /// reset themselves.
    pub fn reset(&mut self) {
        for memory in self.channels.iter_mut() {
            *memory = ChannelMemory::default();
        }
    }
}
