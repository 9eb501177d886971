//! Named animation/shape channels and their evaluation.

use std::collections::HashMap;
use std::sync::Arc;

/// A named pose parameter driving deformation.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Channel name, unique within its system.
    pub name: String,
    /// Value used when no input is supplied.
    pub default: f32,
    /// Lower clamp bound.
    pub min: f32,
    /// Upper clamp bound.
    pub max: f32,
}

impl Channel {
    /// A channel defaulting to zero over `[min, max]`.
    #[must_use]
    pub fn new(name: &str, min: f32, max: f32) -> Self {
        Self {
            name: name.to_owned(),
            default: 0.0,
            min,
            max,
        }
    }
}

/// Raw (unclamped) channel input values, indexed by channel.
#[derive(Debug, Clone)]
pub struct ChannelInputs {
    values: Vec<f32>,
}

impl ChannelInputs {
    /// Set the raw value of channel `index`. Out-of-range indices are
    /// ignored.
    pub fn set(&mut self, index: usize, value: f32) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// Raw value of channel `index`, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }
}

/// Evaluated channel values, clamped and parent-inherited.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOutputs {
    values: Vec<f32>,
}

impl ChannelOutputs {
    /// Evaluated value of channel `index` (0.0 if out of range).
    #[must_use]
    pub fn value(&self, index: usize) -> f32 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    /// All evaluated values, in channel order.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// The set of channels driving one figure, with an optional parent system
/// for attachments that follow the main figure's pose.
///
/// A figure is the *main* figure of its hierarchy iff its channel system
/// has no parent.
pub struct ChannelSystem {
    channels: Vec<Channel>,
    by_name: HashMap<String, usize>,
    parent: Option<Arc<ChannelSystem>>,
}

impl ChannelSystem {
    /// Build a channel system. Later channels shadow earlier ones with the
    /// same name.
    #[must_use]
    pub fn new(channels: Vec<Channel>, parent: Option<Arc<ChannelSystem>>) -> Self {
        let by_name = channels
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self {
            channels,
            by_name,
            parent,
        }
    }

    /// Number of channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// The channels, in evaluation order.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Index of the channel named `name`.
    #[must_use]
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Parent channel system (None for the main figure).
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<ChannelSystem>> {
        self.parent.as_ref()
    }

    /// Inputs initialized to every channel's default.
    #[must_use]
    pub fn default_inputs(&self) -> ChannelInputs {
        ChannelInputs {
            values: self.channels.iter().map(|c| c.default).collect(),
        }
    }

    /// Evaluate raw inputs to channel outputs.
    ///
    /// Each input is clamped to its channel's range; a channel whose name
    /// also exists in the parent system additionally inherits the parent's
    /// evaluated value (pose-follow for attachments). Pure and
    /// deterministic.
    #[must_use]
    pub fn evaluate(
        &self,
        parent_outputs: Option<&ChannelOutputs>,
        inputs: &ChannelInputs,
    ) -> ChannelOutputs {
        let values = self
            .channels
            .iter()
            .enumerate()
            .map(|(i, channel)| {
                let raw = inputs.get(i).unwrap_or(channel.default);
                let mut value = raw.clamp(channel.min, channel.max);
                if let (Some(parent), Some(outputs)) =
                    (self.parent.as_ref(), parent_outputs)
                {
                    if let Some(pi) = parent.channel_index(&channel.name) {
                        value += outputs.value(pi);
                    }
                }
                value
            })
            .collect();
        ChannelOutputs { values }
    }
}
