use crate::{Light, MAX_CHANNELS};

/// Result of one greedy channel pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelAssignment {
    /// Per input light, in input order.
    pub channels: Vec<Option<u8>>,
    /// Indices of lights that found no free channel.
    pub overflowed: Vec<usize>,
}

impl ChannelAssignment {
    /// Writes the channels back into the light records.
    pub fn apply(&self, lights: &mut [Light]) {
        for (light, ch) in lights.iter_mut().zip(self.channels.iter()) {
            light.channel = *ch;
        }
    }

    pub fn assigned_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_some()).count()
    }
}

/// Greedy graph coloring over light influence spheres.
///
/// Lights are visited in input order; each takes the lowest channel not used by
/// an already-assigned overlapping light. A light with all channels taken is left
/// unassigned and reported, and the pass continues. The result depends on the
/// input order.
pub fn assign_channels(lights: &[Light]) -> ChannelAssignment {
    let mut channels: Vec<Option<u8>> = vec![None; lights.len()];
    let mut overflowed = Vec::new();

    for (i, light) in lights.iter().enumerate() {
        let mut taken: u32 = 0;
        for (j, other) in lights.iter().enumerate() {
            if j == i {
                continue;
            }
            let Some(ch) = channels[j] else { continue };
            if light.overlaps(other) {
                taken |= 1u32 << ch;
            }
        }
        let free = (!taken).trailing_zeros() as usize;
        if free < MAX_CHANNELS {
            channels[i] = Some(free as u8);
        } else {
            log::warn!(
                target: "channels",
                "light {} at ({:.2}, {:.2}, {:.2}) r={:.2} overlaps {} assigned lights; no shadow channel left",
                i,
                light.position.x,
                light.position.y,
                light.position.z,
                light.radius,
                MAX_CHANNELS
            );
            overflowed.push(i);
        }
    }

    log::debug!(
        target: "channels",
        "assigned {} of {} lights ({} overflowed)",
        lights.len() - overflowed.len(),
        lights.len(),
        overflowed.len()
    );
    ChannelAssignment {
        channels,
        overflowed,
    }
}
