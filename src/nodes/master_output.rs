// Master output node

use crate::graph::{PortConfig, ProcessContext, Processor};

/// The node the host reads from.
///
/// Does nothing itself: after a block, its summed audio input holds the
/// rendered output. Select it with `set_master_output`.
pub struct MasterOutput {
    channels: usize,
}

impl MasterOutput {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
        }
    }
}

impl Default for MasterOutput {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Processor for MasterOutput {
    fn name(&self) -> &str {
        "MasterOutput"
    }

    fn ports(&self) -> Vec<PortConfig> {
        vec![PortConfig::audio_input(self.channels)]
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>, _num_samples: usize) {}
}
