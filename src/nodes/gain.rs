// Gain node

use crate::graph::{ParameterConfig, PortConfig, ProcessContext, Processor};

// ═══════════════════════════════════════════════════════════════════
// Gain
// ═══════════════════════════════════════════════════════════════════

/// Multiplies audio by its "gain" control input, per sample.
pub struct GainProcessor {
    channels: usize,
}

impl GainProcessor {
    /// Range of the gain parameter: silence up to +20 dB.
    pub const PARAMETER: ParameterConfig = ParameterConfig {
        default: 1.0,
        min: 0.0,
        max: 10.0,
        smoothing_seconds: 0.01,
    };

    pub fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
        }
    }
}

impl Default for GainProcessor {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Processor for GainProcessor {
    fn name(&self) -> &str {
        "Gain"
    }

    fn ports(&self) -> Vec<PortConfig> {
        vec![
            PortConfig::audio_input(self.channels),
            PortConfig::audio_output(self.channels),
            PortConfig::control_input(Self::PARAMETER),
        ]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>, num_samples: usize) {
        let Some((input, output, gain)) = ctx.audio_io_with_control(0, 0, 0) else {
            return;
        };

        for ch in 0..self.channels {
            let source = &input.channel(ch)[..num_samples];
            let dest = &mut output.channel_mut(ch)[..num_samples];
            for ((out, &s), &g) in dest.iter_mut().zip(source).zip(gain) {
                *out = s * g;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::testing::{render_block, ConstantSource};
    use crate::graph::{compile, Topology};

    #[test]
    fn test_gain_scales_input() {
        let mut topology = Topology::new();
        let src = topology.add_node(Box::new(ConstantSource::new(0.5)));
        let gain = topology.add_node(Box::new(GainProcessor::new(1)));

        let src_out = topology.node(src).unwrap().audio_output(0).unwrap();
        let gain_in = topology.node(gain).unwrap().audio_input(0).unwrap();
        topology.connect(src_out, gain_in).unwrap();

        let gain_param = topology.node(gain).unwrap().control_input(0).unwrap();
        assert_eq!(topology.parameter(gain_param), Ok(1.0));
        topology.set_parameter(gain_param, 3.0).unwrap();

        let config = EngineConfig::default().with_max_block_size(64).with_arena_size(4096);
        let mut plan = compile(&topology, &config).unwrap();
        render_block(&mut plan, 64);

        let output = plan.context(gain).unwrap().audio_output(0).unwrap();
        assert_eq!(output.channel(0)[0], 1.5);

        // Clamped to the top of the range
        topology.set_parameter(gain_param, 50.0).unwrap();
        assert_eq!(topology.parameter(gain_param), Ok(10.0));
    }
}
