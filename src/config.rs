// src/config.rs
//
// Engine-wide configuration.
//
// Everything here is decided once, on the control thread, before the
// engine is created. Queue capacities and pool sizes are fixed for the
// life of the engine because the audio thread can never grow them.

use std::time::Duration;

/// Static configuration for one engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Sample rate of the host audio callback (Hz).
    pub sample_rate: f64,

    /// Largest block the host will ever ask for.
    pub max_block_size: usize,

    /// Channel count of audio ports and of the master output.
    pub num_channels: usize,

    /// Capacity of the plan submission and plan retirement queues.
    pub plan_queue_capacity: usize,

    /// Capacity of the sequence map delivery and retirement queues.
    pub sequence_queue_capacity: usize,

    /// Capacity of the playhead jump queues.
    pub jump_queue_capacity: usize,

    /// Initial number of events each event port can hold before growing.
    pub event_buffer_capacity: usize,

    /// Size of the per-plan event arena, in bytes.
    pub arena_size_bytes: usize,

    /// How often the control thread reclaims retired objects.
    pub reclaim_interval: Duration,

    /// Sequencer resolution.
    pub ticks_per_quarter: i64,

    /// Tempo used until the control thread sets one.
    pub default_bpm: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            max_block_size: 512,
            num_channels: 2,
            plan_queue_capacity: 512,
            sequence_queue_capacity: 512,
            jump_queue_capacity: 64,
            event_buffer_capacity: 128,
            arena_size_bytes: 1 << 20,
            reclaim_interval: Duration::from_millis(500),
            ticks_per_quarter: 96,
            default_bpm: 120.0,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_max_block_size(mut self, frames: usize) -> Self {
        self.max_block_size = frames;
        self
    }

    pub fn with_num_channels(mut self, channels: usize) -> Self {
        self.num_channels = channels;
        self
    }

    pub fn with_plan_queue_capacity(mut self, capacity: usize) -> Self {
        self.plan_queue_capacity = capacity;
        self
    }

    pub fn with_sequence_queue_capacity(mut self, capacity: usize) -> Self {
        self.sequence_queue_capacity = capacity;
        self
    }

    pub fn with_event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }

    pub fn with_arena_size(mut self, bytes: usize) -> Self {
        self.arena_size_bytes = bytes;
        self
    }

    pub fn with_reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim_interval = interval;
        self
    }

    pub fn with_ticks_per_quarter(mut self, ticks: i64) -> Self {
        self.ticks_per_quarter = ticks;
        self
    }

    pub fn with_default_bpm(mut self, bpm: f64) -> Self {
        self.default_bpm = bpm;
        self
    }

    /// Replace values the engine cannot run with.
    ///
    /// Every replaced field is reported with `log::warn!`.
    pub fn validate(mut self) -> Self {
        let defaults = Self::default();

        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            log::warn!(
                "Invalid sample rate {}, using {}",
                self.sample_rate,
                defaults.sample_rate
            );
            self.sample_rate = defaults.sample_rate;
        }

        if self.max_block_size == 0 {
            log::warn!("Max block size of 0, using {}", defaults.max_block_size);
            self.max_block_size = defaults.max_block_size;
        }

        if self.num_channels == 0 {
            log::warn!("Channel count of 0, using {}", defaults.num_channels);
            self.num_channels = defaults.num_channels;
        }

        for (name, value, fallback) in [
            (
                "plan queue",
                &mut self.plan_queue_capacity,
                defaults.plan_queue_capacity,
            ),
            (
                "sequence queue",
                &mut self.sequence_queue_capacity,
                defaults.sequence_queue_capacity,
            ),
            (
                "jump queue",
                &mut self.jump_queue_capacity,
                defaults.jump_queue_capacity,
            ),
            (
                "event buffer",
                &mut self.event_buffer_capacity,
                defaults.event_buffer_capacity,
            ),
        ] {
            if *value == 0 {
                log::warn!("{} capacity of 0, using {}", name, fallback);
                *value = fallback;
            }
        }

        if self.ticks_per_quarter <= 0 {
            log::warn!(
                "Invalid ticks per quarter {}, using {}",
                self.ticks_per_quarter,
                defaults.ticks_per_quarter
            );
            self.ticks_per_quarter = defaults.ticks_per_quarter;
        }

        if !(self.default_bpm.is_finite() && self.default_bpm > 0.0) {
            log::warn!("Invalid tempo {}, using {}", self.default_bpm, defaults.default_bpm);
            self.default_bpm = defaults.default_bpm;
        }

        self
    }
}
