// src/audio_buffer.rs

/// Owned planar sample buffer: `channels` lanes of `frames` samples.
///
/// Allocated once at plan compile time and reused every block.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: usize,
    frames: usize,
    data: Vec<f32>, // planar: all of ch0, then all of ch1, ...
}

impl SampleBuffer {
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels,
            frames,
            data: vec![0.0; channels * frames],
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Capacity per channel, in samples.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    #[inline]
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.frames;
        &self.data[start..start + self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.frames;
        &mut self.data[start..start + self.frames]
    }

    /// Add `frames` samples of `other` into this buffer, channel by channel.
    ///
    /// Channels missing on either side are skipped.
    #[inline]
    pub fn add_from(&mut self, other: &SampleBuffer, frames: usize) {
        let frames = frames.min(self.frames).min(other.frames);
        for ch in 0..self.channels.min(other.channels) {
            let src = &other.channel(ch)[..frames];
            for (d, s) in self.channel_mut(ch)[..frames].iter_mut().zip(src) {
                *d += *s;
            }
        }
    }

    /// Copy `frames` samples of `other` over this buffer.
    #[inline]
    pub fn copy_from(&mut self, other: &SampleBuffer, frames: usize) {
        let frames = frames.min(self.frames).min(other.frames);
        for ch in 0..self.channels.min(other.channels) {
            self.channel_mut(ch)[..frames].copy_from_slice(&other.channel(ch)[..frames]);
        }
    }

    /// Largest absolute sample in the first `frames` samples of any channel.
    pub fn peak(&self, frames: usize) -> f32 {
        let frames = frames.min(self.frames);
        (0..self.channels)
            .flat_map(|ch| self.channel(ch)[..frames].iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}
