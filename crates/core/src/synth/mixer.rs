use std::f64::consts::TAU;

use super::ClickVoice;

/// Upper bound on simultaneously sounding clicks; the oldest is dropped beyond it.
pub const DEFAULT_VOICE_CAPACITY: usize = 32;
/// Frames rendered per pass by [`VoiceMixer::render_interleaved`].
pub const RENDER_CHUNK_FRAMES: usize = 512;

#[derive(Debug, Clone)]
struct ActiveVoice {
    voice: ClickVoice,
    phase: f64,
}

/// Renders scheduled clicks into mono sample blocks.
///
/// The mixer never allocates after construction, so it can live inside a
/// realtime audio callback.
#[derive(Debug, Clone)]
pub struct VoiceMixer {
    sample_rate: u32,
    voices: Vec<ActiveVoice>,
    capacity: usize,
}

impl VoiceMixer {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_capacity(sample_rate, DEFAULT_VOICE_CAPACITY)
    }

    pub fn with_capacity(sample_rate: u32, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sample_rate: sample_rate.max(1),
            voices: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn add(&mut self, voice: ClickVoice) {
        if self.voices.len() >= self.capacity {
            self.voices.remove(0);
        }
        self.voices.push(ActiveVoice { voice, phase: 0.0 });
    }

    /// Overwrites `out` with the frames starting at `start_frame` on the
    /// audio clock and retires voices that have finished.
    pub fn render(&mut self, start_frame: u64, out: &mut [f32]) {
        out.fill(0.0);
        let sample_rate = self.sample_rate as f64;

        for active in &mut self.voices {
            let voice = active.voice;
            for (offset, sample) in out.iter_mut().enumerate() {
                let time = (start_frame + offset as u64) as f64 / sample_rate;
                let elapsed = time - voice.start;
                if elapsed < 0.0 || elapsed >= voice.duration {
                    continue;
                }

                let progress = elapsed / voice.duration;
                let frequency = voice.frequency.value_at(progress) as f64;
                *sample += active.phase.sin() as f32 * voice.gain.value_at(progress);
                active.phase = (active.phase + TAU * frequency / sample_rate) % TAU;
            }
        }

        let block_end = (start_frame + out.len() as u64) as f64 / sample_rate;
        self.voices.retain(|active| active.voice.end() > block_end);

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    /// Renders into an interleaved buffer, copying the mono mix to each of
    /// `channels`. Works through `out` in chunks the size of `scratch`, so
    /// any device buffer length is served without allocating. Returns the
    /// number of frames written.
    pub fn render_interleaved(
        &mut self,
        start_frame: u64,
        scratch: &mut [f32],
        out: &mut [f32],
        channels: usize,
    ) -> u64 {
        let channels = channels.max(1);
        if scratch.is_empty() {
            out.fill(0.0);
            return (out.len() / channels) as u64;
        }

        let mut frame = start_frame;
        for chunk in out.chunks_mut(channels * scratch.len()) {
            let frames = chunk.len() / channels;
            let block = &mut scratch[..frames];
            self.render(frame, block);
            for (slot, sample) in chunk.chunks_mut(channels).zip(block.iter()) {
                slot.fill(*sample);
            }
            frame += frames as u64;
        }
        frame - start_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Instrument;

    #[test]
    fn silent_before_and_after_click() {
        let mut mixer = VoiceMixer::new(8_000);
        mixer.add(ClickVoice::for_beat(Instrument::Digital, 0.1, true));

        let mut block = vec![1.0; 800];
        mixer.render(0, &mut block);
        assert!(block.iter().all(|sample| *sample == 0.0));
        assert_eq!(mixer.active_voices(), 1);

        mixer.render(800, &mut block);
        assert!(block[..400].iter().any(|sample| sample.abs() > 0.1));
        assert!(block[410..].iter().all(|sample| *sample == 0.0));
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn output_is_clipped() {
        let mut mixer = VoiceMixer::new(48_000);
        for _ in 0..4 {
            mixer.add(ClickVoice::for_beat(Instrument::Woodblock, 0.0, true));
        }

        let mut block = vec![0.0; 2_048];
        mixer.render(0, &mut block);
        assert!(block.iter().all(|sample| (-1.0..=1.0).contains(sample)));
        assert!(block.iter().any(|sample| sample.abs() > 0.5));
    }

    #[test]
    fn interleaved_render_matches_mono_in_chunks() {
        let voice = ClickVoice::for_beat(Instrument::Woodblock, 0.001, true);

        let mut mono_mixer = VoiceMixer::new(48_000);
        mono_mixer.add(voice);
        let mut mono = vec![0.0; 1_000];
        mono_mixer.render(0, &mut mono);

        let mut mixer = VoiceMixer::new(48_000);
        mixer.add(voice);
        let mut scratch = [0.0; 64];
        let mut stereo = vec![0.0; 2_000];
        let frames = mixer.render_interleaved(0, &mut scratch, &mut stereo, 2);

        assert_eq!(frames, 1_000);
        for (frame, expected) in stereo.chunks(2).zip(&mono) {
            assert_eq!(frame, [*expected, *expected]);
        }
        assert!(mono.iter().any(|sample| sample.abs() > 0.1));
    }

    #[test]
    fn drops_oldest_voice_when_full() {
        let mut mixer = VoiceMixer::with_capacity(48_000, 2);
        for beat in 0..3 {
            mixer.add(ClickVoice::for_beat(Instrument::Drum, beat as f64, false));
        }
        assert_eq!(mixer.active_voices(), 2);
    }
}
