use crate::{stopwatch::TimeSource, MonotonicTime, PlaybackController, SessionTimer};

/// Metronome playback paired with the practice stopwatch.
///
/// The stopwatch runs exactly while the metronome plays and keeps its total
/// across pauses until [`PracticeSession::reset_timer`].
#[derive(Debug)]
pub struct PracticeSession<S = MonotonicTime> {
    playback: PlaybackController,
    timer: SessionTimer<S>,
}

impl PracticeSession<MonotonicTime> {
    pub fn new(playback: PlaybackController) -> Self {
        Self::with_timer(playback, SessionTimer::new())
    }
}

impl<S: TimeSource> PracticeSession<S> {
    pub fn with_timer(playback: PlaybackController, timer: SessionTimer<S>) -> Self {
        Self { playback, timer }
    }

    pub fn start(&mut self) {
        self.playback.start();
        if self.playback.is_playing() {
            self.timer.start();
        }
    }

    pub fn stop(&mut self) {
        self.playback.stop();
        self.timer.stop();
    }

    pub fn toggle(&mut self) {
        if self.playback.is_playing() {
            self.stop();
        } else {
            self.start();
        }
    }

    pub fn reset_timer(&mut self) {
        self.timer.reset();
    }

    /// Repaint hook; see [`SessionTimer::on_frame`].
    pub fn on_frame(&mut self) -> bool {
        self.timer.on_frame()
    }

    pub fn formatted_time(&self) -> String {
        self.timer.formatted_time()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackController {
        &mut self.playback
    }

    pub fn timer(&self) -> &SessionTimer<S> {
        &self.timer
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        AudioEngine, EngineFactory, ManualTicker, ManualTime, MetronomeConfig, OfflineEngine,
    };

    fn session() -> (ManualTime, PracticeSession<ManualTime>) {
        let engine = Arc::new(OfflineEngine::new(48_000));
        let factory: EngineFactory =
            Box::new(move || Ok(Arc::clone(&engine) as Arc<dyn AudioEngine>));
        let playback = PlaybackController::new(&MetronomeConfig::default(), factory)
            .unwrap()
            .with_ticker(ManualTicker::new());
        let time = ManualTime::default();
        let timer = SessionTimer::with_source(time.clone());
        (time, PracticeSession::with_timer(playback, timer))
    }

    #[test]
    fn timer_follows_playback() {
        let (time, mut session) = session();

        session.toggle();
        assert!(session.playback().is_playing());
        assert!(session.is_running());

        time.advance(4_200.0);
        assert!(session.on_frame());
        assert_eq!(session.formatted_time(), "00:04.20");

        session.toggle();
        assert!(!session.playback().is_playing());
        assert!(!session.is_running());

        time.advance(1_000.0);
        session.toggle();
        time.advance(800.0);
        session.stop();
        assert_eq!(session.formatted_time(), "00:05.00");

        session.reset_timer();
        assert_eq!(session.formatted_time(), "00:00.00");
    }
}
