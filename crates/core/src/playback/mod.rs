//! Public start/stop surface of the metronome.
//!
//! The controller owns the audio engine (created lazily, closed on drop), the
//! tick source and the beat notifier. Each tick runs the look-ahead loop on
//! the tick thread; tempo and instrument are plain atomics that the loop
//! reads at the moment it needs them.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering},
    Arc, Mutex, PoisonError,
};

use crate::{
    synth::play_click, wake::WakeGuard, AudioEngine, BeatCallback, BeatNotifier, BeatScheduler,
    EngineFactory, EngineState, Instrument, IntervalTicker, MetronomeConfig, NoWakeLock, Result,
    SilentEngine, Tempo, TickFn, TickSource, WakeLock,
};

mod session;

pub use session::PracticeSession;

/// State touched by the tick callback.
struct SchedulingState {
    scheduler: Mutex<BeatScheduler>,
    tempo: AtomicU32,
    instrument: AtomicU8,
    notifier: BeatNotifier,
}

impl SchedulingState {
    fn tempo(&self) -> Tempo {
        Tempo::clamped(self.tempo.load(Ordering::Relaxed) as i64)
    }

    fn instrument(&self) -> Instrument {
        Instrument::from_bits(self.instrument.load(Ordering::Relaxed))
    }

    fn on_tick(&self, engine: &dyn AudioEngine) {
        let mut scheduler = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner);
        scheduler.on_tick(
            engine,
            || self.tempo(),
            |beat| {
                play_click(engine, self.instrument(), beat.time, beat.accent);
                self.notifier.arm(beat.notify_delay, beat.index);
                tracing::trace!(index = beat.index, time = beat.time, "beat scheduled");
            },
        );
    }
}

pub struct PlaybackController {
    factory: EngineFactory,
    engine: Option<Arc<dyn AudioEngine>>,
    ticker: Box<dyn TickSource>,
    state: Arc<SchedulingState>,
    playing: Arc<AtomicBool>,
    wake: WakeGuard,
}

impl PlaybackController {
    /// Builds a stopped controller. `factory` runs on the first `start`.
    ///
    /// Fails with [`crate::MetronomeError::InvalidConfig`] when `config` does not
    /// validate.
    pub fn new(config: &MetronomeConfig, factory: EngineFactory) -> Result<Self> {
        config.validate()?;
        let state = SchedulingState {
            scheduler: Mutex::new(BeatScheduler::from_config(config)),
            tempo: AtomicU32::new(config.tempo.bpm()),
            instrument: AtomicU8::new(config.instrument.to_bits()),
            notifier: BeatNotifier::spawn()?,
        };

        Ok(Self {
            factory,
            engine: None,
            ticker: Box::new(IntervalTicker::new(config.tick_interval())),
            state: Arc::new(state),
            playing: Arc::new(AtomicBool::new(false)),
            wake: WakeGuard::new(Box::new(NoWakeLock)),
        })
    }

    pub fn with_ticker(mut self, ticker: impl TickSource + 'static) -> Self {
        self.ticker.stop();
        self.ticker = Box::new(ticker);
        self
    }

    pub fn with_wake_lock(mut self, lock: impl WakeLock + 'static) -> Self {
        self.wake = WakeGuard::new(Box::new(lock));
        self
    }

    /// Starts clicking from a fresh accent. Never fails: a missing or
    /// suspended engine degrades to silent beats.
    pub fn start(&mut self) {
        let engine = self.ensure_engine();
        if engine.state() == EngineState::Suspended {
            if let Err(err) = engine.resume() {
                tracing::warn!(%err, "audio engine did not resume; beats stay silent until it does");
            }
        }

        self.state
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset(engine.now());

        let tick: TickFn = {
            let state = Arc::clone(&self.state);
            Box::new(move || state.on_tick(engine.as_ref()))
        };
        if let Err(err) = self.ticker.start(tick) {
            tracing::error!(%err, "tick source failed to start");
            return;
        }

        self.playing.store(true, Ordering::Release);
        self.wake.request();
        tracing::info!(
            tempo = self.tempo().bpm(),
            instrument = %self.instrument(),
            "playback started"
        );
    }

    /// Stops scheduling new beats. Clicks already handed to the engine still
    /// sound; beat notifications that have not fired are cancelled.
    pub fn stop(&mut self) {
        self.playing.store(false, Ordering::Release);
        self.ticker.stop();
        let cancelled = self.state.notifier.cancel_pending();
        self.wake.release();
        tracing::info!(cancelled, "playback stopped");
    }

    pub fn toggle(&mut self) {
        if self.is_playing() {
            self.stop();
        } else {
            self.start();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Shared view of [`PlaybackController::is_playing`] for observers on
    /// other threads.
    pub fn playing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.playing)
    }

    /// Takes effect from the next scheduled beat.
    pub fn set_instrument(&self, instrument: Instrument) {
        self.state
            .instrument
            .store(instrument.to_bits(), Ordering::Relaxed);
    }

    pub fn instrument(&self) -> Instrument {
        self.state.instrument()
    }

    /// Takes effect from the next unscheduled beat; no restart needed.
    pub fn set_tempo(&self, tempo: Tempo) {
        self.state.tempo.store(tempo.bpm(), Ordering::Relaxed);
    }

    pub fn tempo(&self) -> Tempo {
        self.state.tempo()
    }

    /// Registers the single beat observer, replacing any previous one.
    pub fn set_on_beat(&self, on_beat: impl Fn(usize) + Send + Sync + 'static) {
        let callback: BeatCallback = Arc::new(on_beat);
        self.state.notifier.set_observer(Some(callback));
    }

    pub fn clear_on_beat(&self) {
        self.state.notifier.set_observer(None);
    }

    /// Current audio-clock time, once an engine exists.
    pub fn audio_time(&self) -> Option<f64> {
        self.engine.as_ref().map(|engine| engine.now())
    }

    /// Position of the next unscheduled beat on the audio clock.
    pub fn next_beat_time(&self) -> f64 {
        self.state
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_beat_time()
    }

    /// The host dropped the wake lock on its own, e.g. while hidden.
    pub fn on_wake_lock_released(&mut self) {
        self.wake.forget();
    }

    /// The host became visible again; re-request the wake lock if playing.
    pub fn on_visibility_restored(&mut self) {
        if self.is_playing() && !self.wake.is_held() {
            self.wake.request();
        }
    }

    /// Stops playback and releases the audio engine. The next `start`
    /// creates a new one.
    pub fn dispose(&mut self) {
        if self.is_playing() {
            self.stop();
        }
        if let Some(engine) = self.engine.take() {
            if let Err(err) = engine.close() {
                tracing::warn!(%err, "failed to close audio engine");
            }
        }
    }

    fn ensure_engine(&mut self) -> Arc<dyn AudioEngine> {
        if let Some(engine) = &self.engine {
            return Arc::clone(engine);
        }

        let engine = match (self.factory)() {
            Ok(engine) => engine,
            Err(err) => {
                tracing::warn!(%err, "audio engine unavailable; continuing without sound");
                Arc::new(SilentEngine::new(err.to_string())) as Arc<dyn AudioEngine>
            }
        };
        self.engine = Some(Arc::clone(&engine));
        engine
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("playing", &self.is_playing())
            .field("tempo", &self.tempo())
            .field("instrument", &self.instrument())
            .field("has_engine", &self.engine.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, time::Duration};

    use super::*;
    use crate::{ManualTickHandle, ManualTicker, MetronomeError, OfflineEngine};

    fn controller_with(engine: Arc<OfflineEngine>) -> (PlaybackController, ManualTickHandle) {
        let ticker = ManualTicker::new();
        let handle = ticker.handle();
        let factory: EngineFactory =
            Box::new(move || Ok(Arc::clone(&engine) as Arc<dyn AudioEngine>));
        let controller = PlaybackController::new(&MetronomeConfig::default(), factory)
            .unwrap()
            .with_ticker(ticker);
        (controller, handle)
    }

    #[test]
    fn toggle_flips_playing_state() {
        let engine = Arc::new(OfflineEngine::new(48_000));
        let (mut controller, handle) = controller_with(engine);

        controller.toggle();
        assert!(controller.is_playing());
        assert!(handle.fire());

        controller.toggle();
        assert!(!controller.is_playing());
        assert!(!handle.fire());
    }

    #[test]
    fn start_resumes_and_reanchors_the_engine() {
        let engine = Arc::new(OfflineEngine::new(48_000));
        let (mut controller, handle) = controller_with(Arc::clone(&engine));

        controller.start();
        assert_eq!(engine.state(), EngineState::Running);
        handle.fire();
        assert_eq!(engine.scheduled().len(), 1);

        engine.advance_to(3.0).unwrap();
        controller.stop();
        controller.start();
        assert!((controller.next_beat_time() - 3.05).abs() < 1e-9);
    }

    #[test]
    fn instrument_changes_apply_to_next_beat() {
        let engine = Arc::new(OfflineEngine::new(48_000));
        let (mut controller, handle) = controller_with(Arc::clone(&engine));

        controller.start();
        handle.fire();
        controller.set_instrument(Instrument::Drum);
        engine.advance_to(0.5).unwrap();
        handle.fire();

        let pitches: Vec<f32> = engine.scheduled().iter().map(|voice| voice.pitch()).collect();
        assert_eq!(pitches, vec![1000.0, 100.0]);
    }

    #[test]
    fn missing_engine_degrades_to_silent_beats() {
        let ticker = ManualTicker::new();
        let handle = ticker.handle();
        let factory: EngineFactory =
            Box::new(|| Err(MetronomeError::EngineUnavailable("no audio".into())));
        let mut controller = PlaybackController::new(&MetronomeConfig::default(), factory)
            .unwrap()
            .with_ticker(ticker);

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        controller.set_on_beat(move |beat| {
            let _ = tx.lock().unwrap().send(beat);
        });

        controller.start();
        assert!(controller.is_playing());
        handle.fire();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 0);
    }

    #[test]
    fn rejects_unbounded_look_ahead() {
        let factory: EngineFactory =
            Box::new(|| Ok(Arc::new(OfflineEngine::new(48_000)) as Arc<dyn AudioEngine>));
        let config = MetronomeConfig {
            look_ahead_secs: f64::INFINITY,
            ..MetronomeConfig::default()
        };

        let err = PlaybackController::new(&config, factory).unwrap_err();
        assert!(matches!(err, MetronomeError::InvalidConfig(_)));
    }

    #[test]
    fn stop_cancels_beats_not_yet_audible() {
        let engine = Arc::new(OfflineEngine::new(48_000));
        let (mut controller, handle) = controller_with(engine);

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        controller.set_on_beat(move |beat| {
            let _ = tx.lock().unwrap().send(beat);
        });

        // The first beat sits 50 ms ahead of the audio clock.
        controller.start();
        handle.fire();
        controller.stop();

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[derive(Clone, Default)]
    struct RecordingLock {
        calls: Arc<Mutex<Vec<&'static str>>>,
        deny: bool,
    }

    impl RecordingLock {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl WakeLock for RecordingLock {
        fn acquire(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("acquire");
            if self.deny {
                return Err(MetronomeError::WakeLock("not allowed".into()));
            }
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("release");
            Ok(())
        }
    }

    #[test]
    fn wake_lock_follows_playback() {
        let engine = Arc::new(OfflineEngine::new(48_000));
        let (controller, _handle) = controller_with(engine);
        let lock = RecordingLock::default();
        let mut controller = controller.with_wake_lock(lock.clone());

        controller.start();
        assert_eq!(lock.calls(), vec!["acquire"]);

        // Still held, so becoming visible asks for nothing.
        controller.on_visibility_restored();
        assert_eq!(lock.calls(), vec!["acquire"]);

        controller.on_wake_lock_released();
        controller.on_visibility_restored();
        assert_eq!(lock.calls(), vec!["acquire", "acquire"]);

        controller.stop();
        assert_eq!(lock.calls(), vec!["acquire", "acquire", "release"]);

        controller.on_visibility_restored();
        assert_eq!(lock.calls().len(), 3);
    }

    #[test]
    fn denied_wake_lock_does_not_stop_playback() {
        let engine = Arc::new(OfflineEngine::new(48_000));
        let (controller, handle) = controller_with(engine);
        let lock = RecordingLock {
            deny: true,
            ..RecordingLock::default()
        };
        let mut controller = controller.with_wake_lock(lock.clone());

        controller.start();
        assert!(controller.is_playing());
        assert!(handle.fire());

        controller.on_visibility_restored();
        assert_eq!(lock.calls(), vec!["acquire", "acquire"]);

        controller.stop();
        assert_eq!(lock.calls(), vec!["acquire", "acquire"]);
    }

    #[test]
    fn locked_engine_does_not_block_start() {
        let engine = Arc::new(OfflineEngine::locked(48_000));
        let (mut controller, _handle) = controller_with(Arc::clone(&engine));

        controller.start();
        assert!(controller.is_playing());
        assert_eq!(engine.state(), EngineState::Suspended);
    }

    #[test]
    fn dispose_closes_the_engine() {
        let engine = Arc::new(OfflineEngine::new(48_000));
        let (mut controller, _handle) = controller_with(Arc::clone(&engine));

        controller.start();
        controller.dispose();
        assert!(!controller.is_playing());
        assert_eq!(engine.state(), EngineState::Closed);
        assert!(controller.audio_time().is_none());
    }
}
