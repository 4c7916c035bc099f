//! Playback state machine.
//!
//! Holds the catalog index and drives the process supervisor and the
//! rendering backend. The surface is recreated exactly when a video item is
//! followed by an image item, because direct-to-framebuffer players can
//! leave pixels behind that an ordinary redraw does not clear.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, MediaKind};
use crate::config::Configuration;
use crate::events::TickSignal;
use crate::render::RenderBackend;
use crate::tasks::supervisor::{ProcessHandle, ProcessSupervisor, SpawnBackend, TerminateOutcome};

#[derive(Debug, Clone, Copy)]
pub struct PlaybackTiming {
    pub min_dwell: Duration,
    pub terminate_timeout: Duration,
    pub blankout: Duration,
}

impl PlaybackTiming {
    pub fn from_config(cfg: &Configuration) -> Self {
        Self {
            min_dwell: cfg.min_dwell,
            terminate_timeout: cfg.terminate_timeout,
            blankout: cfg.blankout,
        }
    }
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self::from_config(&Configuration::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    ShowingImage,
    ShowingVideo,
    Transitioning,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub current_index: usize,
    pub active_process: Option<ProcessHandle>,
    pub last_transition: Instant,
    pub last_kind_was_video: bool,
}

impl PlaybackState {
    fn new(now: Instant) -> Self {
        Self {
            current_index: 0,
            active_process: None,
            last_transition: now,
            last_kind_was_video: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stopped,
}

pub struct PlaybackController<B: SpawnBackend> {
    catalog: Catalog,
    supervisor: ProcessSupervisor<B>,
    timing: PlaybackTiming,
    state: PlaybackState,
    phase: PlaybackPhase,
}

impl<B: SpawnBackend> PlaybackController<B> {
    pub fn new(
        catalog: Catalog,
        supervisor: ProcessSupervisor<B>,
        timing: PlaybackTiming,
        now: Instant,
    ) -> Self {
        Self {
            catalog,
            supervisor,
            timing,
            state: PlaybackState::new(now),
            phase: PlaybackPhase::Transitioning,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn supervisor(&self) -> &ProcessSupervisor<B> {
        &self.supervisor
    }

    /// Show the first item.
    pub fn start<R: RenderBackend>(&mut self, renderer: &mut R, now: Instant) {
        info!(items = self.catalog.len(), "starting playback");
        self.transition_to(0, renderer, now);
    }

    /// Apply one tick's unified signal, then look for a finished video when
    /// nothing else moved the show this tick.
    pub fn on_tick<R: RenderBackend>(
        &mut self,
        signal: TickSignal,
        renderer: &mut R,
        now: Instant,
    ) -> TickOutcome {
        if self.phase == PlaybackPhase::Stopped {
            return TickOutcome::Stopped;
        }
        match signal {
            TickSignal::Shutdown => {
                self.shutdown();
                return TickOutcome::Stopped;
            }
            TickSignal::Advance => self.advance(renderer, now),
            TickSignal::Idle => {
                if self.video_completed(now) {
                    info!(index = self.state.current_index, "video finished; auto-advancing");
                    self.advance(renderer, now);
                }
            }
        }
        TickOutcome::Continue
    }

    pub fn advance<R: RenderBackend>(&mut self, renderer: &mut R, now: Instant) {
        let next = self.catalog.next_index(self.state.current_index);
        self.transition_to(next, renderer, now);
    }

    /// Completion of the active player, held back until the dwell window has
    /// elapsed so a player that dies at once does not spin the catalog.
    fn video_completed(&mut self, now: Instant) -> bool {
        let Some(handle) = self.state.active_process else {
            return false;
        };
        if !self.supervisor.is_finished(handle) {
            return false;
        }
        let since = now.saturating_duration_since(self.state.last_transition);
        if since < self.timing.min_dwell {
            debug!(since_ms = since.as_millis() as u64, "video finished early; holding until dwell elapses");
            return false;
        }
        true
    }

    pub fn transition_to<R: RenderBackend>(&mut self, index: usize, renderer: &mut R, now: Instant) {
        self.phase = PlaybackPhase::Transitioning;

        if let Some(handle) = self.state.active_process.take() {
            match self.supervisor.terminate(handle, self.timing.terminate_timeout) {
                TerminateOutcome::Abandoned => {
                    warn!("previous video player abandoned after timeout")
                }
                outcome => debug!(?outcome, "previous video player retired"),
            }
            self.state.last_kind_was_video = true;
        }

        let item = self.catalog.get(index).clone();
        info!(index, path = %item.path.display(), kind = ?item.kind, "showing item");

        match item.kind {
            MediaKind::Image => {
                if self.state.last_kind_was_video {
                    debug!("resetting surface after video");
                    if let Err(err) = renderer.blank(self.timing.blankout) {
                        warn!(error = %err, "blankout before surface reset failed");
                    }
                    if let Err(err) = renderer.reset_surface() {
                        warn!(error = %err, "surface reset failed");
                    }
                }
                if let Err(err) = renderer.draw_image(&item.path) {
                    warn!(path = %item.path.display(), error = %err, "image could not be shown; presenting error frame");
                    if let Err(err) = renderer.present_error_frame() {
                        warn!(error = %err, "error frame could not be presented");
                    }
                }
                self.state.last_kind_was_video = false;
                self.phase = PlaybackPhase::ShowingImage;
            }
            MediaKind::Video => {
                match self.supervisor.launch(&item.path) {
                    Ok(handle) => self.state.active_process = Some(handle),
                    Err(err) => {
                        warn!(path = %item.path.display(), error = %err, "video could not be played; showing black");
                        if let Err(err) = renderer.blank(self.timing.blankout) {
                            warn!(error = %err, "fallback frame could not be presented");
                        }
                    }
                }
                self.state.last_kind_was_video = true;
                self.phase = PlaybackPhase::ShowingVideo;
            }
        }

        self.state.last_transition = now;
        self.state.current_index = index;
    }

    /// Retire any player without waiting and stop for good.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.state.active_process.take() {
            self.supervisor.shutdown(handle);
        }
        self.phase = PlaybackPhase::Stopped;
        info!("playback stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MediaItem;
    use crate::error::RenderError;
    use crate::tasks::supervisor::{PlayerCommand, ProcessStatus, SupervisorOptions};
    use std::io;
    use std::path::{Path, PathBuf};

    #[derive(Default)]
    struct NoPlayers;

    impl SpawnBackend for NoPlayers {
        type Child = ();

        fn resolve_player_command(&self, _path: &Path) -> Option<PlayerCommand> {
            None
        }
        fn spawn(&mut self, _command: &PlayerCommand) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
        fn poll(&mut self, _child: &mut ()) -> ProcessStatus {
            ProcessStatus::Exited(None)
        }
        fn signal_terminate(&mut self, _child: &mut ()) {}
        fn force_kill(&mut self, _child: &mut ()) {}
    }

    #[derive(Default)]
    struct Recorder {
        draws: Vec<PathBuf>,
        resets: usize,
        blanks: usize,
    }

    impl RenderBackend for Recorder {
        fn reset_surface(&mut self) -> Result<(), RenderError> {
            self.resets += 1;
            Ok(())
        }
        fn draw_image(&mut self, path: &Path) -> Result<(), RenderError> {
            self.draws.push(path.to_path_buf());
            Ok(())
        }
        fn blank(&mut self, _hold: Duration) -> Result<(), RenderError> {
            self.blanks += 1;
            Ok(())
        }
        fn present_error_frame(&mut self) -> Result<(), RenderError> {
            Ok(())
        }
    }

    fn controller(items: Vec<MediaItem>, now: Instant) -> PlaybackController<NoPlayers> {
        PlaybackController::new(
            Catalog::new(items).unwrap(),
            ProcessSupervisor::new(NoPlayers, SupervisorOptions::default()),
            PlaybackTiming::default(),
            now,
        )
    }

    #[test]
    fn index_after_k_advances_is_k_mod_n() {
        for n in 1..=4 {
            let items = (0..n).map(|i| MediaItem::image(format!("{i}.png"))).collect();
            let t0 = Instant::now();
            let mut ctl = controller(items, t0);
            let mut r = Recorder::default();
            ctl.start(&mut r, t0);
            for k in 1..=9 {
                ctl.advance(&mut r, t0 + Duration::from_secs(k as u64 * 2));
                assert_eq!(ctl.state().current_index, k % n);
            }
        }
    }

    #[test]
    fn spawn_failure_still_counts_as_video_for_reset() {
        let t0 = Instant::now();
        let mut ctl = controller(
            vec![MediaItem::video("clip.mp4"), MediaItem::image("a.png")],
            t0,
        );
        let mut r = Recorder::default();
        ctl.start(&mut r, t0);
        assert_eq!(ctl.phase(), PlaybackPhase::ShowingVideo);
        assert!(ctl.state().last_kind_was_video);
        assert!(ctl.state().active_process.is_none());
        assert_eq!(r.blanks, 1, "black fallback frame");

        ctl.advance(&mut r, t0 + Duration::from_secs(2));
        assert_eq!(r.resets, 1);
        assert_eq!(r.draws, vec![PathBuf::from("a.png")]);
        assert!(!ctl.state().last_kind_was_video);
    }

    #[test]
    fn ticks_after_shutdown_stay_stopped() {
        let t0 = Instant::now();
        let mut ctl = controller(vec![MediaItem::image("a.png")], t0);
        let mut r = Recorder::default();
        ctl.start(&mut r, t0);
        assert_eq!(
            ctl.on_tick(TickSignal::Shutdown, &mut r, t0),
            TickOutcome::Stopped
        );
        assert_eq!(
            ctl.on_tick(TickSignal::Advance, &mut r, t0 + Duration::from_secs(5)),
            TickOutcome::Stopped
        );
        assert_eq!(r.draws.len(), 1);
    }
}
