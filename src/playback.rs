/// The playback module owns the queue and playback-order state machine.
/// Two ordered sequences are kept strictly apart: the View (whatever the
/// user is browsing) and the Playback Order (what transport controls
/// advance through). They converge only in `play_from_view`, which
/// snapshots the View; browsing afterwards never disturbs an in-flight
/// order. The user-curated Queue is consulted before the order on every
/// advance. All mutating methods take `&mut self`; the `Player` is the
/// single logical owner of this state and callers serialize access to it.
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};

use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::cache::Cache;
use crate::config::Config;
use crate::errors::Result;
use crate::index::LibraryIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing loaded.
    Idle,
    Playing,
    Paused,
    /// The playback order is exhausted; no more auto-advance.
    StoppedAtEnd,
}

/// The narrow contract to the external playback engine. Decoding and
/// output live entirely behind it.
pub trait AudioBackend: Send {
    fn play(&mut self, path: &Path);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    /// Absolute position in seconds.
    fn seek(&mut self, seconds: f64);
    /// 0.0..=1.0.
    fn set_volume(&mut self, volume: f64);
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TrackChanged(PathBuf),
    PlaybackStateChanged(PlaybackState),
    /// Seconds into the current track, from seeks and the external
    /// engine's clock reports.
    PositionChanged(f64),
    QueueChanged,
}

/// Which listing the View currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewSource {
    #[default]
    Library,
    Playlist(String),
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub path: PathBuf,
    /// Monotone enqueue ordinal, for stable identification of duplicates.
    pub ordinal: u64,
}

#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub history_limit: usize,
    /// When set, previous at the start of history restarts the current
    /// track at position zero instead of doing nothing.
    pub restart_on_previous: bool,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        PlayerOptions {
            history_limit: 100,
            restart_on_previous: false,
        }
    }
}

impl PlayerOptions {
    pub fn from_config(config: &Config) -> PlayerOptions {
        PlayerOptions {
            history_limit: config.history_limit,
            restart_on_previous: config.restart_on_previous,
        }
    }
}

pub struct Player {
    backend: Box<dyn AudioBackend>,
    options: PlayerOptions,
    state: PlaybackState,
    current: Option<PathBuf>,

    view: Vec<PathBuf>,
    view_source: ViewSource,

    /// Frozen at `play_from_view`; never retroactively altered by the view.
    order: Vec<PathBuf>,
    /// Position within `order`, in original (unshuffled) indices.
    cursor: Option<usize>,
    /// Derived permutation of order indices; the order itself is never
    /// reordered in place, so disabling shuffle restores it exactly.
    shuffle: Option<Vec<usize>>,
    loop_enabled: bool,

    /// Seconds into the current track, per the last seek or engine report.
    position: f64,

    queue: VecDeque<QueueEntry>,
    next_ordinal: u64,

    /// Append-only log of actually-played tracks (queue-served included),
    /// bounded to `options.history_limit`.
    history: Vec<PathBuf>,
    /// Some(i) while replaying history; None when live at its end.
    history_pos: Option<usize>,

    events: Vec<Sender<PlayerEvent>>,
}

impl Player {
    pub fn new(backend: Box<dyn AudioBackend>, options: PlayerOptions) -> Player {
        Player {
            backend,
            options,
            state: PlaybackState::Idle,
            current: None,
            view: Vec::new(),
            view_source: ViewSource::Library,
            order: Vec::new(),
            cursor: None,
            shuffle: None,
            loop_enabled: false,
            position: 0.0,
            queue: VecDeque::new(),
            next_ordinal: 0,
            history: Vec::new(),
            history_pos: None,
            events: Vec::new(),
        }
    }

    /// Register a state-change consumer. Dead receivers are dropped on the
    /// next emit.
    pub fn subscribe(&mut self) -> Receiver<PlayerEvent> {
        let (tx, rx) = channel();
        self.events.push(tx);
        rx
    }

    fn emit(&mut self, event: PlayerEvent) {
        self.events.retain(|s| s.send(event.clone()).is_ok());
    }

    // --- view ---

    pub fn set_view(&mut self, source: ViewSource, paths: Vec<PathBuf>) {
        self.view_source = source;
        self.view = paths;
    }

    pub fn view(&self) -> &[PathBuf] {
        &self.view
    }

    pub fn view_source(&self) -> &ViewSource {
        &self.view_source
    }

    /// A deleted playlist must not stay the active view; fall back to the
    /// library listing.
    pub fn handle_playlist_deleted(&mut self, playlist_id: &str, library_paths: Vec<PathBuf>) {
        if self.view_source == ViewSource::Playlist(playlist_id.to_string()) {
            self.set_view(ViewSource::Library, library_paths);
        }
    }

    /// Commit the current View to a fresh Playback Order and start at
    /// `start`. Returns false (and changes nothing) when the index is out
    /// of range.
    pub fn play_from_view(&mut self, start: usize) -> bool {
        if start >= self.view.len() {
            return false;
        }
        self.order = self.view.clone();
        self.cursor = Some(start);
        if self.shuffle.is_some() {
            self.regenerate_shuffle();
        }
        info!("playback order committed: {} tracks, starting at {start}", self.order.len());
        let path = self.order[start].clone();
        self.start_track(path);
        true
    }

    // --- transport ---

    pub fn play(&mut self) {
        match self.state {
            PlaybackState::Paused => {
                self.backend.resume();
                self.set_state(PlaybackState::Playing);
            }
            PlaybackState::Idle | PlaybackState::StoppedAtEnd => {
                if self.order.is_empty() {
                    // No order to resume, but queued tracks still play:
                    // the queue always wins the advance resolution.
                    if let Some(entry) = self.queue.pop_front() {
                        self.emit(PlayerEvent::QueueChanged);
                        self.start_track(entry.path);
                    }
                    return;
                }
                let start = self.cursor.unwrap_or(0).min(self.order.len() - 1);
                self.cursor = Some(start);
                let path = self.order[start].clone();
                self.start_track(path);
            }
            PlaybackState::Playing => {}
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.backend.pause();
            self.set_state(PlaybackState::Paused);
        }
    }

    pub fn toggle_pause(&mut self) {
        match self.state {
            PlaybackState::Playing => self.pause(),
            _ => self.play(),
        }
    }

    pub fn stop(&mut self) {
        self.backend.stop();
        self.current = None;
        self.position = 0.0;
        self.set_state(PlaybackState::Idle);
    }

    pub fn next(&mut self) {
        self.advance();
    }

    /// Signal from the external playback engine that the current track
    /// finished.
    pub fn on_track_finished(&mut self) {
        self.advance();
    }

    /// Move backward through the history of actually-played tracks, not
    /// through playback-order positions.
    pub fn previous(&mut self) {
        let replay_at = match self.history_pos {
            None if self.history.len() >= 2 => Some(self.history.len() - 2),
            Some(pos) if pos > 0 => Some(pos - 1),
            _ => None,
        };
        match replay_at {
            Some(pos) => {
                self.history_pos = Some(pos);
                let path = self.history[pos].clone();
                self.replay(path);
            }
            None => {
                // At the start of history: no-op, or restart the current
                // track when configured to.
                if self.options.restart_on_previous {
                    if let Some(current) = &self.current {
                        debug!("previous at start of history: restarting {}", current.display());
                        self.backend.seek(0.0);
                        self.position = 0.0;
                        self.set_state(PlaybackState::Playing);
                    }
                }
            }
        }
    }

    pub fn seek(&mut self, seconds: f64) {
        self.backend.seek(seconds);
        self.position = seconds;
        self.emit(PlayerEvent::PositionChanged(seconds));
    }

    /// Position report from the external engine's playback clock.
    pub fn on_position(&mut self, seconds: f64) {
        self.position = seconds;
        self.emit(PlayerEvent::PositionChanged(seconds));
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.backend.set_volume(volume.clamp(0.0, 1.0));
    }

    // --- queue ---

    /// "Play Next": always inserts at the front, ahead of anything
    /// previously queued.
    pub fn play_next(&mut self, path: PathBuf) {
        let entry = QueueEntry {
            path,
            ordinal: self.take_ordinal(),
        };
        self.queue.push_front(entry);
        self.emit(PlayerEvent::QueueChanged);
    }

    /// "Add to Queue": always appends at the back.
    pub fn add_to_queue(&mut self, path: PathBuf) {
        let entry = QueueEntry {
            path,
            ordinal: self.take_ordinal(),
        };
        self.queue.push_back(entry);
        self.emit(PlayerEvent::QueueChanged);
    }

    /// Remove the first entry matching `path`, leaving the relative order
    /// of the rest untouched. Returns whether anything was removed.
    pub fn remove_queued(&mut self, path: &Path) -> bool {
        let Some(pos) = self.queue.iter().position(|e| e.path == *path) else {
            return false;
        };
        self.queue.remove(pos);
        self.emit(PlayerEvent::QueueChanged);
        true
    }

    /// Remove the track's first queue entry, or enqueue it at the back if
    /// it is not queued.
    pub fn toggle_queued(&mut self, path: PathBuf) {
        if !self.remove_queued(&path) {
            self.add_to_queue(path);
        }
    }

    pub fn clear_queue(&mut self) {
        if !self.queue.is_empty() {
            self.queue.clear();
            self.emit(PlayerEvent::QueueChanged);
        }
    }

    pub fn queue(&self) -> &VecDeque<QueueEntry> {
        &self.queue
    }

    pub fn queued_paths(&self) -> Vec<PathBuf> {
        self.queue.iter().map(|e| e.path.clone()).collect()
    }

    pub fn persist_queue(&self, cache: &Cache) -> Result<()> {
        cache.save_queue(&self.queued_paths())
    }

    /// Restore the persisted queue, silently dropping entries whose path
    /// no longer exists in the index.
    pub fn restore_queue(&mut self, cache: &Cache, index: &LibraryIndex) -> Result<()> {
        let paths = cache.load_queue()?;
        let before = paths.len();
        self.queue.clear();
        for path in paths.into_iter().filter(|p| index.contains(p)) {
            let entry = QueueEntry {
                path,
                ordinal: self.take_ordinal(),
            };
            self.queue.push_back(entry);
        }
        if before != self.queue.len() {
            debug!("dropped {} stale queue entries at restore", before - self.queue.len());
        }
        self.emit(PlayerEvent::QueueChanged);
        Ok(())
    }

    fn take_ordinal(&mut self) -> u64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    // --- shuffle / loop ---

    pub fn set_shuffle(&mut self, enabled: bool) {
        if enabled {
            self.regenerate_shuffle();
        } else {
            self.shuffle = None;
        }
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle.is_some()
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    /// Derive a fresh permutation over the order's indices; the current
    /// track is pinned first so advancing continues from it.
    fn regenerate_shuffle(&mut self) {
        let mut perm: Vec<usize> = (0..self.order.len()).collect();
        perm.shuffle(&mut rand::thread_rng());
        if let Some(cursor) = self.cursor {
            if let Some(pos) = perm.iter().position(|&i| i == cursor) {
                perm.remove(pos);
                perm.insert(0, cursor);
            }
        }
        self.shuffle = Some(perm);
    }

    // --- accessors ---

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_track(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn playback_order(&self) -> &[PathBuf] {
        &self.order
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn history(&self) -> &[PathBuf] {
        &self.history
    }

    /// The next `count` tracks as things stand: queued entries first, then
    /// the order ahead of the cursor (through the shuffle permutation when
    /// enabled).
    pub fn upcoming(&self, count: usize) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = self.queue.iter().take(count).map(|e| e.path.clone()).collect();
        if out.len() >= count {
            return out;
        }
        if let Some(cursor) = self.cursor {
            let positions: Vec<usize> = match &self.shuffle {
                Some(perm) => {
                    let at = perm.iter().position(|&i| i == cursor).unwrap_or(0);
                    perm[at + 1..].to_vec()
                }
                None => (cursor + 1..self.order.len()).collect(),
            };
            for i in positions {
                if out.len() >= count {
                    break;
                }
                out.push(self.order[i].clone());
            }
        }
        out
    }

    // --- internals ---

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            self.state = state;
            self.emit(PlayerEvent::PlaybackStateChanged(state));
        }
    }

    /// Start a track and log it to history. Used for explicit starts,
    /// queue pops and live order advances.
    fn start_track(&mut self, path: PathBuf) {
        self.backend.play(&path);
        self.position = 0.0;
        self.current = Some(path.clone());
        self.history.push(path.clone());
        let limit = self.options.history_limit.max(1);
        if self.history.len() > limit {
            self.history.drain(..self.history.len() - limit);
        }
        self.history_pos = None;
        self.set_state(PlaybackState::Playing);
        self.emit(PlayerEvent::TrackChanged(path));
    }

    /// Re-play a track already in history without appending to it.
    fn replay(&mut self, path: PathBuf) {
        self.backend.play(&path);
        self.position = 0.0;
        self.current = Some(path.clone());
        self.set_state(PlaybackState::Playing);
        self.emit(PlayerEvent::TrackChanged(path));
    }

    /// The advance resolution rule: forward through history if we are
    /// replaying it, else the queue's front entry, else one step through
    /// the playback order, else stopped-at-end (or a wrap when looping).
    fn advance(&mut self) {
        if let Some(pos) = self.history_pos {
            if pos + 1 < self.history.len() {
                self.history_pos = Some(pos + 1);
                let path = self.history[pos + 1].clone();
                self.replay(path);
                return;
            }
            self.history_pos = None;
        }

        if let Some(entry) = self.queue.pop_front() {
            self.emit(PlayerEvent::QueueChanged);
            self.start_track(entry.path);
            return;
        }

        if self.order.is_empty() {
            self.backend.stop();
            self.current = None;
            self.set_state(PlaybackState::Idle);
            return;
        }

        let next = match (&self.shuffle, self.cursor) {
            (Some(perm), Some(cursor)) => {
                let at = perm.iter().position(|&i| i == cursor).unwrap_or(0);
                match perm.get(at + 1) {
                    Some(&i) => Some(i),
                    None if self.loop_enabled => perm.first().copied(),
                    None => None,
                }
            }
            (None, Some(cursor)) => {
                if cursor + 1 < self.order.len() {
                    Some(cursor + 1)
                } else if self.loop_enabled {
                    Some(0)
                } else {
                    None
                }
            }
            (_, None) => Some(0),
        };

        match next {
            Some(i) => {
                self.cursor = Some(i);
                let path = self.order[i].clone();
                self.start_track(path);
            }
            None => {
                info!("playback order exhausted");
                self.backend.stop();
                self.current = None;
                self.set_state(PlaybackState::StoppedAtEnd);
            }
        }
    }
}
