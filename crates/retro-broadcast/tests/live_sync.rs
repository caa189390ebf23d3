// Live-sync controller against a simulated player whose playhead advances
// with a manual clock.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use retro_broadcast::clock::{Clock, ManualClock};
use retro_broadcast::playlist::Playlist;
use retro_broadcast::resolver::Position;
use retro_broadcast::sync::{Correction, DriverError, DriverResult, LiveSync, LiveSyncController, PositionFeed, SyncState, VideoPlayer};
use retro_broadcast::{BroadcastConfig, Epoch, Result, Station};

// ============================================================================
// Test harness
// ============================================================================

fn epoch() -> Epoch {
	Epoch::parse("2024-01-01T00:00:00Z", None).unwrap()
}

#[allow(clippy::cast_possible_truncation)]
fn at(seconds: f64) -> DateTime<Utc> {
	epoch().instant + TimeDelta::milliseconds((seconds * 1000.0).round() as i64)
}

#[derive(Debug, Default)]
struct Playhead {
	index: usize,
	base: f64,
	anchored_ms: i64,
	rate: f64,
	seeks: u32,
	seek_attempts: u32,
	rate_changes: u32,
	video_changes: u32,
	paused: bool,
}

struct SimulatedPlayer {
	clock: ManualClock,
	playhead: Mutex<Playhead>,
	rate_control: bool,
	fail_seeks: bool,
	seek_delay: Option<Duration>,
}

impl SimulatedPlayer {
	fn new(clock: &ManualClock, index: usize, time: f64) -> Self {
		Self {
			clock: clock.clone(),
			playhead: Mutex::new(Playhead {
				index,
				base: time,
				anchored_ms: clock.now().timestamp_millis(),
				rate: 1.0,
				..Playhead::default()
			}),
			rate_control: true,
			fail_seeks: false,
			seek_delay: None,
		}
	}

	fn seek_only(mut self) -> Self {
		self.rate_control = false;
		self
	}

	fn failing_seeks(mut self) -> Self {
		self.fail_seeks = true;
		self
	}

	fn slow_seeks(mut self, delay: Duration) -> Self {
		self.seek_delay = Some(delay);
		self
	}

	fn now_ms(&self) -> i64 {
		self.clock.now().timestamp_millis()
	}

	#[allow(clippy::cast_precision_loss)]
	fn time_of(&self, p: &Playhead) -> f64 {
		p.base + (self.now_ms() - p.anchored_ms) as f64 / 1000.0 * p.rate
	}

	fn place(&self, index: usize, time: f64) {
		let mut p = self.playhead.lock().unwrap();
		p.index = index;
		p.base = time;
		p.anchored_ms = self.now_ms();
	}

	fn rate(&self) -> f64 {
		self.playhead.lock().unwrap().rate
	}

	fn ops(&self) -> (u32, u32, u32) {
		let p = self.playhead.lock().unwrap();
		(p.video_changes, p.seeks, p.rate_changes)
	}

	fn seek_attempts(&self) -> u32 {
		self.playhead.lock().unwrap().seek_attempts
	}

	fn is_paused(&self) -> bool {
		self.playhead.lock().unwrap().paused
	}
}

#[async_trait]
impl VideoPlayer for SimulatedPlayer {
	async fn current_time(&self) -> DriverResult<f64> {
		let p = self.playhead.lock().unwrap();
		Ok(self.time_of(&p))
	}

	async fn current_video_index(&self) -> DriverResult<usize> {
		Ok(self.playhead.lock().unwrap().index)
	}

	async fn seek_to(&self, seconds: f64) -> DriverResult<()> {
		if let Some(delay) = self.seek_delay {
			tokio::time::sleep(delay).await;
		}
		let mut p = self.playhead.lock().unwrap();
		p.seek_attempts += 1;
		if self.fail_seeks {
			return Err(DriverError::Seek("player rejected seek".into()));
		}
		p.base = seconds;
		p.anchored_ms = self.now_ms();
		p.seeks += 1;
		Ok(())
	}

	async fn set_playback_rate(&self, rate: f64) -> DriverResult<()> {
		let mut p = self.playhead.lock().unwrap();
		p.base = self.time_of(&p);
		p.anchored_ms = self.now_ms();
		p.rate = rate;
		p.rate_changes += 1;
		Ok(())
	}

	async fn change_video(&self, index: usize, offset: f64) -> DriverResult<()> {
		let mut p = self.playhead.lock().unwrap();
		p.index = index;
		p.base = offset;
		p.anchored_ms = self.now_ms();
		p.video_changes += 1;
		Ok(())
	}

	async fn pause(&self) -> DriverResult<()> {
		let mut p = self.playhead.lock().unwrap();
		p.base = self.time_of(&p);
		p.anchored_ms = self.now_ms();
		p.paused = true;
		Ok(())
	}

	async fn play(&self) -> DriverResult<()> {
		let mut p = self.playhead.lock().unwrap();
		p.anchored_ms = self.now_ms();
		p.paused = false;
		Ok(())
	}

	fn supports_playback_rate(&self) -> bool {
		self.rate_control
	}
}

struct StationFeed {
	station: Mutex<Station>,
	clock: ManualClock,
	go_lives: AtomicU32,
}

impl StationFeed {
	fn new(clock: &ManualClock, playlists: Vec<Playlist>) -> Self {
		let mut station = Station::new(epoch(), &BroadcastConfig::default());
		for playlist in playlists {
			station.load_playlist(playlist, clock.now());
		}
		Self {
			station: Mutex::new(station),
			clock: clock.clone(),
			go_lives: AtomicU32::new(0),
		}
	}
}

#[async_trait]
impl PositionFeed for StationFeed {
	async fn position(&self, channel: &str) -> Result<Position> {
		self.station.lock().unwrap().position(channel, self.clock.now())
	}

	async fn go_live(&self, channel: &str) -> Result<()> {
		self.go_lives.fetch_add(1, Ordering::SeqCst);
		self.station.lock().unwrap().go_live(channel, self.clock.now()).map(|_| ())
	}
}

fn two_videos() -> Vec<Playlist> {
	vec![Playlist::from_durations("music", &[100.0, 100.0])]
}

fn controller(clock: &ManualClock, player: Arc<dyn VideoPlayer>, feed: Arc<dyn PositionFeed>) -> LiveSyncController {
	let mut controller = LiveSyncController::new("music", player, feed, Arc::new(clock.clone()), &BroadcastConfig::default());
	controller.power_on();
	controller
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn s6_small_drift_needs_no_correction() {
	let clock = ManualClock::new(at(10.05));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 10.0));
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut controller = controller(&clock, player.clone(), feed);

	for _ in 0..10 {
		assert_eq!(controller.tick().await, Correction::None);
		clock.advance_millis(1000);
	}
	assert_eq!(player.ops(), (0, 0, 0));
	assert_eq!(controller.stats().corrections(), 0);
	assert_eq!(controller.state(), SyncState::Live);
}

#[tokio::test]
async fn s7_video_mismatch_changes_video_once() {
	let clock = ManualClock::new(at(105.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 10.0));
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut controller = controller(&clock, player.clone(), feed);

	assert_eq!(controller.tick().await, Correction::VideoChange { index: 1, offset: 5.0 });

	// Player reports stale state within the debounce window
	player.place(0, 10.0);
	clock.advance_millis(500);
	assert_eq!(controller.tick().await, Correction::None);
	assert_eq!(player.ops(), (1, 0, 0));
}

#[tokio::test]
async fn seek_brings_drift_under_threshold() {
	let clock = ManualClock::new(at(10.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 50.0));
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut controller = controller(&clock, player.clone(), feed);

	assert_eq!(controller.tick().await, Correction::Seek { offset: 10.0 });
	clock.advance_millis(1000);
	assert_eq!(controller.tick().await, Correction::None);
	assert_eq!(player.ops(), (0, 1, 0));
	assert_eq!(controller.state(), SyncState::Live);
}

#[tokio::test]
async fn repeated_seek_failures_force_video_change() {
	let clock = ManualClock::new(at(10.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 50.0).failing_seeks());
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut controller = controller(&clock, player.clone(), feed);

	for _ in 0..3 {
		assert_eq!(controller.tick().await, Correction::None);
		clock.advance_millis(1000);
	}
	assert_eq!(player.seek_attempts(), 3);
	assert_eq!(controller.stats().failures, 3);

	assert_eq!(controller.tick().await, Correction::VideoChange { index: 0, offset: 13.0 });
	assert_eq!(player.ops(), (1, 0, 0));
}

#[tokio::test]
async fn rate_nudge_resets_once_back_in_tolerance() {
	let clock = ManualClock::new(at(10.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 10.3));
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut controller = controller(&clock, player.clone(), feed);

	match controller.tick().await {
		Correction::Rate { rate } => assert!((rate - 0.985).abs() < 1e-9),
		other => panic!("expected rate nudge, got {other:?}"),
	}
	assert!((player.rate() - 0.985).abs() < 1e-9);

	clock.advance_millis(500);
	player.place(0, 10.5);
	assert_eq!(controller.tick().await, Correction::None);
	assert_eq!(player.rate(), 1.0);
	assert_eq!(controller.stats().rate_resets, 1);
}

#[tokio::test]
async fn seek_only_player_tolerates_moderate_drift() {
	let clock = ManualClock::new(at(10.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 11.5).seek_only());
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut controller = controller(&clock, player.clone(), feed);

	assert_eq!(controller.tick().await, Correction::None);
	assert_eq!(player.ops(), (0, 0, 0));
}

#[tokio::test]
async fn manual_mode_suppresses_corrections_until_go_live() {
	let clock = ManualClock::new(at(10.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 1, 70.0));
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut controller = controller(&clock, player.clone(), feed.clone());

	controller.manual_intervention();
	assert_eq!(controller.state(), SyncState::Manual);
	for _ in 0..5 {
		assert_eq!(controller.tick().await, Correction::None);
		clock.advance_millis(1000);
	}
	assert_eq!(player.ops(), (0, 0, 0));

	assert_eq!(controller.go_live().await, Correction::VideoChange { index: 0, offset: 15.0 });
	assert_eq!(feed.go_lives.load(Ordering::SeqCst), 1);
	assert_eq!(controller.state(), SyncState::Live);
}

#[tokio::test]
async fn unknown_channel_is_no_content() {
	let clock = ManualClock::new(at(10.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 0.0));
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut controller = controller(&clock, player.clone(), feed);

	assert_eq!(controller.change_channel("sports").await, Correction::None);
	assert_eq!(controller.state(), SyncState::NoContent);
	assert_eq!(player.ops(), (0, 0, 0));

	assert_eq!(controller.change_channel("music").await, Correction::Seek { offset: 10.0 });
	assert_eq!(controller.state(), SyncState::Live);
}

#[tokio::test]
async fn power_off_stops_corrections() {
	let clock = ManualClock::new(at(10.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 50.0));
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut controller = controller(&clock, player.clone(), feed);

	controller.power_off().await;
	assert_eq!(controller.tick().await, Correction::None);
	assert_eq!(controller.state(), SyncState::Off);
	assert_eq!(player.ops(), (0, 0, 0));
}

#[tokio::test]
async fn feed_failures_back_off_to_cap() {
	struct DownFeed;

	#[async_trait]
	impl PositionFeed for DownFeed {
		async fn position(&self, _channel: &str) -> Result<Position> {
			Err(retro_broadcast::BroadcastError::EpochUnavailable("authority down".into()))
		}

		async fn go_live(&self, _channel: &str) -> Result<()> {
			Ok(())
		}
	}

	let clock = ManualClock::new(at(10.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 0.0));
	let mut controller = controller(&clock, player, Arc::new(DownFeed));

	assert_eq!(controller.next_interval(), Duration::from_secs(1));
	controller.tick().await;
	assert_eq!(controller.next_interval(), Duration::from_secs(2));
	controller.tick().await;
	assert_eq!(controller.next_interval(), Duration::from_secs(4));
	for _ in 0..10 {
		controller.tick().await;
	}
	assert_eq!(controller.next_interval(), Duration::from_secs(30));
	assert_eq!(controller.state(), SyncState::Live);
}

// ============================================================================
// Supervisor
// ============================================================================

#[tokio::test(start_paused = true)]
async fn channel_change_rebinds_the_sync_task() {
	let clock = ManualClock::new(at(105.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 0.0));
	let feed = Arc::new(StationFeed::new(
		&clock,
		vec![Playlist::from_durations("music", &[100.0, 100.0]), Playlist::from_durations("news", &[30.0])],
	));

	let mut sync = LiveSync::new(Arc::clone(&player) as Arc<dyn VideoPlayer>, feed, Arc::new(clock.clone()), BroadcastConfig::default());
	let mut status = sync.subscribe();

	sync.select_channel("music").await.unwrap();
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(player.ops().0, 1);

	sync.select_channel("news").await.unwrap();
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(sync.current_channel(), Some("news"));
	assert_eq!(status.borrow_and_update().channel.as_deref(), Some("news"));

	sync.manual_intervention().unwrap();
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(sync.status().state, SyncState::Manual);

	let stats = sync.power_off().await;
	assert!(stats.is_some());
	assert_eq!(sync.status().state, SyncState::Off);
	assert!(sync.manual_intervention().is_err());

	sync.shutdown().await;
	assert!(sync.select_channel("music").await.is_err());
}

#[tokio::test(start_paused = true)]
async fn reselecting_during_a_seek_resumes_playback() {
	let clock = ManualClock::new(at(10.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 50.0).slow_seeks(Duration::from_millis(500)));
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut sync = LiveSync::new(player.clone(), feed, Arc::new(clock.clone()), BroadcastConfig::default());

	sync.select_channel("music").await.unwrap();
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert!(player.is_paused());
	assert_eq!(player.seek_attempts(), 0);

	// The new channel has no content, so nothing else touches the player
	sync.select_channel("weather").await.unwrap();
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert!(!player.is_paused());
	assert_eq!(sync.status().state, SyncState::NoContent);

	sync.shutdown().await;
	assert!(!player.is_paused());
	assert_eq!(player.ops(), (0, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn power_off_drops_a_pending_rate_nudge() {
	let clock = ManualClock::new(at(10.0));
	let player = Arc::new(SimulatedPlayer::new(&clock, 0, 10.3));
	let feed = Arc::new(StationFeed::new(&clock, two_videos()));
	let mut sync = LiveSync::new(player.clone(), feed, Arc::new(clock.clone()), BroadcastConfig::default());

	sync.select_channel("music").await.unwrap();
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert!((player.rate() - 0.985).abs() < 1e-9);

	let stats = sync.power_off().await.unwrap();
	assert_eq!(stats.rate_resets, 1);
	assert_eq!(player.rate(), 1.0);
}
