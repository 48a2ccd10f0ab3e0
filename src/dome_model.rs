//! Provide the dome controller and the loop that slaves it to the mount.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{watch, Mutex},
    task,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    angle::{normalize_degrees, shortest_delta_degrees},
    dome_geometry::DomeGeometry,
    error::{ObservatoryError, ObservatoryResult},
    pointing::PointingSource,
};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DomeConfig {
    /// Azimuth the dome starts at, in degrees.
    pub default_azimuth: f64,
    pub slew_rate_deg_per_sec: f64,
    pub sync_period_secs: f64,
    /// Smallest change of required azimuth that triggers a sync move.
    pub sync_hysteresis_deg: f64,
    pub sync_on_start: bool,
}

impl Default for DomeConfig {
    fn default() -> Self {
        DomeConfig {
            default_azimuth: 180.0,
            slew_rate_deg_per_sec: 5.0,
            sync_period_secs: 2.0,
            sync_hysteresis_deg: 1.0,
            sync_on_start: false,
        }
    }
}

impl DomeConfig {
    pub fn validate(&self) -> ObservatoryResult<()> {
        if !self.default_azimuth.is_finite() {
            return Err(ObservatoryError::Config(
                "dome default_azimuth must be finite".to_owned(),
            ));
        }
        if !(self.slew_rate_deg_per_sec.is_finite() && self.slew_rate_deg_per_sec > 0.0) {
            return Err(ObservatoryError::Config(
                "dome slew_rate_deg_per_sec must be positive".to_owned(),
            ));
        }
        if !(self.sync_period_secs.is_finite() && self.sync_period_secs > 0.0) {
            return Err(ObservatoryError::Config(
                "dome sync_period_secs must be positive".to_owned(),
            ));
        }
        if !(self.sync_hysteresis_deg.is_finite() && self.sync_hysteresis_deg >= 0.0) {
            return Err(ObservatoryError::Config(
                "dome sync_hysteresis_deg must not be negative".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_secs_f64(self.sync_period_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomeStatus {
    pub azimuth: f64,
    pub moving: bool,
}

/// What one sync cycle decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    Moved { required_azimuth: f64 },
    WithinHysteresis { required_azimuth: f64, delta: f64 },
    DomeMoving,
}

#[derive(Debug, Clone)]
pub struct DomeState {
    pub azimuth: f64,
    pub moving: bool,
    pub syncing: bool,
    pub target_azimuth: f64,
    start_azimuth: f64,
    move_start: Instant,
    move_duration: Duration,
}

impl DomeState {
    pub fn new(azimuth: f64) -> DomeState {
        let azimuth = normalize_degrees(azimuth);
        DomeState {
            azimuth,
            moving: false,
            syncing: false,
            target_azimuth: azimuth,
            start_azimuth: azimuth,
            move_start: Instant::now(),
            move_duration: Duration::ZERO,
        }
    }

    /// Resolve an in-progress move to the position at `now`.
    pub fn update_position(&mut self, now: Instant) {
        if !self.moving {
            return;
        }
        let elapsed = now.saturating_duration_since(self.move_start);
        if elapsed >= self.move_duration {
            self.azimuth = self.target_azimuth;
            self.moving = false;
        } else {
            let fraction = elapsed.as_secs_f64() / self.move_duration.as_secs_f64();
            let delta = shortest_delta_degrees(self.start_azimuth, self.target_azimuth);
            self.azimuth = normalize_degrees(self.start_azimuth + delta * fraction);
        }
    }

    pub fn start_move(
        &mut self,
        target_azimuth: f64,
        slew_rate: f64,
        now: Instant,
    ) -> ObservatoryResult<()> {
        if !target_azimuth.is_finite() {
            return Err(ObservatoryError::validation(format!(
                "dome azimuth must be finite, got {target_azimuth}"
            )));
        }
        self.update_position(now);
        if self.moving {
            return Err(ObservatoryError::AlreadyMoving);
        }

        let target_azimuth = normalize_degrees(target_azimuth);
        let delta = shortest_delta_degrees(self.azimuth, target_azimuth);

        self.start_azimuth = self.azimuth;
        self.target_azimuth = target_azimuth;
        self.move_start = now;
        self.move_duration = Duration::from_secs_f64(delta.abs() / slew_rate);
        self.moving = true;
        Ok(())
    }

    /// Halt where the dome is; that position becomes the target.
    pub fn stop(&mut self, now: Instant) {
        self.update_position(now);
        self.moving = false;
        self.target_azimuth = self.azimuth;
    }

    pub fn status(&self) -> DomeStatus {
        DomeStatus {
            azimuth: self.azimuth,
            moving: self.moving,
        }
    }
}

struct DomeCore {
    config: DomeConfig,
    geometry: DomeGeometry,
    pointing: Arc<dyn PointingSource>,
    state: Mutex<DomeState>,
}

impl DomeCore {
    async fn move_to_azimuth(&self, target_azimuth: f64) -> ObservatoryResult<()> {
        let mut state = self.state.lock().await;
        state.start_move(
            target_azimuth,
            self.config.slew_rate_deg_per_sec,
            Instant::now(),
        )?;
        log::info!(
            "Dome moving {:.2} -> {:.2} deg.",
            state.start_azimuth,
            state.target_azimuth
        );
        Ok(())
    }

    async fn sync_cycle(&self) -> ObservatoryResult<SyncOutcome> {
        // Mount I/O happens before the dome state is locked.
        let pointing = self.pointing.read_pointing().await?;
        let required_azimuth = self.geometry.calculate_dome_azimuth(
            pointing.ra_hours,
            pointing.dec_degrees,
            pointing.sidereal_hours,
            pointing.pier_side,
        );

        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.update_position(now);
        if state.moving {
            return Ok(SyncOutcome::DomeMoving);
        }

        let delta = shortest_delta_degrees(state.target_azimuth, required_azimuth);
        if delta.abs() <= self.config.sync_hysteresis_deg {
            return Ok(SyncOutcome::WithinHysteresis {
                required_azimuth,
                delta,
            });
        }

        state.start_move(required_azimuth, self.config.slew_rate_deg_per_sec, now)?;
        log::info!("Sync moving dome to {required_azimuth:.2} deg (delta {delta:.2}).");
        Ok(SyncOutcome::Moved { required_azimuth })
    }
}

#[derive(Debug)]
struct SyncTask {
    shutdown: watch::Sender<bool>,
    handle: task::JoinHandle<()>,
}

pub struct DomeController {
    core: Arc<DomeCore>,
    sync_task: Mutex<Option<SyncTask>>,
}

impl DomeController {
    pub fn new(
        config: DomeConfig,
        geometry: DomeGeometry,
        pointing: Arc<dyn PointingSource>,
    ) -> ObservatoryResult<DomeController> {
        config.validate()?;
        let state = DomeState::new(config.default_azimuth);
        Ok(DomeController {
            core: Arc::new(DomeCore {
                config,
                geometry,
                pointing,
                state: Mutex::new(state),
            }),
            sync_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &DomeConfig {
        &self.core.config
    }

    pub async fn get_status(&self) -> DomeStatus {
        let mut state = self.core.state.lock().await;
        state.update_position(Instant::now());
        state.status()
    }

    pub async fn get_sync_status(&self) -> bool {
        self.core.state.lock().await.syncing
    }

    /// Start or stop following the mount.
    pub async fn set_sync(&self, enabled: bool) {
        let mut sync_task = self.sync_task.lock().await;

        if enabled {
            let running = sync_task
                .as_ref()
                .is_some_and(|sync_task| !sync_task.handle.is_finished());
            if !running {
                let (shutdown, shutdown_receiver) = watch::channel(false);
                let handle = task::spawn(run_sync_loop(self.core.clone(), shutdown_receiver));
                *sync_task = Some(SyncTask { shutdown, handle });
                log::info!("Dome sync enabled.");
            }
        } else if let Some(SyncTask { shutdown, handle }) = sync_task.take() {
            let _ = shutdown.send(true);
            if let Err(error) = handle.await {
                log::error!("Dome sync task ended abnormally: {error:?}");
            }
            log::info!("Dome sync disabled.");
        }

        self.core.state.lock().await.syncing = enabled;
    }

    /// Start a move along the shortest arc.
    pub async fn move_to_azimuth(&self, target_azimuth: f64) -> ObservatoryResult<()> {
        self.core.move_to_azimuth(target_azimuth).await
    }

    pub async fn stop(&self) -> DomeStatus {
        let mut state = self.core.state.lock().await;
        state.stop(Instant::now());
        log::info!("Dome stopped at {:.2} deg.", state.azimuth);
        state.status()
    }

    /// Run one sync cycle now, independent of the background loop.
    pub async fn run_sync_cycle(&self) -> ObservatoryResult<SyncOutcome> {
        self.core.sync_cycle().await
    }

    /// Cancel the sync loop, waiting for it to finish its current cycle.
    pub async fn close(&self) {
        self.set_sync(false).await;
    }
}

async fn run_sync_loop(core: Arc<DomeCore>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = time::interval(core.config.sync_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                match core.sync_cycle().await {
                    Ok(outcome) => log::debug!("Sync cycle: {outcome:?}"),
                    Err(error) => log::warn!("Sync cycle failed, retrying next period: {error}"),
                }
            }
        }
    }
    log::debug!("Dome sync loop finished.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dome_geometry::DomeGeometryConfig,
        mount_status::PierSide,
        pointing::Pointing,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Pointing source whose required dome azimuth is set directly.
    struct FakeMount {
        pointing: Mutex<Pointing>,
        fail: AtomicBool,
        reads: AtomicUsize,
    }

    impl FakeMount {
        fn new(required_azimuth: f64) -> FakeMount {
            FakeMount {
                pointing: Mutex::new(pointing_for_azimuth(required_azimuth)),
                fail: AtomicBool::new(false),
                reads: AtomicUsize::new(0),
            }
        }

        async fn set_required_azimuth(&self, required_azimuth: f64) {
            *self.pointing.lock().await = pointing_for_azimuth(required_azimuth);
        }
    }

    #[async_trait]
    impl PointingSource for FakeMount {
        async fn ra_dec_decimal(&self) -> ObservatoryResult<(f64, f64)> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ObservatoryError::timeout(":GR", crate::error::TimeoutKind::NoReply));
            }
            let pointing = self.pointing.lock().await;
            Ok((pointing.ra_hours, pointing.dec_degrees))
        }

        async fn sidereal_hours(&self) -> ObservatoryResult<f64> {
            Ok(self.pointing.lock().await.sidereal_hours)
        }

        async fn pier_side(&self) -> ObservatoryResult<PierSide> {
            Ok(self.pointing.lock().await.pier_side)
        }
    }

    /// Equator, tube arm of unit length: azimuth is 90 deg minus hour angle.
    fn test_geometry() -> DomeGeometry {
        DomeGeometry::new(DomeGeometryConfig {
            dec_axis_to_telescope: 1.0,
            ..DomeGeometryConfig::centered()
        })
    }

    fn pointing_for_azimuth(azimuth: f64) -> Pointing {
        Pointing {
            ra_hours: 0.0,
            dec_degrees: 0.0,
            sidereal_hours: (90.0 - azimuth) / 15.0,
            pier_side: PierSide::West,
        }
    }

    fn controller(default_azimuth: f64, mount: Arc<FakeMount>) -> DomeController {
        let config = DomeConfig {
            default_azimuth,
            ..DomeConfig::default()
        };
        DomeController::new(config, test_geometry(), mount).unwrap()
    }

    #[test]
    fn test_geometry_helper() {
        let geometry = test_geometry();
        let pointing = pointing_for_azimuth(181.5);

        let azimuth = geometry.calculate_dome_azimuth(
            pointing.ra_hours,
            pointing.dec_degrees,
            pointing.sidereal_hours,
            pointing.pier_side,
        );

        assert!((azimuth - 181.5).abs() < 1e-9, "{azimuth}");
    }

    #[test]
    fn test_config_validation() {
        assert!(DomeConfig::default().validate().is_ok());
        assert!(matches!(
            DomeConfig {
                slew_rate_deg_per_sec: 0.0,
                ..DomeConfig::default()
            }
            .validate(),
            Err(ObservatoryError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_move_is_rejected() {
        let dome = controller(180.0, Arc::new(FakeMount::new(180.0)));

        dome.move_to_azimuth(270.0).await.unwrap();
        let second = dome.move_to_azimuth(90.0).await;

        assert!(matches!(second, Err(ObservatoryError::AlreadyMoving)));
        assert!(dome.get_status().await.moving);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_takes_short_path_across_north() {
        let dome = controller(350.0, Arc::new(FakeMount::new(180.0)));

        dome.move_to_azimuth(10.0).await.unwrap();

        // 20 degrees at 5 deg/s.
        for _ in 0..39 {
            time::advance(Duration::from_millis(100)).await;
            let status = dome.get_status().await;
            assert!(status.moving);
            assert!((0.0..360.0).contains(&status.azimuth), "{status:?}");
            assert!(
                status.azimuth >= 350.0 || status.azimuth <= 10.0,
                "took the long way: {status:?}"
            );
        }

        time::advance(Duration::from_millis(100)).await;
        let status = dome.get_status().await;
        assert_eq!(status.azimuth, 10.0);
        assert!(!status.moving);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interpolation_midpoint() {
        let dome = controller(350.0, Arc::new(FakeMount::new(180.0)));

        dome.move_to_azimuth(10.0).await.unwrap();
        time::advance(Duration::from_secs(2)).await;

        let status = dome.get_status().await;
        assert!(status.azimuth.abs() < 1e-6 || (status.azimuth - 360.0).abs() < 1e-6);
        assert!(status.azimuth < 360.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_freezes_position() {
        let dome = controller(0.0, Arc::new(FakeMount::new(180.0)));

        dome.move_to_azimuth(90.0).await.unwrap();
        time::advance(Duration::from_secs(1)).await;
        let stopped = dome.stop().await;

        assert!(!stopped.moving);
        assert!((stopped.azimuth - 5.0).abs() < 1e-6);

        time::advance(Duration::from_secs(5)).await;
        assert_eq!(dome.get_status().await, stopped);

        // Stopping an idle dome is not an error.
        assert_eq!(dome.stop().await, stopped);
        dome.move_to_azimuth(10.0).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_resumes_after_stop() {
        let dome = controller(180.0, Arc::new(FakeMount::new(200.0)));

        assert!(matches!(
            dome.run_sync_cycle().await.unwrap(),
            SyncOutcome::Moved { .. }
        ));
        time::advance(Duration::from_secs(1)).await;
        dome.stop().await;

        // The halted position is now the reference, 15 deg short of 200.
        assert!(matches!(
            dome.run_sync_cycle().await.unwrap(),
            SyncOutcome::Moved { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_hysteresis() {
        let mount = Arc::new(FakeMount::new(180.8));
        let dome = controller(180.0, mount.clone());

        let outcome = dome.run_sync_cycle().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::WithinHysteresis { .. }));
        assert!(!dome.get_status().await.moving);

        mount.set_required_azimuth(181.5).await;
        let outcome = dome.run_sync_cycle().await.unwrap();
        let SyncOutcome::Moved { required_azimuth } = outcome else {
            panic!("Expected a move, got {outcome:?}.");
        };
        assert!((required_azimuth - 181.5).abs() < 1e-9);

        // While moving no further move is issued.
        mount.set_required_azimuth(190.0).await;
        assert_eq!(dome.run_sync_cycle().await.unwrap(), SyncOutcome::DomeMoving);

        time::advance(Duration::from_secs(1)).await;
        mount.set_required_azimuth(182.0).await;
        assert!(matches!(
            dome.run_sync_cycle().await.unwrap(),
            SyncOutcome::WithinHysteresis { .. }
        ));
        let status = dome.get_status().await;
        assert!((status.azimuth - 181.5).abs() < 1e-9);
        assert!(!status.moving);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_cycle_error_is_reported() {
        let mount = Arc::new(FakeMount::new(200.0));
        mount.fail.store(true, Ordering::SeqCst);
        let dome = controller(180.0, mount);

        assert!(matches!(
            dome.run_sync_cycle().await,
            Err(ObservatoryError::Timeout { .. })
        ));
        assert!(!dome.get_status().await.moving);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_loop_moves_and_survives_errors() {
        let mount = Arc::new(FakeMount::new(200.0));
        let dome = controller(180.0, mount.clone());

        dome.set_sync(true).await;
        assert!(dome.get_sync_status().await);

        // First cycle runs straight away.
        time::sleep(Duration::from_millis(10)).await;
        let status = dome.get_status().await;
        assert!(status.moving);
        let target_azimuth = dome.core.state.lock().await.target_azimuth;
        assert!((target_azimuth - 200.0).abs() < 1e-9, "{target_azimuth}");

        mount.fail.store(true, Ordering::SeqCst);
        let reads_before = mount.reads.load(Ordering::SeqCst);
        time::sleep(Duration::from_secs(7)).await;
        assert!(mount.reads.load(Ordering::SeqCst) >= reads_before + 3);

        dome.set_sync(false).await;
        assert!(!dome.get_sync_status().await);
        let reads_after_stop = mount.reads.load(Ordering::SeqCst);
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(mount.reads.load(Ordering::SeqCst), reads_after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_sync_but_not_move() {
        let mount = Arc::new(FakeMount::new(300.0));
        let dome = controller(180.0, mount);

        dome.set_sync(true).await;
        time::sleep(Duration::from_millis(10)).await;
        assert!(dome.get_status().await.moving);

        dome.close().await;

        assert!(!dome.get_sync_status().await);
        assert!(dome.get_status().await.moving);
        time::sleep(Duration::from_secs(30)).await;
        let status = dome.get_status().await;
        assert!((status.azimuth - 300.0).abs() < 1e-9, "{status:?}");
        assert!(!status.moving);
    }

    #[tokio::test]
    async fn test_enable_sync_twice_keeps_one_loop() {
        let dome = controller(180.0, Arc::new(FakeMount::new(180.0)));

        dome.set_sync(true).await;
        dome.set_sync(true).await;

        assert!(dome.sync_task.lock().await.is_some());
        dome.close().await;
        assert!(dome.sync_task.lock().await.is_none());
    }
}
