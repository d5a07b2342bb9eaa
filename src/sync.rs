// Sync engine - glue between the push stream, the REST refresh path, the
// record store, and the layer composer
//
// Owns the one shared mutable collection plus the view options, consumes push
// events over a channel, and runs the periodic refresh/status/state-write
// loop. All reads exposed to the rendering layer are derivations over current
// state.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::aggregate::{self, FilterOptions};
use crate::compose::{FlyTo, LayerState, MapLayerComposer, Marker, ViewOptions};
use crate::constants::WRITE_STATE_INTERVAL_SECS;
use crate::coords;
use crate::net::messages::{DetectionDto, FieldDto, PushEvent, StressAlertDto, VegetationIndexDto};
use crate::net::push::ConnState;
use crate::net::rest::{ApiClient, FetchError};
use crate::record::{Category, FieldPolygon, Record, Severity, SourceTier};
use crate::store::RecordStore;

/// Bad coordinate text from the search inputs. Recovered locally: the caller
/// asks the user to re-enter.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("unrecognized or out-of-range latitude")]
    InvalidLatitude,
    #[error("unrecognized or out-of-range longitude")]
    InvalidLongitude,
}

/// Failure of an on-demand vegetation index probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Input(#[from] LocateError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Current Unix time in seconds, the timestamp base for everything ingested.
fn now_unix() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

pub struct SyncEngine {
    store: Arc<RwLock<RecordStore>>,
    fields: Arc<RwLock<Vec<FieldPolygon>>>,
    view: Arc<RwLock<ViewOptions>>,
    composer: Arc<RwLock<MapLayerComposer>>,
    api: ApiClient,
    conn_state: Arc<RwLock<ConnState>>,

    /// Refresh generation counter. A refresh only applies its results while
    /// it is still the newest one; superseded refreshes discard theirs.
    refresh_generation: AtomicU64,
    refreshes_applied: AtomicU64,

    /// Directory for derived state files (layers.json, status.json). Empty =
    /// no file writes.
    work_dir: String,
    /// Status log interval in seconds. <= 0 = disabled.
    status_interval_secs: i32,
    /// Seconds between periodic full refreshes.
    refresh_interval_secs: u64,

    events_tx: mpsc::Sender<PushEvent>,
    /// Receiver half; taken by run().
    events_rx: std::sync::Mutex<Option<mpsc::Receiver<PushEvent>>>,
}

impl SyncEngine {
    pub fn new(
        api: ApiClient,
        work_dir: String,
        status_interval_secs: i32,
        refresh_interval_secs: u64,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        SyncEngine {
            store: Arc::new(RwLock::new(RecordStore::new())),
            fields: Arc::new(RwLock::new(Vec::new())),
            view: Arc::new(RwLock::new(ViewOptions::default())),
            composer: Arc::new(RwLock::new(MapLayerComposer::new())),
            api,
            conn_state: Arc::new(RwLock::new(ConnState::Disconnected)),
            refresh_generation: AtomicU64::new(0),
            refreshes_applied: AtomicU64::new(0),
            work_dir,
            status_interval_secs,
            refresh_interval_secs,
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
        }
    }

    /// Sender the push client forwards decoded events into.
    pub fn events_sender(&self) -> mpsc::Sender<PushEvent> {
        self.events_tx.clone()
    }

    /// Shared connection state slot, written by the push client.
    pub fn conn_state_handle(&self) -> Arc<RwLock<ConnState>> {
        self.conn_state.clone()
    }

    pub async fn connection_state(&self) -> ConnState {
        *self.conn_state.read().await
    }

    // --- Push ingestion -------------------------------------------------

    /// Apply one validated push event to the store. Invalid payloads are
    /// dropped and reported here; they never reach the store.
    pub async fn handle_push_event(&self, event: PushEvent) {
        let now = now_unix();
        match event {
            PushEvent::NewDetection { detection } => {
                let record = match detection.into_record(SourceTier::Push, now) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "dropping invalid pushed detection");
                        return;
                    }
                };
                let disease = record.disease.clone();
                let severity = record.severity;
                let mut store = self.store.write().await;
                match store.merge_insert(record) {
                    Ok(true) => {
                        info!(%disease, severity = severity.as_str(), "new detection")
                    }
                    Ok(false) => debug!("pushed detection did not change the store"),
                    Err(e) => warn!(error = %e, "pushed detection rejected"),
                }
            }
            PushEvent::StressUpdate { alerts } => {
                let count = self.apply_stress_batch(alerts, SourceTier::Push, now).await;
                info!(locations = count, "stress alerts updated");
            }
        }
    }

    /// Map a stress batch into records (skipping invalid rows) and swap it in
    /// as the whole stress category.
    async fn apply_stress_batch(
        &self,
        alerts: Vec<StressAlertDto>,
        tier: SourceTier,
        now: f64,
    ) -> usize {
        let records: Vec<Record> = alerts
            .into_iter()
            .filter_map(|dto| match dto.into_record(tier, now) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(error = %e, "dropping invalid stress alert");
                    None
                }
            })
            .collect();
        let mut store = self.store.write().await;
        store.replace_category(Category::Stress, records)
    }

    // --- REST refresh ---------------------------------------------------

    /// Start a refresh and claim the next generation. Results may only be
    /// applied while this generation is still current.
    fn begin_refresh(&self) -> u64 {
        self.refresh_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn refresh_is_current(&self, generation: u64) -> bool {
        self.refresh_generation.load(Ordering::SeqCst) == generation
    }

    /// Full refresh: detections, stress alerts, and field boundaries from
    /// their three independent endpoints. A failure in one source never
    /// blocks the other two.
    pub async fn load_all(&self) {
        let generation = self.begin_refresh();
        let (detections, stress, fields) = tokio::join!(
            self.api.fetch_detections(),
            self.api.fetch_stress_alerts(),
            self.api.fetch_fields(),
        );
        self.finish_refresh(generation, detections, stress, fields)
            .await;
    }

    /// Apply whichever sources succeeded, unless a newer refresh has started
    /// in the meantime - then this one's results are stale and dropped.
    async fn finish_refresh(
        &self,
        generation: u64,
        detections: Result<Vec<DetectionDto>, FetchError>,
        stress: Result<Vec<StressAlertDto>, FetchError>,
        fields: Result<Vec<FieldDto>, FetchError>,
    ) {
        if !self.refresh_is_current(generation) {
            info!(generation, "refresh superseded, discarding results");
            return;
        }
        let now = now_unix();

        match detections {
            Ok(batch) => self.apply_detections(batch, now).await,
            Err(e) => warn!(source = "detections", error = %e, "refresh source failed"),
        }

        match stress {
            Ok(batch) => {
                let count = self.apply_stress_batch(batch, SourceTier::Poll, now).await;
                debug!(locations = count, "stress baseline refreshed");
            }
            Err(e) => warn!(source = "stress", error = %e, "refresh source failed"),
        }

        match fields {
            Ok(batch) => self.apply_fields(batch).await,
            Err(e) => warn!(source = "fields", error = %e, "refresh source failed"),
        }

        self.refreshes_applied.fetch_add(1, Ordering::SeqCst);
    }

    /// Merge-insert the polled detection rows. Merging (rather than wholesale
    /// replacement) keeps push-delivered updates that arrived between
    /// refreshes from being clobbered.
    async fn apply_detections(&self, batch: Vec<DetectionDto>, now: f64) {
        let mut store = self.store.write().await;
        let mut changed = 0usize;
        for dto in batch {
            let record = match dto.into_record(SourceTier::Poll, now) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "dropping invalid polled detection");
                    continue;
                }
            };
            match store.merge_insert(record) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "polled detection rejected"),
            }
        }
        debug!(changed, "detections refreshed");
    }

    /// Replace the field polygon set. Decode failures skip the one field and
    /// are reported; the rest of the batch still applies.
    async fn apply_fields(&self, batch: Vec<FieldDto>) {
        let mut polygons = Vec::new();
        for dto in batch {
            let field_id = dto.id;
            match dto.into_polygon() {
                Ok(Some(polygon)) => polygons.push(polygon),
                Ok(None) => {}
                Err(e) => warn!(field_id, error = %e, "skipping undecodable field polygon"),
            }
        }
        *self.fields.write().await = polygons;
    }

    // --- User operations ------------------------------------------------

    pub async fn set_severity_filter(&self, severity: Option<Severity>) {
        self.view.write().await.severity_filter = severity;
    }

    pub async fn set_disease_filter(&self, disease: Option<String>) {
        self.view.write().await.disease_filter = disease;
    }

    pub async fn toggle_heatmap(&self) -> bool {
        let mut view = self.view.write().await;
        view.show_heatmap = !view.show_heatmap;
        view.show_heatmap
    }

    pub async fn toggle_satellite(&self) -> bool {
        let mut view = self.view.write().await;
        view.show_satellite = !view.show_satellite;
        view.show_satellite
    }

    pub async fn toggle_vegetation_overlay(&self) -> bool {
        let mut view = self.view.write().await;
        view.show_vegetation_overlay = !view.show_vegetation_overlay;
        view.show_vegetation_overlay
    }

    /// Parse user-entered coordinate text, set the focus point, and kick a
    /// reactive refresh so the newly focused area is current.
    pub async fn locate(&self, lat_text: &str, lon_text: &str) -> Result<(f64, f64), LocateError> {
        let lat = coords::parse_validated(lat_text, true).ok_or(LocateError::InvalidLatitude)?;
        let lon = coords::parse_validated(lon_text, false).ok_or(LocateError::InvalidLongitude)?;

        self.view.write().await.focus_point = Some((lat, lon));
        info!(lat, lon, "map focus set");
        self.load_all().await;
        Ok((lat, lon))
    }

    /// On-demand vegetation index at a user-supplied point, behind the same
    /// coordinate validation as every other user-entered coordinate.
    pub async fn vegetation_index_at(
        &self,
        lat_text: &str,
        lon_text: &str,
    ) -> Result<VegetationIndexDto, ProbeError> {
        let lat = coords::parse_validated(lat_text, true).ok_or(LocateError::InvalidLatitude)?;
        let lon = coords::parse_validated(lon_text, false).ok_or(LocateError::InvalidLongitude)?;
        Ok(self.api.vegetation_index_at(lat, lon).await?)
    }

    // --- Reads for the rendering layer ----------------------------------

    /// Full derived layer state. Consumes the pending focus directive, if
    /// any: whichever consumer derives first applies the movement.
    pub async fn compose_layers(&self) -> LayerState {
        let snapshot = self.store.read().await.snapshot();
        let view = self.view.read().await.clone();
        let fields = self.fields.read().await.clone();
        let mut composer = self.composer.write().await;
        composer.compose(&snapshot, &view, &fields)
    }

    /// Marker list for the current filters. Does not touch the focus
    /// directive.
    pub async fn markers(&self) -> Vec<Marker> {
        let snapshot = self.store.read().await.snapshot();
        let view = self.view.read().await.clone();
        let mut scratch = MapLayerComposer::new();
        scratch.compose(&snapshot, &view, &[]).markers
    }

    /// Heat point list for the current filters; empty while the heatmap
    /// toggle is off.
    pub async fn heat_points(&self) -> Vec<[f64; 3]> {
        let snapshot = self.store.read().await.snapshot();
        let view = self.view.read().await.clone();
        let mut scratch = MapLayerComposer::new();
        scratch.compose(&snapshot, &view, &[]).heat_points
    }

    pub async fn polygons(&self) -> Vec<FieldPolygon> {
        self.fields.read().await.clone()
    }

    /// One-shot fly-to directive; `None` once the current focus point has
    /// been applied.
    pub async fn focus_directive(&self) -> Option<FlyTo> {
        let view = self.view.read().await.clone();
        self.composer.write().await.take_focus_directive(&view)
    }

    /// Distinct filter options for one category tab, or across everything.
    pub async fn filter_options(&self, category: Option<Category>) -> FilterOptions {
        let snapshot = self.store.read().await.snapshot();
        aggregate::filter_options(&snapshot, category)
    }

    // --- Periodic loop ---------------------------------------------------

    /// Create the work_dir and initial empty state files. Call once at
    /// startup.
    pub async fn init_work_dir(&self) {
        if self.work_dir.is_empty() {
            return;
        }
        let dir = Path::new(&self.work_dir);
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(work_dir = %self.work_dir, error = %e, "failed to create work_dir");
            return;
        }
        for name in &["layers.json", "status.json"] {
            let p = dir.join(name);
            if let Err(e) = std::fs::write(&p, "{}") {
                warn!(path = %p.display(), error = %e, "failed to seed state file");
            }
        }
    }

    /// Write layers.json and status.json atomically (tmp + rename).
    async fn write_state(&self) {
        if self.work_dir.is_empty() {
            return;
        }
        let dir = Path::new(&self.work_dir);

        let layers = self.compose_layers().await;
        let connection = match self.connection_state().await {
            ConnState::Connected => "connected",
            ConnState::Connecting => "connecting",
            ConnState::Disconnected => "disconnected",
        };
        let field_count = self.fields.read().await.len();
        let status = {
            let store = self.store.read().await;
            serde_json::json!({
                "connection": connection,
                "records": store.len(),
                "drone": store.count_category(Category::Drone),
                "manual": store.count_category(Category::Manual),
                "stress": store.count_category(Category::Stress),
                "fields": field_count,
                "refreshes": self.refreshes_applied.load(Ordering::SeqCst),
            })
        };

        let files = [
            ("layers.json", serde_json::to_string(&layers)),
            ("status.json", serde_json::to_string(&status)),
        ];
        for (name, serialized) in files {
            let s = match serialized {
                Ok(s) => s,
                Err(e) => {
                    warn!(name, error = %e, "failed to serialize state file");
                    continue;
                }
            };
            let tmp = dir.join(format!("{}.tmp", name));
            let path = dir.join(name);
            if let Err(e) = std::fs::write(&tmp, s) {
                warn!(path = %tmp.display(), error = %e, "write_state failed");
            } else if let Err(e) = std::fs::rename(&tmp, &path) {
                let _ = std::fs::remove_file(&tmp);
                warn!(path = %path.display(), error = %e, "write_state rename failed");
            }
        }
    }

    /// Status line for the log, in one glance: store composition plus
    /// connection health.
    async fn log_status(&self) {
        let (total, drone, manual, stress) = {
            let store = self.store.read().await;
            (
                store.len(),
                store.count_category(Category::Drone),
                store.count_category(Category::Manual),
                store.count_category(Category::Stress),
            )
        };
        let fields = self.fields.read().await.len();
        let conn = self.connection_state().await;
        info!(
            "Status: ({} records: {} drone {} manual {} stress) ({} fields) (push {:?})",
            total, drone, manual, stress, fields, conn
        );
    }

    /// Run the engine loop: consume push events, refresh periodically, log
    /// status, and keep the work-dir state files current.
    pub async fn run(&self) {
        let mut events_rx = match self.events_rx.lock().unwrap().take() {
            Some(rx) => rx,
            None => return, // run() already called
        };

        let mut refresh_ticker =
            tokio::time::interval(Duration::from_secs(self.refresh_interval_secs.max(1)));
        refresh_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut housekeeping = tokio::time::interval(Duration::from_secs(1));
        housekeeping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let status_secs = self.status_interval_secs;
        let mut next_status = if status_secs > 0 {
            Some(tokio::time::Instant::now() + Duration::from_secs(status_secs as u64))
        } else {
            None
        };
        // First write shortly after startup so consumers have something, then
        // on the regular interval.
        let mut next_write_state = if !self.work_dir.is_empty() {
            Some(tokio::time::Instant::now() + Duration::from_secs(2))
        } else {
            None
        };

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => self.handle_push_event(event).await,
                    None => break, // all senders gone
                },
                _ = refresh_ticker.tick() => {
                    self.load_all().await;
                },
                _ = housekeeping.tick() => {
                    if let Some(ref mut next) = next_status {
                        if tokio::time::Instant::now() >= *next {
                            *next += Duration::from_secs(status_secs as u64);
                            self.log_status().await;
                        }
                    }
                    if let Some(ref mut next) = next_write_state {
                        if tokio::time::Instant::now() >= *next {
                            *next += Duration::from_secs(WRITE_STATE_INTERVAL_SECS);
                            self.write_state().await;
                        }
                    }
                },
            }
        }
    }
}
