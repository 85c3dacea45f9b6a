use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use rayon::prelude::*;
use terrastream_common::{LodLevel, StreamConfig, TerrainConfig, TileCoord};
use terrastream_elevation::{ElevationError, ElevationGrid, ElevationSampler, ElevationSource};
use terrastream_mesh::{TileMesh, TileMeshBuilder};
use terrastream_noise::NoiseField;
use tracing::{debug, trace, warn};

use crate::grid::{TileGrid, tiles_in_radius};
use crate::lod::LodPolicy;
use crate::queue::{LoadJob, LoadQueue};
use crate::stats::{GenerationTimer, StreamStats};
use crate::stitch::{neighbourhood, stitch_edges};
use crate::tile::{ResidentTile, TileEvent, TileState};
use crate::view::ViewCone;
use crate::StreamError;

/// Output of one generation unit, ready to be admitted.
struct BuiltTile {
    lod: LodLevel,
    raw: Arc<ElevationGrid>,
    grid: Arc<ElevationGrid>,
    mesh: Arc<TileMesh>,
}

/// Keeps the set of resident terrain tiles in step with a moving viewer.
///
/// All bookkeeping happens inside [`update`](Self::update) on the caller's
/// thread; only the per-tile generation work is spread over the rayon pool.
pub struct TileStreamingManager<S: ElevationSource = ElevationSampler> {
    config: StreamConfig,
    grid: TileGrid,
    lod: LodPolicy,
    source: S,
    mesher: TileMeshBuilder,
    tiles: HashMap<TileCoord, ResidentTile>,
    /// Queued or generating. Always equal to the set of coordinates in `queue`
    /// between updates.
    in_progress: HashSet<TileCoord>,
    queue: LoadQueue,
    events: Vec<TileEvent>,
    view: Option<ViewCone>,
    viewer: Option<TileCoord>,
    tick: u64,
    stats: StreamStats,
    timer: GenerationTimer,
}

impl TileStreamingManager<ElevationSampler> {
    /// Validate `config` and build the noise field and sampler it describes.
    pub fn new(config: TerrainConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let noise = Arc::new(NoiseField::new(config.noise.clone()));
        let sampler = ElevationSampler::new(noise, &config);
        Self::with_source(&config, sampler)
    }
}

impl<S: ElevationSource> TileStreamingManager<S> {
    /// Stream tiles produced by `source`. Tile size and resolution come from
    /// the source; radii, LOD and budgets from `config.stream`.
    pub fn with_source(config: &TerrainConfig, source: S) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self {
            config: config.stream.clone(),
            grid: TileGrid::new(source.tile_size()),
            lod: LodPolicy::from_config(&config.stream),
            mesher: TileMeshBuilder::new(config.height_scale),
            source,
            tiles: HashMap::new(),
            in_progress: HashSet::new(),
            queue: LoadQueue::new(),
            events: Vec::new(),
            view: None,
            viewer: None,
            tick: 0,
            stats: StreamStats::default(),
            timer: GenerationTimer::default(),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn tile_grid(&self) -> TileGrid {
        self.grid
    }

    pub fn lod_policy(&self) -> &LodPolicy {
        &self.lod
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn viewer(&self) -> Option<TileCoord> {
        self.viewer
    }

    /// Advance one tick with the viewer in `viewer`.
    ///
    /// Order within a tick: cancel queued loads the viewer moved away from,
    /// enqueue missing tiles, generate ready jobs, evict tiles beyond the
    /// unload radius, then (on the LOD interval) re-level and re-cull.
    pub fn update(&mut self, viewer: TileCoord) -> StreamStats {
        self.tick += 1;
        let _span = tracing::info_span!("stream_update", tick = self.tick).entered();
        let start = Instant::now();
        let mut stats = StreamStats {
            tick: self.tick,
            ..StreamStats::default()
        };

        if self.viewer != Some(viewer) {
            self.viewer = Some(viewer);
            let unload = self.config.unload_radius as u32;
            let cancelled = self.queue.reprioritize(|c| c.chebyshev(viewer), unload);
            for coord in &cancelled {
                self.in_progress.remove(coord);
                debug!(%coord, "cancelled queued load");
            }
            stats.cancelled += cancelled.len();
        }

        stats.enqueued = self.enqueue_missing(viewer);
        self.process_queue(viewer, &mut stats);
        stats.unloaded += self.evict_beyond_unload(viewer);

        if self.tick % self.config.lod_interval_ticks == 0 {
            self.refresh_lod_and_visibility(viewer, &mut stats);
        }

        stats.resident = self.tiles.len();
        stats.in_progress = self.in_progress.len();
        stats.queued = self.queue.len();
        stats.update_time = start.elapsed();
        trace!(
            loaded = stats.loaded,
            unloaded = stats.unloaded,
            relevelled = stats.relevelled,
            failed = stats.failed,
            resident = stats.resident,
            queued = stats.queued,
            "tick complete"
        );
        self.stats = stats.clone();
        stats
    }

    pub fn update_from_position(&mut self, position: Vec3) -> StreamStats {
        let viewer = self.grid.position_to_tile(position);
        self.update(viewer)
    }

    /// Update with a fixed viewer until nothing is queued, or `max_ticks`
    /// ticks have run. Returns the number of ticks used.
    pub fn settle(&mut self, viewer: TileCoord, max_ticks: u64) -> u64 {
        for used in 1..=max_ticks {
            self.update(viewer);
            if self.queue.is_empty() {
                return used;
            }
        }
        max_ticks
    }

    /// Queue a load for `coord`. No-op (returns false) when the tile is
    /// already resident or in progress.
    pub fn request_load(&mut self, coord: TileCoord) -> bool {
        if self.tiles.contains_key(&coord) || self.in_progress.contains(&coord) {
            return false;
        }
        let distance = self.viewer.map_or(0, |v| coord.chebyshev(v));
        let ready_tick = self.tick + u64::from(distance) * self.config.load_delay_ticks;
        self.in_progress.insert(coord);
        self.queue.push(LoadJob {
            coord,
            distance,
            ready_tick,
        });
        true
    }

    /// Set the view volume used for culling. Takes effect on the next LOD
    /// pass and for every tile loaded from now on.
    pub fn set_view(&mut self, view: Option<ViewCone>) {
        self.view = view;
    }

    pub fn view(&self) -> Option<ViewCone> {
        self.view
    }

    pub fn tiles(&self) -> impl Iterator<Item = &ResidentTile> {
        self.tiles.values()
    }

    pub fn visible_tiles(&self) -> impl Iterator<Item = &ResidentTile> {
        self.tiles.values().filter(|t| t.visible)
    }

    pub fn tile(&self, coord: TileCoord) -> Option<&ResidentTile> {
        self.tiles.get(&coord)
    }

    pub fn state(&self, coord: TileCoord) -> TileState {
        if let Some(tile) = self.tiles.get(&coord) {
            TileState::Resident(tile.lod)
        } else if self.in_progress.contains(&coord) {
            TileState::InProgress
        } else {
            TileState::Absent
        }
    }

    pub fn is_resident(&self, coord: TileCoord) -> bool {
        self.tiles.contains_key(&coord)
    }

    pub fn is_in_progress(&self, coord: TileCoord) -> bool {
        self.in_progress.contains(&coord)
    }

    pub fn resident_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn in_progress_count(&self) -> usize {
        self.in_progress.len()
    }

    /// Take every event recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<TileEvent> {
        std::mem::take(&mut self.events)
    }

    /// Stats of the most recent update.
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn generation_timer(&self) -> &GenerationTimer {
        &self.timer
    }

    /// Terrain height at a world position, whether or not a tile is resident.
    pub fn elevation_at(&self, x: f32, z: f32) -> f32 {
        self.source.elevation_at_point(x, z)
    }

    /// Height of the resident surface under `(x, z)`, bilinear over the
    /// stitched grid. `None` when the tile there is not resident.
    pub fn resident_height_at(&self, x: f32, z: f32) -> Option<f32> {
        let tile_size = self.grid.tile_size();
        let coord = TileCoord::from_world(x, z, tile_size);
        let tile = self.tiles.get(&coord)?;
        let origin = tile.origin(tile_size);
        let u = (x - origin.x) / tile_size;
        let v = (z - origin.z) / tile_size;
        Some(tile.grid.sample(u, v) * self.mesher.height_scale())
    }

    /// Resident and in-progress sets are disjoint, keys match records and
    /// every queued job is marked in progress.
    pub fn check_invariants(&self) -> bool {
        let disjoint = self.in_progress.iter().all(|c| !self.tiles.contains_key(c));
        let keyed = self.tiles.iter().all(|(k, t)| *k == t.coord);
        let queued: HashSet<TileCoord> = self.queue.coords().collect();
        disjoint && keyed && queued.len() == self.queue.len() && queued == self.in_progress
    }

    fn enqueue_missing(&mut self, viewer: TileCoord) -> usize {
        let mut enqueued = 0;
        for coord in tiles_in_radius(viewer, self.config.load_radius) {
            if !self.has_room_for(coord.chebyshev(viewer), viewer) {
                break;
            }
            if self.request_load(coord) {
                enqueued += 1;
            }
        }
        enqueued
    }

    /// Farthest resident tile and its distance; ties go to the larger coordinate.
    fn farthest_resident(&self, viewer: TileCoord) -> Option<(TileCoord, u32)> {
        self.tiles
            .keys()
            .map(|c| (*c, c.chebyshev(viewer)))
            .max_by_key(|(c, d)| (*d, *c))
    }

    /// Whether a tile at `distance` could become resident, evicting a
    /// strictly farther tile if the store is full.
    fn has_room_for(&self, distance: u32, viewer: TileCoord) -> bool {
        if self.tiles.len() < self.config.max_visible_tiles {
            return true;
        }
        self.farthest_resident(viewer)
            .is_some_and(|(_, farthest)| farthest > distance)
    }

    fn process_queue(&mut self, viewer: TileCoord, stats: &mut StreamStats) {
        let jobs = self.queue.pop_ready(self.tick, self.config.max_loads_per_tick);
        let mut runnable = Vec::with_capacity(jobs.len());
        for job in jobs {
            if self.has_room_for(job.distance, viewer) {
                runnable.push(job);
            } else {
                self.in_progress.remove(&job.coord);
                stats.cancelled += 1;
                debug!(coord = %job.coord, "dropped queued load, store is full");
            }
        }
        if runnable.is_empty() {
            return;
        }

        for (job, outcome, elapsed) in self.generate_batch(&runnable) {
            match outcome {
                Ok(built) => {
                    if self.admit(job, built, viewer, stats) {
                        stats.loaded += 1;
                        self.timer.record(elapsed);
                    } else {
                        stats.cancelled += 1;
                    }
                }
                Err(error) => {
                    self.in_progress.remove(&job.coord);
                    warn!(coord = %job.coord, %error, "tile generation failed");
                    stats.failed += 1;
                    self.events.push(TileEvent::Failed {
                        coord: job.coord,
                        error,
                    });
                }
            }
        }
    }

    /// Generate, stitch and mesh `jobs` on the rayon pool. Results come back
    /// in job order.
    fn generate_batch(
        &self,
        jobs: &[LoadJob],
    ) -> Vec<(LoadJob, Result<BuiltTile, StreamError>, Duration)> {
        let source = &self.source;
        let mesher = self.mesher;
        let lod = &self.lod;

        let raws: Vec<(LoadJob, Result<ElevationGrid, StreamError>, Duration)> = jobs
            .par_iter()
            .map(|job| {
                let start = Instant::now();
                let raw = source.raw_grid(job.coord).map_err(StreamError::from);
                (*job, raw, start.elapsed())
            })
            .collect();

        let mut neighbours: HashMap<TileCoord, Arc<ElevationGrid>> = HashMap::new();
        let mut pending = Vec::with_capacity(raws.len());
        for (job, raw, elapsed) in raws {
            match raw {
                Ok(grid) => {
                    let grid = Arc::new(grid);
                    neighbours.insert(job.coord, Arc::clone(&grid));
                    pending.push((job, Ok(grid), elapsed));
                }
                Err(e) => pending.push((job, Err(e), elapsed)),
            }
        }

        let mut missing: Vec<TileCoord> = Vec::new();
        for (job, raw, _) in &pending {
            if raw.is_err() {
                continue;
            }
            for coord in neighbourhood(job.coord) {
                if neighbours.contains_key(&coord) {
                    continue;
                }
                if let Some(tile) = self.tiles.get(&coord) {
                    neighbours.insert(coord, Arc::clone(&tile.raw));
                } else {
                    missing.push(coord);
                }
            }
        }
        missing.sort();
        missing.dedup();

        let generated: Vec<(TileCoord, Result<ElevationGrid, ElevationError>)> = missing
            .par_iter()
            .map(|coord| (*coord, source.raw_grid(*coord)))
            .collect();
        // A tile stitched without one of its neighbours would disagree with
        // that neighbour's edge once it loads, so such tiles fail and retry.
        let mut unavailable: HashMap<TileCoord, ElevationError> = HashMap::new();
        for (coord, result) in generated {
            match result {
                Ok(grid) => {
                    neighbours.insert(coord, Arc::new(grid));
                }
                Err(error) => {
                    debug!(%coord, %error, "neighbour grid unavailable for stitching");
                    unavailable.insert(coord, error);
                }
            }
        }

        pending
            .into_par_iter()
            .map(|(job, raw, raw_time)| {
                let start = Instant::now();
                let built = raw.and_then(|raw| {
                    let blocked = neighbourhood(job.coord)
                        .iter()
                        .find_map(|c| unavailable.get(c));
                    if let Some(error) = blocked {
                        return Err(StreamError::from(error.clone()));
                    }
                    let stitched = stitch_edges(&raw, &neighbours);
                    let tile_lod = lod.calculate_lod(job.distance);
                    let mesh = mesher.build(&stitched, tile_lod)?;
                    Ok(BuiltTile {
                        lod: tile_lod,
                        raw,
                        grid: Arc::new(stitched),
                        mesh: Arc::new(mesh),
                    })
                });
                (job, built, raw_time + start.elapsed())
            })
            .collect()
    }

    fn admit(
        &mut self,
        job: LoadJob,
        built: BuiltTile,
        viewer: TileCoord,
        stats: &mut StreamStats,
    ) -> bool {
        self.in_progress.remove(&job.coord);
        if !self.make_room(job.distance, viewer, stats) {
            debug!(coord = %job.coord, "dropped generated tile, store is full");
            return false;
        }

        let coord = job.coord;
        let tile_size = self.grid.tile_size();
        let visible = self.view.is_none_or(|v| v.contains_tile(coord, tile_size));
        debug!(%coord, lod = built.lod, visible, "tile loaded");
        self.events.push(TileEvent::Loaded {
            coord,
            lod: built.lod,
            origin: self.grid.tile_origin(coord),
            mesh: Arc::clone(&built.mesh),
        });
        self.tiles.insert(
            coord,
            ResidentTile {
                coord,
                lod: built.lod,
                raw: built.raw,
                grid: built.grid,
                mesh: built.mesh,
                visible,
                loaded_tick: self.tick,
            },
        );
        true
    }

    /// Evict strictly farther residents until one more tile fits.
    fn make_room(&mut self, distance: u32, viewer: TileCoord, stats: &mut StreamStats) -> bool {
        while self.tiles.len() >= self.config.max_visible_tiles {
            match self.farthest_resident(viewer) {
                Some((coord, farthest)) if farthest > distance => {
                    self.unload(coord);
                    stats.unloaded += 1;
                }
                _ => return false,
            }
        }
        true
    }

    fn unload(&mut self, coord: TileCoord) {
        if self.tiles.remove(&coord).is_some() {
            debug!(%coord, "tile unloaded");
            self.events.push(TileEvent::Unloaded { coord });
        }
    }

    fn evict_beyond_unload(&mut self, viewer: TileCoord) -> usize {
        let unload = self.config.unload_radius as u32;
        let mut doomed: Vec<TileCoord> = self
            .tiles
            .keys()
            .filter(|c| c.chebyshev(viewer) > unload)
            .copied()
            .collect();
        doomed.sort();
        for coord in &doomed {
            self.unload(*coord);
        }
        doomed.len()
    }

    fn refresh_lod_and_visibility(&mut self, viewer: TileCoord, stats: &mut StreamStats) {
        let mut targets: Vec<(TileCoord, LodLevel, LodLevel, Arc<ElevationGrid>)> = self
            .tiles
            .values()
            .filter_map(|tile| {
                let target = self.lod.calculate_lod(tile.coord.chebyshev(viewer));
                self.lod
                    .needs_relevel(tile.lod, target)
                    .then(|| (tile.coord, tile.lod, target, Arc::clone(&tile.grid)))
            })
            .collect();
        targets.sort_by_key(|(coord, ..)| *coord);

        let mesher = self.mesher;
        let rebuilt: Vec<_> = targets
            .into_par_iter()
            .map(|(coord, from, to, grid)| (coord, from, to, mesher.build(&grid, to)))
            .collect();

        for (coord, from, to, result) in rebuilt {
            let Some(tile) = self.tiles.get_mut(&coord) else {
                continue;
            };
            match result {
                Ok(mesh) => {
                    let mesh = Arc::new(mesh);
                    tile.lod = to;
                    tile.mesh = Arc::clone(&mesh);
                    debug!(%coord, from, to, "tile relevelled");
                    self.events.push(TileEvent::Relevelled {
                        coord,
                        from,
                        to,
                        mesh,
                    });
                    stats.relevelled += 1;
                }
                Err(error) => {
                    warn!(%coord, from, to, %error, "LOD rebuild failed, keeping old mesh");
                }
            }
        }

        let tile_size = self.grid.tile_size();
        let view = self.view;
        for tile in self.tiles.values_mut() {
            tile.visible = view.is_none_or(|v| v.contains_tile(tile.coord, tile_size));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> TerrainConfig {
        TerrainConfig {
            tile_size: 32.0,
            base_resolution: 9,
            stream: StreamConfig {
                load_radius: 2,
                unload_radius: 4,
                lod_thresholds: vec![1, 2, 3],
                lod_hysteresis: 2,
                max_visible_tiles: 128,
                max_loads_per_tick: 25,
                load_delay_ticks: 0,
                lod_interval_ticks: 1,
            },
            ..TerrainConfig::default()
        }
    }

    fn manager(config: TerrainConfig) -> TileStreamingManager {
        TileStreamingManager::new(config).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = test_config();
        config.stream.load_radius = 5;
        assert!(matches!(
            TileStreamingManager::new(config),
            Err(StreamError::Config(_))
        ));
    }

    #[test]
    fn single_update_loads_square_around_viewer() {
        let mut m = manager(test_config());
        let viewer = TileCoord::new(0, 0);
        let stats = m.update(viewer);

        assert_eq!(stats.loaded, 25);
        assert_eq!(m.resident_count(), 25);
        for dx in -2..=2 {
            for dz in -2..=2 {
                assert!(m.is_resident(viewer.offset(dx, dz)));
            }
        }
        assert!(m.tiles().all(|t| t.coord.chebyshev(viewer) <= 4));
        assert!(m.check_invariants());
    }

    #[test]
    fn shared_edges_match_regardless_of_load_order() {
        let mut config = test_config();
        config.stream.load_radius = 0;
        let west = TileCoord::new(0, 0);
        let east = TileCoord::new(1, 0);

        let mut west_first = manager(config.clone());
        west_first.update(west);
        assert!(west_first.request_load(east));
        west_first.update(west);

        let mut east_first = manager(config);
        east_first.update(east);
        assert!(east_first.request_load(west));
        east_first.update(east);

        for m in [&west_first, &east_first] {
            let w = &m.tile(west).unwrap().grid;
            let e = &m.tile(east).unwrap().grid;
            let last = w.resolution() - 1;
            assert_eq!(w.column(last), e.column(0));
        }
        assert_eq!(
            west_first.tile(west).unwrap().grid,
            east_first.tile(west).unwrap().grid
        );
        assert_eq!(
            west_first.tile(east).unwrap().grid,
            east_first.tile(east).unwrap().grid
        );
    }

    #[test]
    fn loads_are_staggered_by_distance() {
        let mut config = test_config();
        config.stream.load_delay_ticks = 1;
        let mut m = manager(config);
        let viewer = TileCoord::new(0, 0);

        m.update(viewer);
        assert_eq!(m.resident_count(), 1);
        assert!(m.is_resident(viewer));
        assert_eq!(m.in_progress_count(), 24);

        m.update(viewer);
        assert_eq!(m.resident_count(), 9);
        m.update(viewer);
        assert_eq!(m.resident_count(), 25);
        assert_eq!(m.in_progress_count(), 0);
    }

    #[test]
    fn per_tick_budget_caps_loads_nearest_first() {
        let mut config = test_config();
        config.stream.max_loads_per_tick = 4;
        let mut m = manager(config);
        let viewer = TileCoord::new(0, 0);

        let stats = m.update(viewer);
        assert_eq!(stats.loaded, 4);
        assert!(m.is_resident(viewer));
        assert!(m.tiles().all(|t| t.coord.chebyshev(viewer) <= 1));

        let ticks = m.settle(viewer, 20);
        assert!(ticks < 20);
        assert_eq!(m.resident_count(), 25);
    }

    #[test]
    fn moving_away_evicts_and_reloads() {
        let mut m = manager(test_config());
        m.update(TileCoord::new(0, 0));
        m.drain_events();

        let viewer = TileCoord::new(10, 0);
        let stats = m.update(viewer);
        assert_eq!(stats.unloaded, 25);
        assert_eq!(stats.loaded, 25);
        assert!(!m.is_resident(TileCoord::new(0, 0)));
        assert!(m.tiles().all(|t| t.coord.chebyshev(viewer) <= 4));

        let events = m.drain_events();
        let unloaded = events
            .iter()
            .filter(|e| matches!(e, TileEvent::Unloaded { .. }))
            .count();
        assert_eq!(unloaded, 25);
    }

    #[test]
    fn hysteresis_band_keeps_tiles() {
        let mut m = manager(test_config());
        m.update(TileCoord::new(0, 0));
        // Two tiles east: everything old is still within the unload radius.
        let stats = m.update(TileCoord::new(2, 0));
        assert_eq!(stats.unloaded, 0);
        assert!(m.is_resident(TileCoord::new(-2, 0)));
    }

    #[test]
    fn queued_loads_are_cancelled_when_viewer_leaves() {
        let mut config = test_config();
        config.stream.load_delay_ticks = 1;
        config.stream.max_loads_per_tick = 1;
        let mut m = manager(config);

        m.update(TileCoord::new(0, 0));
        assert_eq!(m.resident_count(), 1);
        assert_eq!(m.in_progress_count(), 24);

        let stats = m.update(TileCoord::new(20, 0));
        assert_eq!(stats.cancelled, 24);
        assert!(!m.is_in_progress(TileCoord::new(1, 1)));
        assert_eq!(m.state(TileCoord::new(0, 0)), TileState::Absent);
        assert!(m.check_invariants());
    }

    #[test]
    fn relevels_only_past_hysteresis() {
        let mut config = test_config();
        config.stream.load_radius = 3;
        config.stream.unload_radius = 6;
        config.stream.max_loads_per_tick = 64;
        let mut m = manager(config);

        m.update(TileCoord::new(0, 0));
        assert_eq!(m.state(TileCoord::new(3, 0)), TileState::Resident(2));
        assert_eq!(m.state(TileCoord::new(0, 0)), TileState::Resident(0));
        m.drain_events();

        m.update(TileCoord::new(2, 0));
        // Distance 3 -> 1: LOD 2 -> 0 crosses the hysteresis threshold.
        assert_eq!(m.state(TileCoord::new(3, 0)), TileState::Resident(0));
        // Distance 0 -> 2: LOD 0 -> 1 is a single step and is suppressed.
        assert_eq!(m.state(TileCoord::new(0, 0)), TileState::Resident(0));

        let relevelled: Vec<_> = m
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                TileEvent::Relevelled { coord, from, to, mesh } => Some((coord, from, to, mesh)),
                _ => None,
            })
            .collect();
        let (_, from, to, mesh) = relevelled
            .iter()
            .find(|(c, ..)| *c == TileCoord::new(3, 0))
            .unwrap();
        assert_eq!((*from, *to), (2, 0));
        assert_eq!(mesh.resolution, 9);
        assert!(relevelled.iter().all(|(c, ..)| *c != TileCoord::new(0, 0)));
    }

    /// Wraps the sampler and fails the first `failures` requests for one tile.
    struct FlakySource {
        inner: ElevationSampler,
        target: TileCoord,
        failures: AtomicUsize,
    }

    impl ElevationSource for FlakySource {
        fn tile_size(&self) -> f32 {
            self.inner.tile_size()
        }

        fn resolution(&self) -> usize {
            self.inner.resolution()
        }

        fn raw_grid(&self, coord: TileCoord) -> Result<ElevationGrid, ElevationError> {
            let fail = coord == self.target
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if fail {
                return Err(ElevationError::Source {
                    coord,
                    reason: "injected".into(),
                });
            }
            self.inner.raw_grid(coord)
        }

        fn elevation_at_point(&self, x: f32, z: f32) -> f32 {
            self.inner.elevation_at_point(x, z)
        }
    }

    #[test]
    fn failed_tile_is_retried_later() {
        let mut config = test_config();
        config.stream.load_radius = 1;
        let noise = Arc::new(NoiseField::new(config.noise.clone()));
        let source = FlakySource {
            inner: ElevationSampler::new(noise, &config),
            target: TileCoord::new(0, 0),
            failures: AtomicUsize::new(1),
        };
        let mut m = TileStreamingManager::with_source(&config, source).unwrap();
        let viewer = TileCoord::new(0, 0);

        let stats = m.update(viewer);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.loaded, 8);
        assert_eq!(m.state(viewer), TileState::Absent);
        assert!(m.check_invariants());
        assert!(m.drain_events().iter().any(|e| matches!(
            e,
            TileEvent::Failed { coord, error: StreamError::Elevation(_) } if *coord == viewer
        )));

        let stats = m.update(viewer);
        assert_eq!(stats.loaded, 1);
        assert_eq!(m.state(viewer), TileState::Resident(0));
    }

    #[test]
    fn unavailable_neighbour_fails_tile_instead_of_leaving_a_seam() {
        let mut config = test_config();
        config.stream.load_radius = 0;
        let noise = Arc::new(NoiseField::new(config.noise.clone()));
        let source = FlakySource {
            inner: ElevationSampler::new(noise, &config),
            target: TileCoord::new(1, 0),
            failures: AtomicUsize::new(1),
        };
        let mut m = TileStreamingManager::with_source(&config, source).unwrap();
        let west = TileCoord::new(0, 0);
        let east = TileCoord::new(1, 0);

        // The east raw grid is needed to stitch the west tile and fails once.
        let stats = m.update(west);
        assert_eq!(stats.failed, 1);
        assert_eq!(m.state(west), TileState::Absent);
        assert!(m.drain_events().iter().any(|e| matches!(
            e,
            TileEvent::Failed { coord, .. } if *coord == west
        )));
        assert!(m.check_invariants());

        let stats = m.update(west);
        assert_eq!(stats.loaded, 1);
        assert!(m.request_load(east));
        m.update(west);

        let w = &m.tile(west).unwrap().grid;
        let e = &m.tile(east).unwrap().grid;
        assert_eq!(w.column(w.resolution() - 1), e.column(0));
    }

    #[test]
    fn tile_completing_beyond_unload_radius_is_evicted_same_update() {
        let mut config = test_config();
        config.stream.load_radius = 0;
        let mut m = manager(config);
        let viewer = TileCoord::new(0, 0);
        m.update(viewer);
        m.drain_events();

        let far = TileCoord::new(9, 0);
        assert!(m.request_load(far));
        let stats = m.update(viewer);

        assert_eq!(stats.loaded, 1);
        assert_eq!(stats.unloaded, 1);
        assert_eq!(m.state(far), TileState::Absent);
        assert!(m.check_invariants());
        let events = m.drain_events();
        assert!(matches!(events.as_slice(), [
            TileEvent::Loaded { coord: loaded, .. },
            TileEvent::Unloaded { coord: unloaded },
        ] if *loaded == far && *unloaded == far));
    }

    #[test]
    fn capacity_keeps_nearest_tiles() {
        let mut config = test_config();
        config.stream.max_visible_tiles = 9;
        let mut m = manager(config);
        let viewer = TileCoord::new(0, 0);

        m.update(viewer);
        assert_eq!(m.resident_count(), 9);
        assert!(m.tiles().all(|t| t.coord.chebyshev(viewer) <= 1));

        // Nothing new is queued while the store is full of nearer tiles.
        let stats = m.update(viewer);
        assert_eq!(stats.enqueued, 0);
        assert_eq!(m.resident_count(), 9);

        // Moving one tile east: the new near tiles displace the far ones.
        let viewer = TileCoord::new(1, 0);
        m.update(viewer);
        assert_eq!(m.resident_count(), 9);
        assert!(m.tiles().all(|t| t.coord.chebyshev(viewer) <= 1));
        assert!(m.check_invariants());
    }

    #[test]
    fn view_cone_flags_visibility() {
        let mut m = manager(test_config());
        let eye = Vec3::new(16.0, 50.0, 16.0);
        m.set_view(Some(ViewCone::new(eye, Vec3::X, 60.0, 1000.0)));
        m.update(TileCoord::new(0, 0));

        assert_eq!(m.resident_count(), 25);
        assert!(m.tile(TileCoord::new(0, 0)).unwrap().visible);
        assert!(m.tile(TileCoord::new(2, 0)).unwrap().visible);
        assert!(!m.tile(TileCoord::new(-2, 0)).unwrap().visible);
        assert!(m.visible_tiles().count() < 25);

        m.set_view(None);
        m.update(TileCoord::new(0, 0));
        assert_eq!(m.visible_tiles().count(), 25);
    }

    #[test]
    fn request_load_is_idempotent() {
        let mut config = test_config();
        config.stream.load_radius = 0;
        let mut m = manager(config);
        let coord = TileCoord::new(1, 1);

        assert!(m.request_load(coord));
        assert!(!m.request_load(coord));
        assert_eq!(m.state(coord), TileState::InProgress);

        m.update(TileCoord::new(0, 0));
        assert_eq!(m.state(coord), TileState::Resident(0));
        assert!(!m.request_load(coord));
    }

    #[test]
    fn walk_is_deterministic_and_consistent() {
        let mut a = manager(test_config());
        let mut b = manager(test_config());
        for step in 0..12 {
            let viewer = TileCoord::new(step / 2, step % 3 - 1);
            a.update(viewer);
            b.update(viewer);
            assert!(a.check_invariants());
        }
        let mut coords: Vec<TileCoord> = a.tiles().map(|t| t.coord).collect();
        coords.sort();
        for coord in coords {
            let (ta, tb) = (a.tile(coord).unwrap(), b.tile(coord).unwrap());
            assert_eq!(ta.lod, tb.lod);
            assert_eq!(ta.grid, tb.grid);
            assert_eq!(ta.mesh, tb.mesh);
        }
        assert_eq!(a.resident_count(), b.resident_count());
    }

    #[test]
    fn height_queries() {
        let mut m = manager(test_config());
        assert!(m.resident_height_at(5.0, 5.0).is_none());
        let before = m.elevation_at(5.0, 5.0);

        m.update(TileCoord::new(0, 0));
        assert_eq!(m.elevation_at(5.0, 5.0), before);

        let tile = m.tile(TileCoord::new(0, 0)).unwrap();
        let expected = tile.grid.get(2, 3) * 40.0;
        let spacing = tile.grid.spacing();
        let height = m.resident_height_at(2.0 * spacing, 3.0 * spacing).unwrap();
        assert!((height - expected).abs() < 1e-4);

        let stats = m.update_from_position(Vec3::new(40.0, 0.0, 10.0));
        assert_eq!(m.viewer(), Some(TileCoord::new(1, 0)));
        assert_eq!(stats.tick, 2);
        assert!(m.generation_timer().len() > 0);
    }
}
