use std::cmp::Reverse;
use std::collections::BinaryHeap;

use terrastream_common::TileCoord;

/// A deferred tile load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadJob {
    pub coord: TileCoord,
    /// Chebyshev distance to the viewer; the queue priority.
    pub distance: u32,
    /// First tick on which the job may start.
    pub ready_tick: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    distance: u32,
    coord: TileCoord,
    ready_tick: u64,
}

impl From<LoadJob> for QueueKey {
    fn from(job: LoadJob) -> Self {
        Self {
            distance: job.distance,
            coord: job.coord,
            ready_tick: job.ready_tick,
        }
    }
}

impl From<QueueKey> for LoadJob {
    fn from(key: QueueKey) -> Self {
        Self {
            coord: key.coord,
            distance: key.distance,
            ready_tick: key.ready_tick,
        }
    }
}

/// Nearest-first priority queue of pending tile loads.
#[derive(Debug, Clone, Default)]
pub struct LoadQueue {
    heap: BinaryHeap<Reverse<QueueKey>>,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: LoadJob) {
        self.heap.push(Reverse(job.into()));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pop up to `limit` jobs whose delay has elapsed, nearest first.
    /// Jobs that are not ready yet stay queued.
    pub fn pop_ready(&mut self, tick: u64, limit: usize) -> Vec<LoadJob> {
        let mut ready = Vec::new();
        let mut waiting = Vec::new();
        while ready.len() < limit {
            let Some(Reverse(key)) = self.heap.pop() else {
                break;
            };
            if key.ready_tick <= tick {
                ready.push(LoadJob::from(key));
            } else {
                waiting.push(key);
            }
        }
        self.heap.extend(waiting.into_iter().map(Reverse));
        ready
    }

    /// Recompute priorities against a new viewer position and drop jobs
    /// farther than `max_distance`. Returns the dropped coordinates.
    pub fn reprioritize(
        &mut self,
        distance_of: impl Fn(TileCoord) -> u32,
        max_distance: u32,
    ) -> Vec<TileCoord> {
        let mut dropped = Vec::new();
        let jobs: Vec<QueueKey> = self.heap.drain().map(|Reverse(k)| k).collect();
        for mut key in jobs {
            key.distance = distance_of(key.coord);
            if key.distance > max_distance {
                dropped.push(key.coord);
            } else {
                self.heap.push(Reverse(key));
            }
        }
        dropped.sort();
        dropped
    }

    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.heap.iter().map(|Reverse(k)| k.coord)
    }
}
