//! Frame-sync (spec §2.10/§4.5): groups per-camera optical-up frames whose
//! timestamps fall inside a small alignment window and publishes full or
//! best-effort sets. Grounded on `align_frames.c`/`frame_sync.c`.
//!
//! The source keeps a freelist of `frame_node_type` and a doubly-linked
//! list of raw pointers into it. Per the arena-indexed redesign note, this
//! keeps the same freelist-arena structure but links nodes by index into a
//! `Vec`, and a node owns a clone of its sample rather than a pointer into
//! another stage's queue.

use std::sync::Arc;

use thread_control::Flag;
use tracing::{error, warn};

use kharon_core::queue::{Cursor, Queue};
use kharon_core::KharonError;

use crate::optical_up::OpticalUpOutput;

pub const MAX_CAMS: usize = 8;
/// Full-set tolerance window.
pub const ALIGN_SECS: f64 = 0.08;

struct Node {
    t: f64,
    cam_num: u8,
    sample: OpticalUpOutput,
    prev: Option<usize>,
    next: Option<usize>,
}

/// One published frame set, indexed by camera number.
#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    pub frames: [Option<OpticalUpOutput>; MAX_CAMS],
}

pub struct FrameSyncState {
    arena: Vec<Option<Node>>,
    free_list: Vec<usize>,
    head: Option<usize>,
    num_allocated: usize,
    num_cams: usize,
    frame_interval: f64,
    missed_interval: f64,
    dump_interval: f64,
    last_sync_time: f64,
}

impl FrameSyncState {
    pub fn new(arena_capacity: usize, num_cams: usize, frame_interval: f64) -> Self {
        FrameSyncState {
            arena: (0..arena_capacity).map(|_| None).collect(),
            free_list: (0..arena_capacity).rev().collect(),
            head: None,
            num_allocated: 0,
            num_cams,
            frame_interval,
            missed_interval: 1.5 * frame_interval,
            dump_interval: 5.0 * frame_interval,
            last_sync_time: 0.0,
        }
    }

    fn allocate(&mut self, t: f64, cam_num: u8, sample: OpticalUpOutput) -> Result<usize, KharonError> {
        let idx = self.free_list.pop().ok_or(KharonError::ArenaExhausted { capacity: self.arena.len() })?;
        self.num_allocated += 1;
        self.arena[idx] = Some(Node { t, cam_num, sample, prev: None, next: None });
        Ok(idx)
    }

    fn free(&mut self, idx: usize) {
        self.arena[idx] = None;
        self.num_allocated -= 1;
        self.free_list.push(idx);
        debug_assert_eq!(self.num_allocated + self.free_list.len(), self.arena.len());
    }

    /// Insert a new frame into the `t`-ascending active list.
    fn add_frame_to_list(&mut self, t: f64, cam_num: u8, sample: OpticalUpOutput) -> Result<(), KharonError> {
        let new_idx = self.allocate(t, cam_num, sample)?;
        let mut cursor = self.head;
        let mut prev: Option<usize> = None;
        while let Some(idx) = cursor {
            if t < self.arena[idx].as_ref().unwrap().t {
                break;
            }
            prev = Some(idx);
            cursor = self.arena[idx].as_ref().unwrap().next;
        }
        self.arena[new_idx].as_mut().unwrap().prev = prev;
        self.arena[new_idx].as_mut().unwrap().next = cursor;
        match prev {
            Some(p) => self.arena[p].as_mut().unwrap().next = Some(new_idx),
            None => self.head = Some(new_idx),
        }
        if let Some(c) = cursor {
            self.arena[c].as_mut().unwrap().prev = Some(new_idx);
        }
        Ok(())
    }

    /// Drop every node with `t <= cutoff`.
    fn purge_old_frames(&mut self, cutoff: f64) {
        while let Some(idx) = self.head {
            if self.arena[idx].as_ref().unwrap().t > cutoff {
                break;
            }
            let next = self.arena[idx].as_ref().unwrap().next;
            self.head = next;
            if let Some(n) = next {
                self.arena[n].as_mut().unwrap().prev = None;
            }
            self.free(idx);
        }
        self.last_sync_time = cutoff;
    }

    /// Walk the active list looking for the first window of `ALIGN_SECS`
    /// containing one node from every camera.
    fn find_next_full_set(&self) -> Option<f64> {
        let mut node = self.head?;
        let mut trailing = node;
        let mut leading = node;
        let mut count = 1usize;
        loop {
            let next = self.arena[node].as_ref().unwrap().next;
            let Some(next) = next else { return None };
            node = next;
            leading = node;
            count += 1;
            while self.arena[trailing].as_ref().unwrap().t < self.arena[leading].as_ref().unwrap().t - ALIGN_SECS {
                trailing = self.arena[trailing].as_ref().unwrap().next.expect("trailing must not outrun leading");
                count -= 1;
            }
            if count == self.num_cams {
                let t0 = self.arena[trailing].as_ref().unwrap().t;
                let t1 = self.arena[leading].as_ref().unwrap().t;
                return Some((t0 + t1) / 2.0);
            }
        }
    }

    /// Search `[ival_start, ival_end]` for the sub-window of `ALIGN_SECS`
    /// containing the most nodes, breaking ties toward the earliest.
    fn find_next_set(&self, ival_start: f64, ival_end: f64) -> Option<f64> {
        let mut node = self.head;
        let mut trailing: Option<usize> = None;
        let mut leading: Option<usize> = None;
        let mut count = 0usize;
        let mut best_count = 0usize;
        let mut best_set_time = None;
        while let Some(idx) = node {
            let t = self.arena[idx].as_ref().unwrap().t;
            if t < ival_start {
                node = self.arena[idx].as_ref().unwrap().next;
                continue;
            }
            if t > ival_end {
                break;
            }
            if trailing.is_none() {
                trailing = Some(idx);
            }
            leading = Some(idx);
            count += 1;
            while self.arena[trailing.unwrap()].as_ref().unwrap().t
                < self.arena[leading.unwrap()].as_ref().unwrap().t - ALIGN_SECS
            {
                trailing = self.arena[trailing.unwrap()].as_ref().unwrap().next;
                count -= 1;
            }
            if count > best_count {
                best_count = count;
                let t0 = self.arena[trailing.unwrap()].as_ref().unwrap().t;
                let t1 = self.arena[leading.unwrap()].as_ref().unwrap().t;
                best_set_time = Some((t0 + t1) / 2.0);
            }
            node = self.arena[idx].as_ref().unwrap().next;
        }
        best_set_time
    }

    /// The three-regime dispatch: stream healthy, momentary drop, stream
    /// lost, each with its own tie-breaking policy.
    fn check_for_frame_set(&mut self, frame_time: f64) -> Option<f64> {
        let dt = frame_time - self.last_sync_time;
        if dt > self.dump_interval {
            self.last_sync_time = frame_time - self.frame_interval;
            self.purge_old_frames(self.last_sync_time);
            None
        } else if dt > self.missed_interval {
            let target = self.last_sync_time + self.frame_interval;
            let ival_start = target - 0.51 * self.frame_interval;
            let ival_end = target + 0.51 * self.frame_interval;
            match self.find_next_set(ival_start, ival_end) {
                Some(t) => {
                    self.last_sync_time = t;
                    Some(t)
                }
                None => {
                    self.last_sync_time += self.frame_interval;
                    let cutoff = self.last_sync_time;
                    self.purge_old_frames(cutoff);
                    None
                }
            }
        } else {
            self.find_next_full_set()
        }
    }

    /// Collect every node within `ALIGN_SECS/2` of `t` into a `FrameSet`,
    /// keeping the first frame seen per camera (duplicates are logged and
    /// the earlier one wins) and purging everything up to `t`.
    fn build_frame_set(&mut self, t: f64) -> FrameSet {
        let mut out = FrameSet::default();
        let mut node = self.head;
        while let Some(idx) = node {
            let n = self.arena[idx].as_ref().unwrap();
            if n.t > t + ALIGN_SECS / 2.0 {
                break;
            }
            if n.t >= t - ALIGN_SECS / 2.0 {
                let cam = n.cam_num as usize;
                if cam < MAX_CAMS {
                    if out.frames[cam].is_none() {
                        out.frames[cam] = Some(n.sample.clone());
                    } else {
                        warn!(cam_num = cam, t = n.t, "duplicate frames from one camera in a frame set");
                    }
                }
            }
            node = n.next;
        }
        self.purge_old_frames(t);
        out
    }
}

pub struct FrameSync {
    name: String,
    producers: Vec<(Arc<Queue<OpticalUpOutput>>, Cursor)>,
    state: FrameSyncState,
    out_queue: Arc<Queue<FrameSet>>,
}

impl FrameSync {
    pub fn new(
        name: impl Into<String>,
        producers: Vec<Arc<Queue<OpticalUpOutput>>>,
        arena_capacity: usize,
        frame_interval: f64,
        out_queue: Arc<Queue<FrameSet>>,
    ) -> Self {
        let num_cams = producers.len();
        FrameSync {
            name: name.into(),
            producers: producers.into_iter().map(|q| (q, Cursor::new())).collect(),
            state: FrameSyncState::new(arena_capacity, num_cams, frame_interval),
            out_queue,
        }
    }

    pub fn out_queue(&self) -> &Arc<Queue<FrameSet>> {
        &self.out_queue
    }

    /// Pop the earliest not-yet-consumed frame across every producer, or
    /// `None` if nothing is waiting.
    fn next_earliest_frame(&mut self) -> Option<(u8, OpticalUpOutput)> {
        let mut best: Option<(usize, f64, OpticalUpOutput)> = None;
        for (i, (queue, cursor)) in self.producers.iter().enumerate() {
            if cursor.has_data(queue) {
                if let Some((t, sample)) = queue.get(cursor.consumed()) {
                    if best.as_ref().map(|(_, bt, _)| t < *bt).unwrap_or(true) {
                        best = Some((i, t, sample));
                    }
                }
            }
        }
        let (i, _, sample) = best?;
        let consumed = self.producers[i].1.consumed();
        self.producers[i].1.advance_to(consumed + 1);
        Some((sample.cam_num, sample))
    }

    fn ingest_one(&mut self, flag: &Flag) -> bool {
        let Some((cam_num, sample)) = self.next_earliest_frame() else { return false };
        let t = sample.t;
        if let Err(e) = self.state.add_frame_to_list(t, cam_num, sample) {
            error!(stage = %self.name, error = %e, "frame node arena exhausted");
            kharon_core::scheduler::hard_exit(&self.name, &e.to_string());
        }
        loop {
            if !flag.is_alive() {
                break;
            }
            match self.state.check_for_frame_set(t) {
                Some(publish_time) => {
                    let set = self.state.build_frame_set(publish_time);
                    self.out_queue.push(publish_time, set);
                }
                None => break,
            }
        }
        true
    }
}

impl kharon_core::scheduler::Stage for FrameSync {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, flag: &Flag) {
        while flag.is_alive() {
            if !self.ingest_one(flag) {
                for (queue, cursor) in &self.producers {
                    if !flag.is_alive() {
                        break;
                    }
                    queue.wait_or_flag(cursor.consumed(), flag);
                }
            }
        }
    }
}
