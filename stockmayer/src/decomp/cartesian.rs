// SPDX-License-Identifier: AGPL-3.0-only

//! Cartesian multi-rank decomposition over an in-process transport.
//!
//! Ranks form a periodic Cartesian grid; every rank runs the same program
//! and owns one subdomain. Point-to-point traffic travels over unbounded
//! channels (posting a send never blocks, mirroring a buffered non-blocking
//! send), receives poll with `try_recv` and unpack each message as soon as
//! it arrives. A deadlock detector warns with per-partner diagnostics after
//! every full second of waiting and aborts the exchange with exit code 457
//! semantics after the hard timeout.
//!
//! Two exchange schemes:
//! - **full shell** (default): one stage, messages to all ≤26 neighbor
//!   directions;
//! - **three stage**: per Cartesian dimension a two-sided face exchange
//!   with regions enlarged in the other dimensions, chaining corner images
//!   across stages; leavers migrate one dimension per stage.
//!
//! Dimensions fully covered by the rank grid take the sequential shortcut
//! (local wrap + periodic copies, no traffic); received copies that would
//! alias a local periodic copy are suppressed by molecule id per halo cell.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};

use crate::cellgrid::CellGrid;
use crate::error::SimError;
use crate::molecule::Molecule;
use crate::tolerances::{DEADLOCK_TIMEOUT_S, DEADLOCK_WARN_INTERVAL_S};

use super::partner::{pack_payload, unpack_payload, CommunicationPartner};
use super::regions::{face_halo_regions, full_shell_halo_regions};
use super::{handle_domain_leaving_dim, populate_halo_dim, Decomposition, MessageType};

/// Which exchange scheme a rank runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeScheme {
    /// One stage, all neighbor directions at once.
    FullShell,
    /// Three directional stages (x, y, z).
    ThreeStage,
}

/// One point-to-point message.
#[derive(Debug)]
pub struct Packet {
    /// Sender rank.
    pub from: usize,
    /// Exchange sequence number (every rank performs collectives in the
    /// same order, so the nth exchange matches across ranks).
    pub seq: u64,
    /// Stage within the exchange.
    pub stage: u8,
    /// Flat molecule records (see the partner module).
    pub payload: Vec<f64>,
}

#[derive(Debug, Default)]
struct ReduceState {
    buf: Vec<f64>,
    arrived: usize,
    generation: u64,
    result: Vec<f64>,
}

/// Shared wiring of all ranks: channel endpoints plus the reduction tree.
#[derive(Debug)]
pub struct RankTopology {
    n: usize,
    senders: Vec<Sender<Packet>>,
    receivers: Mutex<Vec<Option<Receiver<Packet>>>>,
    reduce: Mutex<ReduceState>,
    reduce_cv: Condvar,
}

impl RankTopology {
    /// Wire up `n` ranks.
    #[must_use]
    pub fn new(n: usize) -> Arc<Self> {
        let mut senders = Vec::with_capacity(n);
        let mut receivers = Vec::with_capacity(n);
        for _ in 0..n {
            let (tx, rx) = unbounded();
            senders.push(tx);
            receivers.push(Some(rx));
        }
        Arc::new(Self {
            n,
            senders,
            receivers: Mutex::new(receivers),
            reduce: Mutex::new(ReduceState::default()),
            reduce_cv: Condvar::new(),
        })
    }

    /// Number of ranks.
    #[must_use]
    pub const fn num_ranks(&self) -> usize {
        self.n
    }

    fn take_receiver(&self, rank: usize) -> Result<Receiver<Packet>, SimError> {
        self.receivers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(rank)
            .and_then(Option::take)
            .ok_or_else(|| {
                SimError::Config(format!("rank {rank} endpoint already taken or out of range"))
            })
    }

    fn send(&self, to: usize, packet: Packet) {
        // A hung receiver only shows up as our own deadlock timeout.
        let _ = self.senders[to].send(packet);
    }

    fn all_reduce(&self, vals: &mut [f64], rank: usize, timeout: Duration) -> Result<(), SimError> {
        let mut st = self
            .reduce
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let my_gen = st.generation;
        if st.arrived == 0 {
            st.buf = vals.to_vec();
        } else {
            for (a, b) in st.buf.iter_mut().zip(vals.iter()) {
                *a += *b;
            }
        }
        st.arrived += 1;
        if st.arrived == self.n {
            st.result = std::mem::take(&mut st.buf);
            st.arrived = 0;
            st.generation += 1;
            vals.copy_from_slice(&st.result);
            self.reduce_cv.notify_all();
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        while st.generation == my_gen {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SimError::Deadlock {
                    rank,
                    waited_s: timeout.as_secs_f64(),
                });
            }
            let (guard, _timeout_result) = self
                .reduce_cv
                .wait_timeout(st, remaining)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            st = guard;
        }
        vals.copy_from_slice(&st.result);
        Ok(())
    }
}

/// One rank's view of the Cartesian decomposition.
#[derive(Debug)]
pub struct CartesianDecomposition {
    topo: Arc<RankTopology>,
    rx: Receiver<Packet>,
    pending: VecDeque<Packet>,
    /// Leavers received mid-chain that are still outside this subdomain:
    /// the three-stage scheme migrates one dimension per stage, so a
    /// corner-crossing molecule hops rank to rank and is parked here
    /// between its hops.
    forward_queue: Vec<Molecule>,
    rank: usize,
    grid_dims: [usize; 3],
    coords: [usize; 3],
    length: [f64; 3],
    cutoff: f64,
    covers: [bool; 3],
    scheme: ExchangeScheme,
    /// Full-shell partners, or per-stage face partners for three-stage.
    partners: Vec<Vec<CommunicationPartner>>,
    seq: u64,
    /// Hard deadlock timeout; tests shrink it.
    pub timeout_s: f64,
}

impl CartesianDecomposition {
    /// Bind this rank into a `gx × gy × gz` grid over the global box.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] for inconsistent grid/rank parameters,
    /// [`SimError::Geometry`] if a subdomain cannot hold one cutoff.
    pub fn new(
        topo: &Arc<RankTopology>,
        rank: usize,
        grid_dims: [usize; 3],
        length: [f64; 3],
        cutoff: f64,
        scheme: ExchangeScheme,
    ) -> Result<Self, SimError> {
        let n = grid_dims[0] * grid_dims[1] * grid_dims[2];
        if n != topo.num_ranks() {
            return Err(SimError::Config(format!(
                "rank grid {grid_dims:?} holds {n} ranks but the topology has {}",
                topo.num_ranks()
            )));
        }
        if rank >= n {
            return Err(SimError::Config(format!("rank {rank} outside grid of {n}")));
        }
        let coords = [
            rank % grid_dims[0],
            (rank / grid_dims[0]) % grid_dims[1],
            rank / (grid_dims[0] * grid_dims[1]),
        ];
        let mut covers = [false; 3];
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for d in 0..3 {
            covers[d] = grid_dims[d] == 1;
            let w = length[d] / grid_dims[d] as f64;
            if w < cutoff {
                return Err(SimError::Geometry(format!(
                    "subdomain width {w} in dim {d} is below the cutoff {cutoff}"
                )));
            }
            lo[d] = coords[d] as f64 * w;
            hi[d] = (coords[d] + 1) as f64 * w;
        }

        let mut me = Self {
            topo: Arc::clone(topo),
            rx: topo.take_receiver(rank)?,
            pending: VecDeque::new(),
            forward_queue: Vec::new(),
            rank,
            grid_dims,
            coords,
            length,
            cutoff,
            covers,
            scheme,
            partners: Vec::new(),
            seq: 0,
            timeout_s: DEADLOCK_TIMEOUT_S,
        };
        me.init_communication_partners(lo, hi);
        Ok(me)
    }

    fn neighbor_rank_and_shift(&self, dir: [i32; 3]) -> (usize, [f64; 3]) {
        let mut c = [0usize; 3];
        let mut shift = [0.0; 3];
        for d in 0..3 {
            let raw = self.coords[d] as i64 + i64::from(dir[d]);
            let np = self.grid_dims[d] as i64;
            if raw < 0 {
                c[d] = (raw + np) as usize;
                shift[d] = self.length[d];
            } else if raw >= np {
                c[d] = (raw - np) as usize;
                shift[d] = -self.length[d];
            } else {
                c[d] = raw as usize;
            }
        }
        let rank = c[0] + self.grid_dims[0] * (c[1] + self.grid_dims[1] * c[2]);
        (rank, shift)
    }

    fn init_communication_partners(&mut self, lo: [f64; 3], hi: [f64; 3]) {
        match self.scheme {
            ExchangeScheme::FullShell => {
                let mut stage0 = Vec::new();
                for region in full_shell_halo_regions(lo, hi, self.cutoff, self.covers) {
                    let (rank, shift) = self.neighbor_rank_and_shift(region.direction);
                    let face_dim = region.face_dimension();
                    stage0.push(CommunicationPartner {
                        rank,
                        direction: region.direction,
                        shift,
                        halo_region: region,
                        face_dim,
                    });
                }
                self.partners = vec![stage0];
            }
            ExchangeScheme::ThreeStage => {
                self.partners = (0..3)
                    .map(|d| {
                        if self.covers[d] {
                            return Vec::new();
                        }
                        face_halo_regions(lo, hi, self.cutoff, d)
                            .into_iter()
                            .map(|region| {
                                let (rank, shift) = self.neighbor_rank_and_shift(region.direction);
                                CommunicationPartner {
                                    rank,
                                    direction: region.direction,
                                    shift,
                                    halo_region: region,
                                    face_dim: Some(d),
                                }
                            })
                            .collect()
                    })
                    .collect();
            }
        }
    }

    /// Direction of a leaver relative to this subdomain (covered
    /// dimensions are always 0 — they were wrapped locally).
    fn leaving_direction(&self, pos: [f64; 3]) -> [i32; 3] {
        let (lo, hi) = self.bounding_box();
        let mut dir = [0i32; 3];
        for d in 0..3 {
            if self.covers[d] {
                continue;
            }
            if pos[d] < lo[d] {
                dir[d] = -1;
            } else if pos[d] >= hi[d] {
                dir[d] = 1;
            }
        }
        dir
    }

    /// Re-home queued mid-chain leavers: wrap the locally covered
    /// dimensions and install everything now owned; the rest keeps waiting
    /// for its next hop.
    fn drain_forward_queue(&mut self, grid: &mut CellGrid) {
        let queued = std::mem::take(&mut self.forward_queue);
        for mut m in queued {
            for d in 0..3 {
                if self.covers[d] && (m.r[d] < 0.0 || m.r[d] >= self.length[d]) {
                    m.r[d] -= self.length[d] * (m.r[d] / self.length[d]).floor();
                    if m.r[d] >= self.length[d] {
                        m.r[d] -= self.length[d];
                    }
                }
            }
            if self.owns_position(m.r) {
                grid.insert_owned(m);
            } else {
                self.forward_queue.push(m);
            }
        }
    }

    fn post_stage_sends(&mut self, grid: &mut CellGrid, stage: usize, msg_type: MessageType) {
        // Route leavers to partner directions. Under the three-stage scheme
        // only this stage's dimension migrates; molecules still outside in a
        // later dimension travel onward next stage (or on the new owner).
        let mut per_partner_leaving: Vec<Vec<Molecule>> =
            vec![Vec::new(); self.partners[stage].len()];
        if msg_type.sends_leaving() {
            let mut candidates = grid.collect_leaving();
            candidates.append(&mut self.forward_queue);
            let mut keep = Vec::new();
            for mut m in candidates {
                // Mid-chain arrivals may still carry unwrapped coordinates
                // in the locally covered dimensions.
                for d in 0..3 {
                    if self.covers[d] && (m.r[d] < 0.0 || m.r[d] >= self.length[d]) {
                        m.r[d] -= self.length[d] * (m.r[d] / self.length[d]).floor();
                        if m.r[d] >= self.length[d] {
                            m.r[d] -= self.length[d];
                        }
                    }
                }
                let full_dir = self.leaving_direction(m.r);
                let route_dir = match self.scheme {
                    ExchangeScheme::FullShell => full_dir,
                    ExchangeScheme::ThreeStage => {
                        let mut d = [0i32; 3];
                        d[stage] = full_dir[stage];
                        d
                    }
                };
                if route_dir == [0, 0, 0] {
                    if self.owns_position(m.r) {
                        keep.push(m);
                    } else {
                        // Outside in a later stage's dimension.
                        self.forward_queue.push(m);
                    }
                    continue;
                }
                match self.partners[stage]
                    .iter()
                    .position(|p| p.direction == route_dir)
                {
                    Some(idx) => per_partner_leaving[idx].push(m),
                    None => {
                        warn!(
                            "rank {}: leaver {} with no partner for direction {route_dir:?}",
                            self.rank, m.id
                        );
                        keep.push(m);
                    }
                }
            }
            for m in keep {
                grid.insert_owned(m);
            }
        }

        for (idx, partner) in self.partners[stage].iter().enumerate() {
            let mut leaving = std::mem::take(&mut per_partner_leaving[idx]);
            for m in &mut leaving {
                for d in 0..3 {
                    m.r[d] += partner.shift[d];
                }
            }
            let halo = if msg_type.sends_halo() {
                partner.pack_halo(grid)
            } else {
                Vec::new()
            };
            debug!(
                "rank {} is initiating communication to rank {} ({} leaving, {} halo)",
                self.rank,
                partner.rank,
                leaving.len(),
                halo.len()
            );
            self.topo.send(
                partner.rank,
                Packet {
                    from: self.rank,
                    seq: self.seq,
                    stage: stage as u8,
                    payload: pack_payload(&leaving, &halo),
                },
            );
        }
    }

    fn install_payload(&mut self, grid: &mut CellGrid, payload: &[f64], from: usize) {
        let (leaving, halo) = unpack_payload(payload, from);
        let dedup = self.covers.iter().any(|&c| c);
        for m in leaving {
            if self.owns_position(m.r) {
                grid.insert_owned(m);
            } else {
                // Three-stage corner route: the molecule hops onward in a
                // later stage (or, after a local wrap, turns out owned).
                debug!(
                    "rank {}: received leaver {} outside own box at {:?}; queued for forwarding",
                    self.rank, m.id, m.r
                );
                self.forward_queue.push(m);
            }
        }
        for m in halo {
            grid.insert_halo(m, dedup);
        }
    }
}

impl Decomposition for CartesianDecomposition {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_ranks(&self) -> usize {
        self.topo.num_ranks()
    }

    fn bounding_box(&self) -> ([f64; 3], [f64; 3]) {
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for d in 0..3 {
            let w = self.length[d] / self.grid_dims[d] as f64;
            lo[d] = self.coords[d] as f64 * w;
            hi[d] = (self.coords[d] + 1) as f64 * w;
        }
        (lo, hi)
    }

    fn stage_count(&self) -> usize {
        match self.scheme {
            ExchangeScheme::FullShell => 1,
            ExchangeScheme::ThreeStage => 3,
        }
    }

    fn stage_init(
        &mut self,
        grid: &mut CellGrid,
        stage: usize,
        msg_type: MessageType,
    ) -> Result<(), SimError> {
        self.seq += 1;
        match self.scheme {
            ExchangeScheme::FullShell => {
                // All periodic wraps before any copies, so every covered
                // dimension sees wrapped coordinates.
                if msg_type.sends_leaving() {
                    for d in 0..3 {
                        if self.covers[d] {
                            handle_domain_leaving_dim(grid, self.length, d);
                        }
                    }
                }
                if msg_type.sends_halo() {
                    for d in 0..3 {
                        if self.covers[d] {
                            populate_halo_dim(grid, self.length, self.cutoff, d);
                        }
                    }
                }
            }
            ExchangeScheme::ThreeStage => {
                if self.covers[stage] {
                    if msg_type.sends_leaving() {
                        handle_domain_leaving_dim(grid, self.length, stage);
                    }
                    // Mid-chain arrivals wrap here and join the grid before
                    // the periodic copies are made.
                    self.drain_forward_queue(grid);
                    if msg_type.sends_halo() {
                        populate_halo_dim(grid, self.length, self.cutoff, stage);
                    }
                    return Ok(());
                }
            }
        }
        self.post_stage_sends(grid, stage, msg_type);
        Ok(())
    }

    fn stage_finish(
        &mut self,
        grid: &mut CellGrid,
        stage: usize,
        _msg_type: MessageType,
    ) -> Result<(), SimError> {
        let expected = self.partners[stage].len();
        if expected == 0 {
            return Ok(());
        }
        let mut received = vec![false; expected];
        let mut n_received = 0usize;
        let start = Instant::now();
        let mut warn_at = DEADLOCK_WARN_INTERVAL_S;

        // Non-blocking progress loop: unpack each message as soon as its
        // payload is available.
        while n_received < expected {
            // Anything parked from a previous poll that matches this stage?
            let mut matched = None;
            for (i, p) in self.pending.iter().enumerate() {
                if p.seq == self.seq && usize::from(p.stage) == stage {
                    matched = Some(i);
                    break;
                }
            }
            let packet = if let Some(i) = matched {
                self.pending.remove(i)
            } else {
                match self.rx.try_recv() {
                    Ok(p) if p.seq == self.seq && usize::from(p.stage) == stage => Some(p),
                    Ok(p) => {
                        self.pending.push_back(p);
                        None
                    }
                    Err(_) => None,
                }
            };

            if let Some(packet) = packet {
                if let Some(slot) = self.partners[stage]
                    .iter()
                    .zip(received.iter_mut())
                    .find(|(p, done)| p.rank == packet.from && !**done)
                    .map(|(_, done)| done)
                {
                    *slot = true;
                }
                self.install_payload(grid, &packet.payload, packet.from);
                n_received += 1;
                continue;
            }

            let waited = start.elapsed().as_secs_f64();
            if waited > warn_at {
                warn!(
                    "finalize exchange: deadlock warning: rank {} is waiting for more than {warn_at:.0} seconds",
                    self.rank
                );
                for (p, done) in self.partners[stage].iter().zip(received.iter()) {
                    warn!("  {}", p.diagnostic(true, *done));
                }
                warn_at += DEADLOCK_WARN_INTERVAL_S;
            }
            if waited > self.timeout_s {
                warn!(
                    "finalize exchange: deadlock error: rank {} is waiting for more than {:.0} seconds",
                    self.rank, self.timeout_s
                );
                for (p, done) in self.partners[stage].iter().zip(received.iter()) {
                    warn!("  {}", p.diagnostic(true, *done));
                }
                return Err(SimError::Deadlock {
                    rank: self.rank,
                    waited_s: waited,
                });
            }
            std::thread::yield_now();
        }
        Ok(())
    }

    fn reduce_sum(&self, vals: &mut [f64]) -> Result<(), SimError> {
        self.topo
            .all_reduce(vals, self.rank, Duration::from_secs_f64(self.timeout_s))
    }

    fn barrier(&self) -> Result<(), SimError> {
        self.reduce_sum(&mut [])
    }
}
