// SPDX-License-Identifier: AGPL-3.0-only

//! Communication partners and the molecule wire format.
//!
//! One partner per outgoing region direction: target rank, the region to
//! pack, the periodic shift to apply while packing, and the face flag the
//! 3-stage scheme selects on. Payloads are flat f64 buffers: a two-entry
//! header (leaving count, halo count) followed by fixed-size molecule
//! records. A truncated payload is tolerated — the short tail unpacks as
//! zero molecules and the exchange continues (transient pack fault).

use log::warn;

use crate::cellgrid::CellGrid;
use crate::molecule::{Molecule, MOL_RECORD_LEN};

use super::regions::HaloRegion;

/// One neighbor relationship of this rank.
#[derive(Debug, Clone)]
pub struct CommunicationPartner {
    /// Destination rank.
    pub rank: usize,
    /// Direction in rank-grid steps.
    pub direction: [i32; 3],
    /// Position shift applied while packing (±L where the neighbor wraps
    /// around the global box, zero elsewhere).
    pub shift: [f64; 3],
    /// Halo-copy source region inside (or overlapping) this subdomain.
    pub halo_region: HaloRegion,
    /// Face dimension if this partner participates in the 3-stage scheme.
    pub face_dim: Option<usize>,
}

impl CommunicationPartner {
    /// Pack halo copies for this partner: every molecule (owned or already
    /// installed halo image) inside the region, shifted.
    #[must_use]
    pub fn pack_halo(&self, grid: &CellGrid) -> Vec<Molecule> {
        let mut out = grid.collect_region_with_halo(self.halo_region.low, self.halo_region.high);
        for m in &mut out {
            for d in 0..3 {
                m.r[d] += self.shift[d];
            }
        }
        out
    }

    /// One-line state description for deadlock diagnostics.
    #[must_use]
    pub fn diagnostic(&self, sent: bool, received: bool) -> String {
        format!(
            "partner rank {} dir {:?}: send {}, recv {}",
            self.rank,
            self.direction,
            if sent { "done" } else { "pending" },
            if received { "done" } else { "pending" },
        )
    }
}

/// Serialize an exchange message: header then records.
#[must_use]
pub fn pack_payload(leaving: &[Molecule], halo: &[Molecule]) -> Vec<f64> {
    let mut buf = Vec::with_capacity(2 + (leaving.len() + halo.len()) * MOL_RECORD_LEN);
    buf.push(leaving.len() as f64);
    buf.push(halo.len() as f64);
    for m in leaving {
        m.pack_into(&mut buf);
    }
    for m in halo {
        m.pack_into(&mut buf);
    }
    buf
}

/// Deserialize an exchange message into (leaving, halo) molecule lists.
///
/// A payload shorter than its header promises yields only the complete
/// records and logs a warning; the exchange continues.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // counts fit usize by construction
pub fn unpack_payload(payload: &[f64], from_rank: usize) -> (Vec<Molecule>, Vec<Molecule>) {
    if payload.len() < 2 {
        warn!("rank {from_rank}: exchange message shorter than its header; dropping");
        return (Vec::new(), Vec::new());
    }
    let n_leaving = payload[0] as usize;
    let n_halo = payload[1] as usize;
    let expected = 2 + (n_leaving + n_halo) * MOL_RECORD_LEN;
    let complete = (payload.len().saturating_sub(2)) / MOL_RECORD_LEN;
    if payload.len() < expected {
        warn!(
            "rank {from_rank}: exchange message truncated ({} of {} records); \
             unpacking the complete prefix",
            complete,
            n_leaving + n_halo
        );
    }
    let n_leaving_avail = n_leaving.min(complete);
    let n_halo_avail = n_halo.min(complete.saturating_sub(n_leaving_avail));

    let mut leaving = Vec::with_capacity(n_leaving_avail);
    let mut halo = Vec::with_capacity(n_halo_avail);
    let mut off = 2;
    for _ in 0..n_leaving_avail {
        leaving.push(Molecule::unpack_from(&payload[off..off + MOL_RECORD_LEN]));
        off += MOL_RECORD_LEN;
    }
    for _ in 0..n_halo_avail {
        halo.push(Molecule::unpack_from(&payload[off..off + MOL_RECORD_LEN]));
        off += MOL_RECORD_LEN;
    }
    (leaving, halo)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn mol(id: u64, x: f64) -> Molecule {
        Molecule::new(id, 0, [x, 1.0, 2.0], [0.1, 0.2, 0.3])
    }

    #[test]
    fn payload_round_trip() {
        let leaving = vec![mol(1, 0.5), mol(2, 1.5)];
        let halo = vec![mol(3, 9.5)];
        let buf = pack_payload(&leaving, &halo);
        assert_eq!(buf.len(), 2 + 3 * MOL_RECORD_LEN);
        let (l, h) = unpack_payload(&buf, 0);
        assert_eq!(l.len(), 2);
        assert_eq!(h.len(), 1);
        assert_eq!(l[0].id, 1);
        assert_eq!(h[0].id, 3);
        assert_eq!(h[0].r[0], 9.5);
    }

    #[test]
    fn truncated_payload_unpacks_prefix() {
        let leaving = vec![mol(1, 0.5), mol(2, 1.5)];
        let buf = pack_payload(&leaving, &[]);
        // Drop the last record's tail.
        let cut = &buf[..buf.len() - 5];
        let (l, h) = unpack_payload(cut, 7);
        assert_eq!(l.len(), 1, "only the complete record survives");
        assert!(h.is_empty());
        assert_eq!(l[0].id, 1);
    }

    #[test]
    fn empty_payload_is_tolerated() {
        let (l, h) = unpack_payload(&[], 3);
        assert!(l.is_empty());
        assert!(h.is_empty());
    }

    #[test]
    fn packing_applies_shift() {
        let mut grid = CellGrid::new([0.0; 3], [10.0; 3], 2.5).unwrap();
        grid.insert_owned(mol(1, 0.5));
        let partner = CommunicationPartner {
            rank: 1,
            direction: [-1, 0, 0],
            shift: [10.0, 0.0, 0.0],
            halo_region: HaloRegion {
                low: [0.0, 0.0, 0.0],
                high: [2.5, 10.0, 10.0],
                direction: [-1, 0, 0],
            },
            face_dim: Some(0),
        };
        let packed = partner.pack_halo(&grid);
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].r[0], 10.5, "shifted into the receiver's frame");
    }
}
