// SPDX-License-Identifier: AGPL-3.0-only

//! Halo region enumeration.
//!
//! A halo region is an axis-aligned box relative to a rank's subdomain,
//! tagged with the neighbor direction it is sent toward. The full-shell
//! scheme emits one region per non-covered direction of the 26-neighbor
//! stencil; directional (face) regions drive the 3-stage scheme, enlarged
//! in the other dimensions so corner images chain across stages.

/// One outgoing region: molecules inside `[low, high)` are packed for the
/// neighbor in `direction`.
#[derive(Debug, Clone)]
pub struct HaloRegion {
    /// Inclusive lower corner.
    pub low: [f64; 3],
    /// Exclusive upper corner.
    pub high: [f64; 3],
    /// Neighbor direction in rank-grid steps, each component in {−1,0,1}.
    pub direction: [i32; 3],
}

impl HaloRegion {
    /// True if this region targets a face-sharing neighbor (exactly one
    /// nonzero direction component) and thus participates in the 3-stage
    /// scheme.
    #[must_use]
    pub fn face_dimension(&self) -> Option<usize> {
        let nonzero: Vec<usize> = (0..3).filter(|&d| self.direction[d] != 0).collect();
        match nonzero.as_slice() {
            [d] => Some(*d),
            _ => None,
        }
    }

    /// Widen the region by `amount` in every dimension except `keep`.
    pub fn enlarge_in_other_directions(&mut self, keep: usize, amount: f64) {
        for d in 0..3 {
            if d != keep {
                self.low[d] -= amount;
                self.high[d] += amount;
            }
        }
    }
}

/// The 26 neighbor directions.
fn directions() -> impl Iterator<Item = [i32; 3]> {
    (-1..=1).flat_map(move |z| {
        (-1..=1).flat_map(move |y| {
            (-1..=1)
                .map(move |x| [x, y, z])
                .filter(|&d| d != [0, 0, 0])
        })
    })
}

/// Full-shell enumerator: one halo-copy region per neighbor direction.
///
/// Directions stepping a covered dimension are omitted (those copies are
/// made locally by the periodic shortcut); in covered dimensions with a
/// zero step the region extends one cutoff beyond the subdomain so the
/// locally installed periodic images are forwarded too.
#[must_use]
pub fn full_shell_halo_regions(
    own_lo: [f64; 3],
    own_hi: [f64; 3],
    cutoff: f64,
    covers: [bool; 3],
) -> Vec<HaloRegion> {
    let mut out = Vec::new();
    for dir in directions() {
        if (0..3).any(|d| dir[d] != 0 && covers[d]) {
            continue;
        }
        let mut low = [0.0; 3];
        let mut high = [0.0; 3];
        for d in 0..3 {
            match dir[d] {
                -1 => {
                    low[d] = own_lo[d];
                    high[d] = own_lo[d] + cutoff;
                }
                1 => {
                    low[d] = own_hi[d] - cutoff;
                    high[d] = own_hi[d];
                }
                _ => {
                    if covers[d] {
                        low[d] = own_lo[d] - cutoff;
                        high[d] = own_hi[d] + cutoff;
                    } else {
                        low[d] = own_lo[d];
                        high[d] = own_hi[d];
                    }
                }
            }
        }
        out.push(HaloRegion {
            low,
            high,
            direction: dir,
        });
    }
    out
}

/// Face regions for one dimension of the 3-stage scheme, already enlarged
/// in the other dimensions by one cutoff.
#[must_use]
pub fn face_halo_regions(
    own_lo: [f64; 3],
    own_hi: [f64; 3],
    cutoff: f64,
    dim: usize,
) -> Vec<HaloRegion> {
    let mut out = Vec::new();
    for sign in [-1i32, 1] {
        let mut dir = [0i32; 3];
        dir[dim] = sign;
        let mut low = own_lo;
        let mut high = own_hi;
        if sign < 0 {
            high[dim] = own_lo[dim] + cutoff;
        } else {
            low[dim] = own_hi[dim] - cutoff;
        }
        let mut region = HaloRegion {
            low,
            high,
            direction: dir,
        };
        region.enlarge_in_other_directions(dim, cutoff);
        out.push(region);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_shell_emits_26_regions_uncovered() {
        let r = full_shell_halo_regions([0.0; 3], [10.0; 3], 2.5, [false; 3]);
        assert_eq!(r.len(), 26);
        let faces = r.iter().filter(|x| x.face_dimension().is_some()).count();
        assert_eq!(faces, 6);
    }

    #[test]
    fn covered_dimension_prunes_directions() {
        // y covered: only directions with dy == 0 remain (3×1×3 − 1 = 8).
        let r = full_shell_halo_regions([0.0; 3], [10.0; 3], 2.5, [false, true, false]);
        assert_eq!(r.len(), 8);
        assert!(r.iter().all(|x| x.direction[1] == 0));
        // and their y extent covers the periodic images
        for x in &r {
            assert_eq!(x.low[1], -2.5);
            assert_eq!(x.high[1], 12.5);
        }
    }

    #[test]
    fn face_region_geometry() {
        let r = face_halo_regions([0.0; 3], [10.0; 3], 2.5, 0);
        assert_eq!(r.len(), 2);
        let low_face = &r[0];
        assert_eq!(low_face.direction, [-1, 0, 0]);
        assert_eq!(low_face.low[0], 0.0);
        assert_eq!(low_face.high[0], 2.5);
        // enlarged in y and z
        assert_eq!(low_face.low[1], -2.5);
        assert_eq!(low_face.high[2], 12.5);
        assert_eq!(low_face.face_dimension(), Some(0));
    }

    #[test]
    fn corner_region_is_cutoff_cubed() {
        let r = full_shell_halo_regions([0.0; 3], [10.0; 3], 2.5, [false; 3]);
        let corner = r
            .iter()
            .find(|x| x.direction == [1, 1, 1])
            .map(|x| {
                (0..3)
                    .map(|d| x.high[d] - x.low[d])
                    .fold(1.0, |acc, w| acc * w)
            });
        assert!(corner.is_some());
        let vol = corner.unwrap_or(0.0);
        assert!((vol - 2.5f64.powi(3)).abs() < 1e-12);
    }
}
