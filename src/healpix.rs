//! HEALPix (Hierarchical Equal Area isoLatitude Pixelisation) in the nested scheme.
//!
//! The sphere is split into 12 base faces:
//! - 0–3: north polar cap
//! - 4–7: equatorial belt
//! - 8–11: south polar cap
//!
//! Each face is an `nside × nside` grid addressed by `(ix, iy)`. A nested id is
//! `face * nside² + morton(ix, iy)`, with `ix` on the even bits and `iy` on the
//! odd bits, so the four children of pixel `h` at depth `d` are `4h..4h+4` at
//! depth `d + 1`.
//!
//! Internally positions are carried as `z = sin(lat)` and `phi = lon`.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

use crate::geom::sphere::angular_distance;

/// Deepest supported level; `npix` still fits in a `u64`.
pub const MAX_DEPTH: u8 = 29;

/// Inflation applied to the maximum pixel radius when testing disc overlap.
const PIXRAD_MARGIN: f64 = 1.1;

/// Ring (in units of nside) of each face's southern corner.
const FACE_RING: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];

/// Longitude (in units of π/4) of each face's centre.
const FACE_PHI: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

/// Nside for a given depth: 2^depth.
pub fn nside(depth: u8) -> u64 {
    1u64 << depth
}

/// Total number of pixels at a given depth: 12 * nside^2.
pub fn npix(depth: u8) -> u64 {
    12 << (2 * depth as u32)
}

/// Solid angle (steradians) of a single pixel at the given depth.
pub fn pixel_area(depth: u8) -> f64 {
    4.0 * PI / npix(depth) as f64
}

/// Largest angular distance (radians) from any pixel centre to one of its
/// corners at the given depth.
///
/// Attained between the centre of the pixel just south of the transition
/// latitude and the nearest pole-side vertex.
pub fn max_pixel_radius(depth: u8) -> f64 {
    let ns = nside(depth) as f64;
    let va = vector_from_z_phi(2.0 / 3.0, PI / (4.0 * ns));
    let t1 = (1.0 - 1.0 / ns).powi(2);
    let vb = vector_from_z_phi(1.0 - t1 / 3.0, 0.0);
    angular_distance(va, vb)
}

/// Convert (lon, lat) in radians to a nested HEALPix pixel index.
///
/// `lon` is right ascension (or longitude); any value is wrapped into
/// [0, 2π). `lat` is declination (or latitude) in [-π/2, π/2].
pub fn lon_lat_to_nested(lon: f64, lat: f64, depth: u8) -> u64 {
    z_phi_to_nested(lat.sin(), lon, depth)
}

/// Convert a unit vector to a nested HEALPix pixel index.
pub fn vector_to_nested(v: [f64; 3], depth: u8) -> u64 {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    z_phi_to_nested(v[2] / norm, v[1].atan2(v[0]), depth)
}

/// Convert a nested HEALPix pixel index to the (lon, lat) of its center.
///
/// Returns (lon, lat) in radians.
pub fn nested_to_center(hash: u64, depth: u8) -> (f64, f64) {
    let (z, phi) = nested_to_z_phi(hash, depth);
    (phi, z.clamp(-1.0, 1.0).asin())
}

/// Unit vector of a pixel centre.
pub fn nested_to_vector(hash: u64, depth: u8) -> [f64; 3] {
    let (z, phi) = nested_to_z_phi(hash, depth);
    vector_from_z_phi(z, phi)
}

/// Pixels at `depth` whose cells may intersect the disc of angular `radius`
/// (radians) around the unit vector `center`.
///
/// Inclusive: every pixel that touches the disc is returned, together with
/// a thin fringe of pixels that lie just outside it. The result is sorted
/// ascending and contains no duplicates.
///
/// Descends from the 12 base pixels, keeping a pixel at each level when its
/// centre lies within `radius` plus that level's maximum pixel radius.
/// A child can only touch the disc if its parent does, so pruned branches
/// never hide an overlapping pixel.
pub fn query_disc(depth: u8, center: [f64; 3], radius: f64) -> Vec<u64> {
    if radius >= PI {
        return (0..npix(depth)).collect();
    }

    let mut candidates: Vec<u64> = (0..12).collect();
    for level in 0..=depth {
        let reach = radius + PIXRAD_MARGIN * max_pixel_radius(level);
        candidates.retain(|&hash| angular_distance(center, nested_to_vector(hash, level)) <= reach);
        if level == depth {
            break;
        }
        candidates = candidates
            .iter()
            .flat_map(|&hash| (4 * hash)..(4 * hash + 4))
            .collect();
    }

    debug_assert!(candidates.windows(2).all(|w| w[0] < w[1]));
    candidates
}

fn vector_from_z_phi(z: f64, phi: f64) -> [f64; 3] {
    let sin_theta = (1.0 - z * z).max(0.0).sqrt();
    [sin_theta * phi.cos(), sin_theta * phi.sin(), z]
}

// ---------------------------------------------------------------------------
// Internal: (z, phi) ↔ (face, ix, iy)
// ---------------------------------------------------------------------------

fn z_phi_to_nested(z: f64, phi: f64, depth: u8) -> u64 {
    let ns = nside(depth) as i64;
    let nsf = ns as f64;

    // Longitude in quarter turns, [0, 4).
    let mut tt = phi.rem_euclid(TAU) / FRAC_PI_2;
    if tt >= 4.0 {
        tt -= 4.0;
    }

    let (face, ix, iy) = if z.abs() <= 2.0 / 3.0 {
        // Equatorial belt: locate the pixel between the ascending and
        // descending edge lines through the point.
        let t1 = nsf * (0.5 + tt);
        let t2 = nsf * z * 0.75;
        let jp = (t1 - t2) as i64;
        let jm = (t1 + t2) as i64;
        let (ifp, ifm) = (jp >> depth, jm >> depth);
        let face = if ifp == ifm {
            ifp | 4
        } else if ifp < ifm {
            ifp
        } else {
            ifm + 8
        };
        (face, jm & (ns - 1), ns - (jp & (ns - 1)) - 1)
    } else {
        let quarter = (tt as i64).min(3);
        let tp = tt - quarter as f64;
        let scale = nsf * (3.0 * (1.0 - z.abs())).sqrt();
        let jp = ((tp * scale) as i64).min(ns - 1);
        let jm = (((1.0 - tp) * scale) as i64).min(ns - 1);
        if z > 0.0 {
            (quarter, ns - jm - 1, ns - jp - 1)
        } else {
            (quarter + 8, jp, jm)
        }
    };

    ((face as u64) << (2 * depth as u32)) | spread_bits(ix as u64) | (spread_bits(iy as u64) << 1)
}

fn nested_to_z_phi(hash: u64, depth: u8) -> (f64, f64) {
    let ns = nside(depth) as i64;
    let shift = 2 * depth as u32;
    let face = (hash >> shift) as usize;
    let local = hash & ((1u64 << shift) - 1);
    let ix = compact_bits(local) as i64;
    let iy = compact_bits(local >> 1) as i64;

    // Ring number counted from the north pole, 1..4ns-1.
    let ring = (FACE_RING[face] << depth) - ix - iy - 1;
    let npix = npix(depth) as f64;

    let (z, ring_len) = if ring < ns {
        (1.0 - (ring * ring) as f64 * 4.0 / npix, ring)
    } else if ring > 3 * ns {
        let r = 4 * ns - ring;
        ((r * r) as f64 * 4.0 / npix - 1.0, r)
    } else {
        ((2 * ns - ring) as f64 * 2.0 / (3.0 * ns as f64), ns)
    };

    let mut step = FACE_PHI[face] * ring_len + ix - iy;
    if step < 0 {
        step += 8 * ring_len;
    }
    let phi = FRAC_PI_4 * step as f64 / ring_len as f64;
    (z, phi.rem_euclid(TAU))
}

// ---------------------------------------------------------------------------
// Internal: Morton interleave
// ---------------------------------------------------------------------------

/// Spread the low 32 bits of `v` onto the even bit positions.
fn spread_bits(v: u64) -> u64 {
    let mut v = v & 0x0000_0000_FFFF_FFFF;
    v = (v | (v << 16)) & 0x0000_FFFF_0000_FFFF;
    v = (v | (v << 8)) & 0x00FF_00FF_00FF_00FF;
    v = (v | (v << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    v = (v | (v << 2)) & 0x3333_3333_3333_3333;
    (v | (v << 1)) & 0x5555_5555_5555_5555
}

/// Gather the even bits of `v` into the low 32 bits.
fn compact_bits(v: u64) -> u64 {
    let mut v = v & 0x5555_5555_5555_5555;
    v = (v | (v >> 1)) & 0x3333_3333_3333_3333;
    v = (v | (v >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    v = (v | (v >> 4)) & 0x00FF_00FF_00FF_00FF;
    v = (v | (v >> 8)) & 0x0000_FFFF_0000_FFFF;
    (v | (v >> 16)) & 0x0000_0000_FFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::sphere::direction_vector;

    #[test]
    fn nside_and_npix() {
        assert_eq!(nside(0), 1);
        assert_eq!(nside(4), 16);
        assert_eq!(npix(0), 12);
        assert_eq!(npix(1), 48);
        assert_eq!(npix(10), 12 * 1024 * 1024);
        assert_eq!(npix(MAX_DEPTH), 12 * (1u64 << 58));
    }

    #[test]
    fn areas_cover_the_sphere() {
        for depth in [0, 3, 12] {
            let total = pixel_area(depth) * npix(depth) as f64;
            assert!((total - 4.0 * PI).abs() < 1e-9, "depth {depth}: {total}");
        }
    }

    #[test]
    fn known_pixel_ids() {
        // Base faces: the equator at lon 0 and lon π sits in faces 4 and 6.
        assert_eq!(lon_lat_to_nested(0.0, 0.0, 0), 4);
        assert_eq!(lon_lat_to_nested(PI, 0.0, 0), 6);
        assert_eq!(lon_lat_to_nested(FRAC_PI_4, 1.2, 0), 0);
        assert_eq!(lon_lat_to_nested(FRAC_PI_4, -1.2, 0), 8);
        // Pole pixels at nside 2.
        assert_eq!(lon_lat_to_nested(0.0, FRAC_PI_2, 1), 3);
        assert_eq!(lon_lat_to_nested(0.0, -FRAC_PI_2, 1), 32);
    }

    #[test]
    fn base_face_centres() {
        let lat_cap = (2.0f64 / 3.0).asin();
        for face in 0..4u64 {
            let (lon, lat) = nested_to_center(face, 0);
            assert!((lon - FRAC_PI_4 * (2 * face + 1) as f64).abs() < 1e-12);
            assert!((lat - lat_cap).abs() < 1e-12);
        }
        let (lon, lat) = nested_to_center(4, 0);
        assert!(lon.abs() < 1e-12 && lat.abs() < 1e-12);
        let (_, lat) = nested_to_center(11, 0);
        assert!((lat + lat_cap).abs() < 1e-12);
    }

    #[test]
    fn point_lies_near_its_pixel_centre() {
        for depth in [1, 4, 9] {
            for i in 0..200 {
                let lon = (i as f64 * 2.399963).rem_euclid(TAU);
                let lat = (1.0 - 2.0 * (i as f64 + 0.5) / 200.0).asin();
                let hash = lon_lat_to_nested(lon, lat, depth);
                assert!(hash < npix(depth));
                let d = angular_distance(direction_vector(lon, lat), nested_to_vector(hash, depth));
                assert!(
                    d <= PIXRAD_MARGIN * max_pixel_radius(depth),
                    "depth {depth}: ({lon}, {lat}) is {d} from centre of {hash}"
                );
            }
        }
    }

    #[test]
    fn every_pixel_is_reachable() {
        for depth in 0..4 {
            let mut seen = vec![false; npix(depth) as usize];
            let n = 400;
            for i in 0..n {
                let lon = TAU * i as f64 / n as f64;
                for j in 0..n {
                    let lat = -FRAC_PI_2 + PI * j as f64 / (n - 1) as f64;
                    seen[lon_lat_to_nested(lon, lat, depth) as usize] = true;
                }
            }
            let missing: Vec<usize> = (0..seen.len()).filter(|&i| !seen[i]).collect();
            assert!(missing.is_empty(), "depth {depth}: unreached {missing:?}");
        }
    }

    #[test]
    fn morton_roundtrip() {
        for v in [0u64, 1, 2, 3, 0x55, 1 << 20, (1 << 29) - 1, 0xFFFF_FFFF] {
            assert_eq!(compact_bits(spread_bits(v)), v);
        }
        assert_eq!(spread_bits(0b11), 0b0101);
        assert_eq!(spread_bits(0b11) << 1 | spread_bits(0b01), 0b1011);
    }

    #[test]
    fn center_roundtrip_every_pixel() {
        for depth in 0..5 {
            for hash in 0..npix(depth) {
                let (lon, lat) = nested_to_center(hash, depth);
                assert_eq!(
                    lon_lat_to_nested(lon, lat, depth),
                    hash,
                    "depth {depth}: centre of {hash} maps elsewhere"
                );
                assert_eq!(vector_to_nested(nested_to_vector(hash, depth), depth), hash);
            }
        }
    }

    #[test]
    fn children_nest_inside_parent() {
        for hash in 0..npix(2) {
            let (lon, lat) = nested_to_center(hash, 2);
            assert_eq!(lon_lat_to_nested(lon, lat, 1), hash / 4);
            assert_eq!(lon_lat_to_nested(lon, lat, 0), hash / 16);
        }
    }

    #[test]
    fn poles() {
        for depth in 1..8 {
            let north = lon_lat_to_nested(0.3, FRAC_PI_2, depth);
            let south = lon_lat_to_nested(0.3, -FRAC_PI_2, depth);
            assert!(nested_to_center(north, depth).1 > 1.0);
            assert!(nested_to_center(south, depth).1 < -1.0);
        }
    }

    #[test]
    fn max_pixel_radius_values() {
        // Base pixel 0: centre at z = 2/3, vertex at the north pole.
        assert!((max_pixel_radius(0) - (2.0f64 / 3.0).acos()).abs() < 1e-12);
        for depth in 0..10 {
            assert!(max_pixel_radius(depth + 1) < max_pixel_radius(depth));
            // Never smaller than the radius of an equal-area circle.
            let circle = (pixel_area(depth) / PI).sqrt();
            assert!(max_pixel_radius(depth) > circle, "depth {depth}");
        }
    }

    /// Point at angular distance `rho` from (lon, lat) along `bearing`.
    fn offset(lon: f64, lat: f64, rho: f64, bearing: f64) -> (f64, f64) {
        let lat2 = (lat.sin() * rho.cos() + lat.cos() * rho.sin() * bearing.cos()).asin();
        let lon2 = lon
            + f64::atan2(
                bearing.sin() * rho.sin() * lat.cos(),
                rho.cos() - lat.sin() * lat2.sin(),
            );
        (lon2.rem_euclid(TAU), lat2)
    }

    #[test]
    fn query_disc_covers_every_point_of_the_disc() {
        let centers = [
            (0.0, 0.0),
            (TAU - 1e-3, 0.2),
            (FRAC_PI_4, (2.0f64 / 3.0).asin()),
            (1.0, 1.2),
            (4.0, -1.0),
            (0.0, FRAC_PI_2),
            (2.0, -FRAC_PI_2),
        ];
        for depth in 0..6 {
            for &radius in &[1.75f64.to_radians(), 10.0f64.to_radians()] {
                for &(lon, lat) in &centers {
                    let hits = query_disc(depth, direction_vector(lon, lat), radius);
                    for i in 0..=8 {
                        let rho = radius * i as f64 / 8.0;
                        for j in 0..36 {
                            let bearing = TAU * j as f64 / 36.0;
                            let (plon, plat) = offset(lon, lat, rho, bearing);
                            let home = lon_lat_to_nested(plon, plat, depth);
                            assert!(
                                hits.binary_search(&home).is_ok(),
                                "depth {depth}, r={radius}: pixel {home} of ({plon}, {plat}) \
                                 missing from disc at ({lon}, {lat}): {hits:?}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn query_disc_sorted_unique_in_range() {
        for depth in 0..7 {
            let hits = query_disc(depth, direction_vector(2.5, -0.4), 0.05);
            assert!(!hits.is_empty());
            assert!(hits.windows(2).all(|w| w[0] < w[1]));
            assert!(hits.iter().all(|&h| h < npix(depth)));
        }
    }

    #[test]
    fn query_disc_small_field_on_base_centre() {
        // (0, 0) is the centre of base pixel 4; a 1.75 degree disc stays inside it.
        let hits = query_disc(0, direction_vector(0.0, 0.0), 1.75f64.to_radians());
        assert_eq!(hits, vec![4]);
    }

    #[test]
    fn query_disc_excludes_far_side() {
        let depth = 4;
        let hits = query_disc(depth, direction_vector(1.0, 0.3), 2.0f64.to_radians());
        assert!(hits.len() < 40, "{} pixels for a 2 degree disc", hits.len());
        let antipode = lon_lat_to_nested(1.0 + PI, -0.3, depth);
        assert!(!hits.contains(&antipode));
    }

    #[test]
    fn query_disc_whole_sky() {
        let hits = query_disc(2, direction_vector(0.3, 0.3), PI);
        assert_eq!(hits.len() as u64, npix(2));
    }

    #[test]
    fn query_disc_zero_radius_keeps_home_pixel() {
        for depth in 0..8 {
            let (lon, lat) = (3.3, 0.7);
            let hits = query_disc(depth, direction_vector(lon, lat), 0.0);
            assert!(hits.contains(&lon_lat_to_nested(lon, lat, depth)));
        }
    }
}
