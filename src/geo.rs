//! Geospatial indexing: longitude/latitude encoded as a 52-bit
//! interleaved geohash stored as a zset score, plus Haversine distance
//! and radius search over that score (§4.6).

const GEO_LON_MIN: f64 = -180.0;
const GEO_LON_MAX: f64 = 180.0;
const GEO_LAT_MIN: f64 = -85.05112878;
const GEO_LAT_MAX: f64 = 85.05112878;
const STEP: u32 = 26;

/// Mean earth radius in meters used throughout this module, matching
/// the constant the spec pins down exactly.
pub const EARTH_RADIUS_M: f64 = 6372797.560856;

#[derive(Debug, Clone, Copy)]
pub enum DistanceUnit {
    Meters,
    Kilometers,
    Miles,
    Feet,
}

impl DistanceUnit {
    pub fn parse(s: &str) -> Option<DistanceUnit> {
        match s.to_ascii_lowercase().as_str() {
            "m" => Some(DistanceUnit::Meters),
            "km" => Some(DistanceUnit::Kilometers),
            "mi" => Some(DistanceUnit::Miles),
            "ft" => Some(DistanceUnit::Feet),
            _ => None,
        }
    }

    pub fn from_meters(&self, meters: f64) -> f64 {
        match self {
            DistanceUnit::Meters => meters,
            DistanceUnit::Kilometers => meters / 1000.0,
            DistanceUnit::Miles => meters / 1609.34,
            DistanceUnit::Feet => meters * 3.28084,
        }
    }

    pub fn to_meters(&self, value: f64) -> f64 {
        match self {
            DistanceUnit::Meters => value,
            DistanceUnit::Kilometers => value * 1000.0,
            DistanceUnit::Miles => value * 1609.34,
            DistanceUnit::Feet => value / 3.28084,
        }
    }
}

fn interleave64(xlo: u32, ylo: u32) -> u64 {
    const B: [u64; 5] = [
        0x5555555555555555,
        0x3333333333333333,
        0x0F0F0F0F0F0F0F0F,
        0x00FF00FF00FF00FF,
        0x0000FFFF0000FFFF,
    ];
    const S: [u32; 5] = [1, 2, 4, 8, 16];

    let mut x = xlo as u64;
    let mut y = ylo as u64;

    x = (x | (x << S[4])) & B[4];
    x = (x | (x << S[3])) & B[3];
    x = (x | (x << S[2])) & B[2];
    x = (x | (x << S[1])) & B[1];
    x = (x | (x << S[0])) & B[0];

    y = (y | (y << S[4])) & B[4];
    y = (y | (y << S[3])) & B[3];
    y = (y | (y << S[2])) & B[2];
    y = (y | (y << S[1])) & B[1];
    y = (y | (y << S[0])) & B[0];

    x | (y << 1)
}

fn deinterleave64(interleaved: u64) -> (u32, u32) {
    const B: [u64; 6] = [
        0x5555555555555555,
        0x3333333333333333,
        0x0F0F0F0F0F0F0F0F,
        0x00FF00FF00FF00FF,
        0x0000FFFF0000FFFF,
        0x00000000FFFFFFFF,
    ];
    const S: [u32; 6] = [0, 1, 2, 4, 8, 16];

    let mut x = interleaved;
    let mut y = interleaved >> 1;

    x &= B[0];
    x = (x | (x >> S[1])) & B[1];
    x = (x | (x >> S[2])) & B[2];
    x = (x | (x >> S[3])) & B[3];
    x = (x | (x >> S[4])) & B[4];
    x = (x | (x >> S[5])) & B[5];

    y &= B[0];
    y = (y | (y >> S[1])) & B[1];
    y = (y | (y >> S[2])) & B[2];
    y = (y | (y >> S[3])) & B[3];
    y = (y | (y >> S[4])) & B[4];
    y = (y | (y >> S[5])) & B[5];

    (x as u32, y as u32)
}

/// Encodes (lon, lat) into the 52-bit interleaved geohash used as the
/// zset score. Returns `None` for out-of-range coordinates.
pub fn encode(lon: f64, lat: f64) -> Option<u64> {
    if !(GEO_LON_MIN..=GEO_LON_MAX).contains(&lon) || !(GEO_LAT_MIN..=GEO_LAT_MAX).contains(&lat) {
        return None;
    }
    let lat_off = (lat - GEO_LAT_MIN) / (GEO_LAT_MAX - GEO_LAT_MIN);
    let lon_off = (lon - GEO_LON_MIN) / (GEO_LON_MAX - GEO_LON_MIN);
    let lat_bits = (lat_off * (1u64 << STEP) as f64) as u32;
    let lon_bits = (lon_off * (1u64 << STEP) as f64) as u32;
    Some(interleave64(lat_bits, lon_bits))
}

pub fn decode(bits: u64) -> (f64, f64) {
    let (lat_bits, lon_bits) = deinterleave64(bits);
    let scale = (1u64 << STEP) as f64;
    let lat_min = GEO_LAT_MIN + (lat_bits as f64 / scale) * (GEO_LAT_MAX - GEO_LAT_MIN);
    let lat_max = GEO_LAT_MIN + ((lat_bits + 1) as f64 / scale) * (GEO_LAT_MAX - GEO_LAT_MIN);
    let lon_min = GEO_LON_MIN + (lon_bits as f64 / scale) * (GEO_LON_MAX - GEO_LON_MIN);
    let lon_max = GEO_LON_MIN + ((lon_bits + 1) as f64 / scale) * (GEO_LON_MAX - GEO_LON_MIN);
    ((lon_min + lon_max) / 2.0, (lat_min + lat_max) / 2.0)
}

/// Great-circle distance between two (lon, lat) points, in meters.
pub fn haversine_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lat1r, lat2r) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}

/// A conservative score-range bounding box covering a circle of
/// `radius_m` around `(lon, lat)`, for a coarse prefilter before exact
/// distance filtering (§4.6).
pub fn bounding_score_range(lon: f64, lat: f64, radius_m: f64) -> (u64, u64) {
    let lat_delta = (radius_m / 111_320.0).min(90.0);
    let lon_delta = if lat.abs() >= 89.9 {
        180.0
    } else {
        (radius_m / (111_320.0 * lat.to_radians().cos().abs().max(1e-6))).min(180.0)
    };

    let lat_min = (lat - lat_delta).max(GEO_LAT_MIN);
    let lat_max = (lat + lat_delta).min(GEO_LAT_MAX);
    let lon_min = (lon - lon_delta).max(GEO_LON_MIN);
    let lon_max = (lon + lon_delta).min(GEO_LON_MAX);

    let corners = [
        encode(lon_min, lat_min),
        encode(lon_min, lat_max),
        encode(lon_max, lat_min),
        encode(lon_max, lat_max),
        encode(lon, lat),
    ];
    let corners: Vec<u64> = corners.into_iter().flatten().collect();
    let lo = *corners.iter().min().unwrap_or(&0);
    let hi = *corners.iter().max().unwrap_or(&u64::MAX);
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_is_close() {
        let bits = encode(13.361389, 38.115556).unwrap();
        let (lon, lat) = decode(bits);
        assert!((lon - 13.361389).abs() < 0.001);
        assert!((lat - 38.115556).abs() < 0.001);
    }

    #[test]
    fn distance_is_commutative_and_zero_for_same_point() {
        let d1 = haversine_m(13.361389, 38.115556, 15.087269, 37.502669);
        let d2 = haversine_m(15.087269, 37.502669, 13.361389, 38.115556);
        assert!((d1 - d2).abs() < 1e-6);
        assert_eq!(haversine_m(1.0, 1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn known_distance_palermo_catania() {
        // Redis's own documented example pair, ~166274m apart.
        let d = haversine_m(13.361389, 38.115556, 15.087269, 37.502669);
        assert!((d - 166274.0).abs() / 166274.0 < 0.005);
    }

    #[test]
    fn out_of_range_coordinates_rejected() {
        assert!(encode(200.0, 0.0).is_none());
        assert!(encode(0.0, 90.0).is_none());
    }
}
