//! Profile Search (C7, §4.7).
//!
//! Wildcard name/type matching, a great-circle locality filter, a regex
//! post-filter over `extra_data` under a time budget, and deterministic
//! paging over the combined hosted + neighbor-identity corpus. Grounded on
//! the teacher's `query`/`filter` pushdown style (cheap predicates first,
//! expensive ones last) adapted to an in-memory candidate set instead of
//! a SQL planner.

use crate::common::{Location, NetworkId};
use crate::error::{Error, Result};
use crate::protocol::{LocationFilter, ProfileSearchRequest, SearchResultItem};
use crate::store::types::{HostedIdentity, NeighborIdentity};
use crate::store::Store;
use regex::RegexBuilder;
use std::time::{Duration, Instant};

/// Hard ceiling on results returned from one search regardless of what the
/// caller asked for (§4.7 boundary behavior).
pub const MAX_RESULTS_CAP: u32 = 1_000;

/// Wall-clock budget for the `extra_data` regex post-filter; exceeding it
/// fails the whole request rather than returning a partial page (§4.7,
/// §8: malformed/expensive patterns must not stall the server).
const REGEX_BUDGET: Duration = Duration::from_millis(250);

const EARTH_RADIUS_M: f64 = 6_371_000.0;

struct Candidate {
    network_id: NetworkId,
    name: String,
    identity_type: String,
    location: Location,
    extra_data: String,
    thumbnail_image: Option<crate::common::ImageHash>,
}

impl From<HostedIdentity> for Candidate {
    fn from(h: HostedIdentity) -> Self {
        Candidate {
            network_id: h.network_id,
            name: h.name,
            identity_type: h.identity_type,
            location: h.location,
            extra_data: h.extra_data,
            thumbnail_image: h.thumbnail_image,
        }
    }
}

impl From<NeighborIdentity> for Candidate {
    fn from(n: NeighborIdentity) -> Self {
        Candidate {
            network_id: n.network_id,
            name: n.name,
            identity_type: n.identity_type,
            location: n.location,
            extra_data: n.extra_data,
            thumbnail_image: n.thumbnail_image,
        }
    }
}

pub async fn search(store: &Store, request: &ProfileSearchRequest) -> Result<Vec<SearchResultItem>> {
    let max_results = request.max_results.min(MAX_RESULTS_CAP);

    if let Some(filter) = &request.location_filter {
        if !filter.center.is_valid() {
            return Err(Error::InvalidValue("location_filter.center out of range".into()));
        }
    }

    let mut candidates: Vec<Candidate> = store.search_hosted().await?.into_iter().map(Candidate::from).collect();
    candidates.extend(store.search_neighbor_identities().await?.into_iter().map(Candidate::from));

    candidates.retain(|c| wildcard_match(&request.type_filter, &c.identity_type));
    candidates.retain(|c| wildcard_match(&request.name_filter, &c.name));

    if let Some(filter) = &request.location_filter {
        let bbox = BoundingBox::for_filter(filter);
        candidates.retain(|c| bbox.contains(c.location) && haversine_distance_m(filter.center, c.location) <= filter.radius_m);
    }

    if let Some(pattern) = &request.extra_data_regex {
        let regex = RegexBuilder::new(pattern)
            .size_limit(1 << 20)
            .dfa_size_limit(1 << 20)
            .build()
            .map_err(|e| Error::InvalidValue(format!("invalid extra_data_regex: {e}")))?;
        let deadline = Instant::now() + REGEX_BUDGET;
        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if Instant::now() > deadline {
                return Err(Error::RegexTimeout);
            }
            if regex.is_match(&candidate.extra_data) {
                kept.push(candidate);
            }
        }
        candidates = kept;
    }

    candidates.sort_by(|a, b| a.network_id.cmp(&b.network_id));

    let page = candidates
        .into_iter()
        .skip(request.offset as usize)
        .take(max_results as usize)
        .map(|c| SearchResultItem {
            network_id: c.network_id,
            name: c.name,
            identity_type: c.identity_type,
            location: c.location,
            thumbnail_image: c.thumbnail_image,
        })
        .collect();

    Ok(page)
}

/// Wildcard patterns: `*` (match all), `*X` (suffix), `X*` (prefix),
/// `*X*` (substring), or an exact match — all case-insensitive (§4.7).
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    let pattern_lower = pattern.to_lowercase();
    let text_lower = text.to_lowercase();

    let starts = pattern_lower.starts_with('*');
    let ends = pattern_lower.ends_with('*');
    match (starts, ends) {
        (true, true) if pattern_lower.len() >= 2 => text_lower.contains(&pattern_lower[1..pattern_lower.len() - 1]),
        (true, _) => text_lower.ends_with(&pattern_lower[1..]),
        (_, true) => text_lower.starts_with(&pattern_lower[..pattern_lower.len() - 1]),
        (false, false) => text_lower == pattern_lower,
    }
}

/// Bounding rectangle prefilter ahead of the precise haversine check
/// (§4.7): a radius beyond ~5000km is treated as "no geographic
/// restriction"; a filter whose rectangle would cover a pole widens to the
/// full longitude range; otherwise the rectangle may need to be split
/// across the antimeridian.
struct BoundingBox {
    full_globe: bool,
    lat_min: f64,
    lat_max: f64,
    /// One range, or two when the rectangle wraps past +/-180 degrees.
    lon_ranges: Vec<(f64, f64)>,
}

impl BoundingBox {
    fn for_filter(filter: &LocationFilter) -> Self {
        const MAX_RESTRICTED_RADIUS_M: f64 = 5_000_000.0;
        if filter.radius_m >= MAX_RESTRICTED_RADIUS_M {
            return BoundingBox { full_globe: true, lat_min: -90.0, lat_max: 90.0, lon_ranges: vec![(-180.0, 180.0)] };
        }

        let lat_delta = (filter.radius_m / EARTH_RADIUS_M).to_degrees();
        let center_lat = filter.center.lat();
        let center_lon = filter.center.lon();
        let lat_min = (center_lat - lat_delta).max(-90.0);
        let lat_max = (center_lat + lat_delta).min(90.0);

        // Near a pole the rectangle spans every longitude.
        if lat_max >= 89.9 || lat_min <= -89.9 {
            return BoundingBox { full_globe: false, lat_min, lat_max, lon_ranges: vec![(-180.0, 180.0)] };
        }

        let cos_lat = center_lat.to_radians().cos().max(0.01);
        let lon_delta = (filter.radius_m / (EARTH_RADIUS_M * cos_lat)).to_degrees();
        let lon_min = center_lon - lon_delta;
        let lon_max = center_lon + lon_delta;

        let lon_ranges = if lon_min < -180.0 {
            vec![(lon_min + 360.0, 180.0), (-180.0, lon_max)]
        } else if lon_max > 180.0 {
            vec![(lon_min, 180.0), (-180.0, lon_max - 360.0)]
        } else {
            vec![(lon_min, lon_max)]
        };

        BoundingBox { full_globe: false, lat_min, lat_max, lon_ranges }
    }

    fn contains(&self, location: Location) -> bool {
        if self.full_globe {
            return true;
        }
        let lat = location.lat();
        let lon = location.lon();
        if lat < self.lat_min || lat > self.lat_max {
            return false;
        }
        self.lon_ranges.iter().any(|(min, max)| lon >= *min && lon <= *max)
    }
}

fn haversine_distance_m(a: Location, b: Location) -> f64 {
    let (lat1, lon1) = (a.lat().to_radians(), a.lon().to_radians());
    let (lat2, lon2) = (b.lat().to_radians(), b.lon().to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_variants() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("Jo*", "John"));
        assert!(!wildcard_match("Jo*", "Ann"));
        assert!(wildcard_match("*son", "Johnson"));
        assert!(wildcard_match("*oh*", "John"));
        assert!(wildcard_match("john", "John"));
        assert!(!wildcard_match("john", "Johnny"));
    }

    #[test]
    fn bounding_box_excludes_far_point() {
        let filter = LocationFilter { center: Location::new(0.0, 0.0), radius_m: 1000.0 };
        let bbox = BoundingBox::for_filter(&filter);
        assert!(bbox.contains(Location::new(0.0, 0.0)));
        assert!(!bbox.contains(Location::new(10.0, 10.0)));
    }

    #[test]
    fn bounding_box_wraps_antimeridian() {
        let filter = LocationFilter { center: Location::new(0.0, 179.5), radius_m: 100_000.0 };
        let bbox = BoundingBox::for_filter(&filter);
        assert!(bbox.contains(Location::new(0.0, -179.9)));
    }

    #[test]
    fn large_radius_disables_geo_filter() {
        let filter = LocationFilter { center: Location::new(0.0, 0.0), radius_m: 6_000_000.0 };
        let bbox = BoundingBox::for_filter(&filter);
        assert!(bbox.contains(Location::new(-80.0, 170.0)));
    }
}
