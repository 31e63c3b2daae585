//! What threat scoring sees of a request.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crewdesk_core::{TenantId, UserId};

/// Approximate geolocation of a request source (typically GeoIP-derived).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in kilometres (haversine).
    ///
    /// GeoIP is city-accurate at best; the result feeds a coarse velocity
    /// heuristic, not navigation.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// The slice of an incoming request that threat scoring consumes.
///
/// Built by the HTTP shell before any authorization work. `user` is `None`
/// for unauthenticated traffic (break-glass redemption attempts, probes), in
/// which case only the per-source signals can fire.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    pub user: Option<UserId>,
    pub ip: IpAddr,
    pub geo: Option<GeoPoint>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, ip: IpAddr) -> Self {
        Self {
            tenant_id,
            user: None,
            ip,
            geo: None,
            user_agent: None,
        }
    }

    pub fn for_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_geo(mut self, geo: GeoPoint) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_city_pairs() {
        let london = GeoPoint::new(51.5074, -0.1278);
        let paris = GeoPoint::new(48.8566, 2.3522);
        let tokyo = GeoPoint::new(35.6762, 139.6503);

        let london_paris = london.distance_km(&paris);
        assert!((330.0..360.0).contains(&london_paris), "got {london_paris}");

        let london_tokyo = london.distance_km(&tokyo);
        assert!((9400.0..9700.0).contains(&london_tokyo), "got {london_tokyo}");

        assert!(london.distance_km(&london) < 0.001);
    }
}
