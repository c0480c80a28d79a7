//! Broker geo crate - geocoding, points of interest, and listing enrichment.
//!
//! The map services are consumed through two small traits, [`Geocoder`] and
//! [`PoiSource`], with OpenStreetMap-backed implementations (Nominatim and
//! Overpass) and static doubles for tests. [`LocationService`] applies the
//! distance cutoffs, caps and ordering that the dialogue relies on.

pub mod distance;
pub mod error;
pub mod geocode;
pub mod poi;
pub mod service;

pub use distance::{haversine_km, km_to_miles, Coordinates};
pub use error::LocationError;
pub use geocode::{Geocoder, NominatimGeocoder, StaticGeocoder};
pub use poi::{OverpassPoiSource, PoiCategory, PoiSource, RawPoi, StaticPoiSource};
pub use service::{EnrichedListing, LocationData, LocationService, PointOfInterest};
