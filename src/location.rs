//! Where a confession was posted from. The device side (permission, position,
//! reverse geocoding) sits behind [`Geolocator`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::{AppResult, remote::check};

const FALLBACK_NAME: &str = "Current Location";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

impl Address {
    /// "City, Region, Country", skipping whatever is missing.
    pub fn place_name(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.city, &self.region, &self.country]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

/// A tagged place, ready to attach to a new confession.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    /// Whether the user let us read their position.
    async fn request_permission(&self) -> AppResult<bool>;

    async fn current_position(&self) -> AppResult<Coordinates>;

    async fn reverse_geocode(&self, at: Coordinates) -> AppResult<Vec<Address>>;
}

/// Asks for permission, reads the position and names it after the first address found.
pub async fn pick_location(geo: &dyn Geolocator) -> AppResult<Location> {
    match geo.request_permission().await {
        Ok(true) => {}
        Ok(false) => return Err("Permission to access location was denied".into()),
        Err(err) => {
            warn!("error requesting location permission: {err}");
            return Err("Could not get your location".into());
        }
    }

    let resolved = async {
        let at = geo.current_position().await?;
        let addresses = geo.reverse_geocode(at).await?;
        AppResult::Ok((at, addresses))
    }.await;

    let (at, addresses) = resolved.map_err(|err| {
        warn!("location error: {err}");
        "Could not get your location"
    })?;

    let name = addresses.first()
        .and_then(Address::place_name)
        .unwrap_or_else(|| FALLBACK_NAME.to_owned());

    Ok(Location { name, latitude: at.latitude, longitude: at.longitude })
}

#[derive(Deserialize)]
struct NominatimReply {
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

/// A fixed position supplied by the user, named through a Nominatim server.
pub struct NominatimGeocoder {
    http: Client,
    base_url: Url,
    position: Coordinates,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, position: Coordinates) -> AppResult<Self> {
        Ok(Self {
            http: Client::builder()
                .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
                .build()?,
            base_url: Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?,
            position,
        })
    }

    fn reverse_url(&self, at: Coordinates) -> AppResult<Url> {
        let mut url = self.base_url.join("reverse")?;
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("lat", &at.latitude.to_string())
            .append_pair("lon", &at.longitude.to_string());
        Ok(url)
    }
}

#[async_trait]
impl Geolocator for NominatimGeocoder {
    async fn request_permission(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn current_position(&self) -> AppResult<Coordinates> {
        Ok(self.position)
    }

    async fn reverse_geocode(&self, at: Coordinates) -> AppResult<Vec<Address>> {
        let response = self.http.get(self.reverse_url(at)?).send().await?;
        let reply: NominatimReply = check(response).await?.json().await?;

        Ok(reply.address
            .map(|address| Address {
                city: address.city.or(address.town).or(address.village),
                region: address.state,
                country: address.country,
            })
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDevice {
        permitted: bool,
        addresses: AppResult<Vec<Address>>,
    }

    #[async_trait]
    impl Geolocator for FakeDevice {
        async fn request_permission(&self) -> AppResult<bool> {
            Ok(self.permitted)
        }

        async fn current_position(&self) -> AppResult<Coordinates> {
            Ok(Coordinates { latitude: 40.4237, longitude: -86.9212 })
        }

        async fn reverse_geocode(&self, _at: Coordinates) -> AppResult<Vec<Address>> {
            match &self.addresses {
                Ok(addresses) => Ok(addresses.clone()),
                Err(err) => Err(err.to_string().into()),
            }
        }
    }

    fn address(city: Option<&str>, region: Option<&str>, country: Option<&str>) -> Address {
        Address {
            city: city.map(str::to_owned),
            region: region.map(str::to_owned),
            country: country.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn names_place_from_first_address() {
        let device = FakeDevice {
            permitted: true,
            addresses: Ok(vec![
                address(Some("West Lafayette"), Some("Indiana"), Some("United States")),
                address(Some("Elsewhere"), None, None),
            ]),
        };

        let location = pick_location(&device).await.unwrap();
        assert_eq!(location.name, "West Lafayette, Indiana, United States");
        assert_eq!(location.latitude, 40.4237);
    }

    #[tokio::test]
    async fn skips_missing_parts_and_falls_back() {
        let partial = FakeDevice { permitted: true, addresses: Ok(vec![address(None, Some("Bavaria"), Some("Germany"))]) };
        assert_eq!(pick_location(&partial).await.unwrap().name, "Bavaria, Germany");

        let nothing = FakeDevice { permitted: true, addresses: Ok(vec![]) };
        assert_eq!(pick_location(&nothing).await.unwrap().name, FALLBACK_NAME);
    }

    #[tokio::test]
    async fn denied_permission_is_reported() {
        let device = FakeDevice { permitted: false, addresses: Ok(vec![]) };
        let err = pick_location(&device).await.unwrap_err();
        assert_eq!(err.to_string(), "Permission to access location was denied");
    }

    #[tokio::test]
    async fn geocoder_failure_is_generic() {
        let device = FakeDevice { permitted: true, addresses: Err("timeout".into()) };
        let err = pick_location(&device).await.unwrap_err();
        assert_eq!(err.to_string(), "Could not get your location");
    }

    #[test]
    fn reverse_url_carries_coordinates() {
        let geocoder = NominatimGeocoder::new("https://nominatim.example/", Coordinates { latitude: 1.5, longitude: -2.25 }).unwrap();
        let url = geocoder.reverse_url(Coordinates { latitude: 1.5, longitude: -2.25 }).unwrap();
        assert_eq!(url.as_str(), "https://nominatim.example/reverse?format=jsonv2&lat=1.5&lon=-2.25");
    }
}
