//! Copernicus Data Space Ecosystem (Sentinel Hub) scene provider
//!
//! Catalog search goes through the STAC item-search endpoint, band data through
//! the Process API. Both share one OAuth2 client-credentials token.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::ProviderConfig;
use crate::core::geometry::BoundingBox;
use crate::io::band_decoder::decode_scene_tiff;
use crate::io::provider::{SceneBands, SceneDescriptor, SceneProvider};
use crate::types::{GridSize, NdviError, NdviResult, TimeInterval, DATE_FORMAT};

/// Catalog page size accepted by the service
pub const MAX_CATALOG_LIMIT: usize = 100;

const CRS84: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";

/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Characters of an error body kept in error messages
const ERROR_BODY_SNIPPET: usize = 500;

/// Red, NIR, scene classification and data mask as FLOAT32, pixel-interleaved
pub const BANDS_EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
    return {
        input: [{ bands: ["B04", "B08", "SCL", "dataMask"] }],
        output: { bands: 4, sampleType: "FLOAT32" }
    };
}

function evaluatePixel(sample) {
    if (sample.dataMask == 0) {
        return [NaN, NaN, 0, 0];
    }
    return [sample.B04, sample.B08, sample.SCL, sample.dataMask];
}
"#;

// Catalog models

/// Body for `POST /api/v1/catalog/1.0.0/search`
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSearchRequest {
    pub bbox: [f64; 4],
    pub datetime: String,
    pub collections: Vec<String>,
    pub limit: usize,
}

impl CatalogSearchRequest {
    pub fn new(collection: &str, bbox: &BoundingBox, interval: &TimeInterval, limit: usize) -> Self {
        Self {
            bbox: bbox.to_array(),
            datetime: format!(
                "{}T00:00:00Z/{}T23:59:59Z",
                interval.start.format(DATE_FORMAT),
                interval.end.format(DATE_FORMAT)
            ),
            collections: vec![collection.to_string()],
            limit: limit.clamp(1, MAX_CATALOG_LIMIT),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogItemCollection {
    #[serde(default)]
    pub features: Vec<CatalogItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub properties: CatalogItemProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogItemProperties {
    /// RFC 3339 acquisition time
    pub datetime: Option<String>,
}

impl CatalogItem {
    /// Acquisition day, taken from the first ten characters of `datetime`
    pub fn acquisition_date(&self) -> Option<NaiveDate> {
        let datetime = self.properties.datetime.as_deref()?;
        let day = datetime.get(..10)?;
        NaiveDate::parse_from_str(day, DATE_FORMAT).ok()
    }
}

/// Catalog items in catalog order; items without a usable date are dropped
pub fn parse_catalog_response(body: &str) -> NdviResult<Vec<SceneDescriptor>> {
    let collection: CatalogItemCollection = serde_json::from_str(body)?;
    Ok(collection
        .features
        .into_iter()
        .filter_map(|item| match item.acquisition_date() {
            Some(date) => Some(SceneDescriptor { id: item.id, date }),
            None => {
                log::warn!("Catalog item {} has no acquisition date, ignoring", item.id);
                None
            }
        })
        .collect())
}

/// Process API request for one acquisition day
pub fn process_request_body(
    collection: &str,
    scene_date: NaiveDate,
    bbox: &BoundingBox,
    grid: GridSize,
) -> serde_json::Value {
    let day = scene_date.format(DATE_FORMAT).to_string();
    serde_json::json!({
        "input": {
            "bounds": {
                "bbox": bbox.to_array(),
                "properties": { "crs": CRS84 }
            },
            "data": [{
                "type": collection,
                "dataFilter": {
                    "timeRange": {
                        "from": format!("{}T00:00:00Z", day),
                        "to": format!("{}T23:59:59Z", day)
                    }
                }
            }]
        },
        "output": {
            "width": grid.width,
            "height": grid.height,
            "responses": [{
                "identifier": "default",
                "format": { "type": "image/tiff" }
            }]
        },
        "evalscript": BANDS_EVALSCRIPT
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_lifetime")]
    expires_in: u64,
}

fn default_token_lifetime() -> u64 {
    300
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Sentinel-2 L2A imagery from the Copernicus Data Space Ecosystem
pub struct SentinelHubProvider {
    config: ProviderConfig,
    client: reqwest::blocking::Client,
    token: Mutex<Option<CachedToken>>,
}

impl SentinelHubProvider {
    pub fn new(config: ProviderConfig) -> NdviResult<Self> {
        if !config.has_credentials() {
            return Err(NdviError::Config(
                "CDSE_CLIENT_ID and CDSE_CLIENT_SECRET must be set".to_string(),
            ));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("ndvi-series/", env!("CARGO_PKG_VERSION")))
            .build()?;

        log::info!(
            "Sentinel Hub provider ready: {} ({})",
            config.base_url,
            config.collection
        );

        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Bearer token, fetched again once the cached one is close to expiry
    fn access_token(&self) -> NdviResult<String> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| NdviError::Provider("Token cache poisoned".to_string()))?;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        log::debug!("Requesting access token from {}", self.config.token_url);
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()?;
        let response = check_status(response, "Token request")?;
        let token: TokenResponse = response.json()?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

impl SceneProvider for SentinelHubProvider {
    fn search(
        &self,
        bbox: &BoundingBox,
        interval: &TimeInterval,
        limit: usize,
    ) -> NdviResult<Vec<SceneDescriptor>> {
        let body = CatalogSearchRequest::new(&self.config.collection, bbox, interval, limit);
        let token = self.access_token()?;

        let response = self
            .client
            .post(self.endpoint("/api/v1/catalog/1.0.0/search"))
            .bearer_auth(token)
            .json(&body)
            .send()?;
        let response = check_status(response, "Catalog search")?;

        let mut scenes = parse_catalog_response(&response.text()?)?;
        scenes.truncate(limit);
        log::debug!("Catalog returned {} scenes for {}", scenes.len(), interval);
        Ok(scenes)
    }

    fn fetch(&self, scene_date: NaiveDate, bbox: &BoundingBox, grid: GridSize) -> NdviResult<SceneBands> {
        let body = process_request_body(&self.config.collection, scene_date, bbox, grid);
        let token = self.access_token()?;

        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint("/api/v1/process"))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "image/tiff")
            .json(&body)
            .send()?;
        let response = check_status(response, "Process request")?;
        let bytes = response.bytes()?;
        log::debug!(
            "Downloaded {} bytes for {} in {:?}",
            bytes.len(),
            scene_date,
            start.elapsed()
        );

        decode_bands(&bytes)
    }
}

#[cfg(not(feature = "gdal"))]
fn decode_bands(bytes: &[u8]) -> NdviResult<SceneBands> {
    decode_scene_tiff(bytes)
}

#[cfg(feature = "gdal")]
fn decode_bands(bytes: &[u8]) -> NdviResult<SceneBands> {
    decode_scene_tiff(bytes).or_else(|e| {
        log::debug!("Native TIFF decoding failed ({}), retrying with GDAL", e);
        crate::io::band_decoder::decode_scene_tiff_gdal(bytes)
    })
}

fn check_status(
    response: reqwest::blocking::Response,
    what: &str,
) -> NdviResult<reqwest::blocking::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(NdviError::Provider(format!(
        "{} returned HTTP {}: {}",
        what,
        status,
        body.chars().take(ERROR_BODY_SNIPPET).collect::<String>()
    )))
}
