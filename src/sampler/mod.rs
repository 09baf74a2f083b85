//! Remote DEM sampling client.
//!
//! One batched POST per run: the query points go out as a GeoJSON
//! FeatureCollection where each point carries a `qid` property, and the
//! service answers with a feature list whose properties echo the `qid` next
//! to the sampled `elevation`. Results are matched back by key, never by
//! position.

use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::time::Duration;

use crate::dataset::FeatureId;

pub const QUERY_ID_PROPERTY: &str = "qid";

/// One geographic query point, keyed to the feature it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryPoint {
    pub qid: FeatureId,
    pub lon: f64,
    pub lat: f64,
}

/// Keyed sample results: `None` means the service had no elevation for that
/// point; a feature id absent from the map was not answered at all.
pub type SampleMap = HashMap<FeatureId, Option<f64>>;

pub trait ElevationSampler {
    fn sample(&self, points: &[QueryPoint]) -> Result<SampleMap>;
}

/// HTTP client for the sampling service. Holds the session for the whole
/// run; no ambient global state.
pub struct RemoteSampler {
    client: reqwest::blocking::Client,
    endpoint: String,
    dem_dataset: String,
    scale_m: f64,
}

impl RemoteSampler {
    pub fn new(
        endpoint: impl Into<String>,
        dem_dataset: impl Into<String>,
        scale_m: f64,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Sampler: failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            dem_dataset: dem_dataset.into(),
            scale_m,
        })
    }
}

impl ElevationSampler for RemoteSampler {
    fn sample(&self, points: &[QueryPoint]) -> Result<SampleMap> {
        if points.is_empty() {
            return Ok(SampleMap::new());
        }

        let body = build_request_body(&self.dem_dataset, self.scale_m, points);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .with_context(|| format!("Sampler: request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Sampler: {} returned {}", self.endpoint, status);
        }

        let text = response
            .text()
            .with_context(|| format!("Sampler: failed reading response from {}", self.endpoint))?;
        parse_response(&text)
    }
}

pub fn build_request_body(dem_dataset: &str, scale_m: f64, points: &[QueryPoint]) -> Value {
    let features = points
        .iter()
        .map(|point| {
            let mut properties = Map::new();
            properties.insert(QUERY_ID_PROPERTY.to_string(), Value::from(point.qid));
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                    point.lon, point.lat,
                ]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    json!({
        "dataset": dem_dataset,
        "scale": scale_m,
        "points": collection,
    })
}

#[derive(Debug, Deserialize)]
struct SampleResponse {
    features: Vec<SampledFeature>,
}

#[derive(Debug, Deserialize)]
struct SampledFeature {
    #[serde(default)]
    properties: SampledProperties,
}

#[derive(Debug, Default, Deserialize)]
struct SampledProperties {
    qid: Option<FeatureId>,
    // null and absent both mean "no elevation here"
    elevation: Option<f64>,
}

pub fn parse_response(body: &str) -> Result<SampleMap> {
    let response: SampleResponse =
        serde_json::from_str(body).context("Sampler: invalid response body")?;
    let mut samples = SampleMap::with_capacity(response.features.len());
    for record in response.features {
        let Some(qid) = record.properties.qid else {
            anyhow::bail!(
                "Sampler: response record is missing the '{}' key",
                QUERY_ID_PROPERTY
            );
        };
        samples.insert(qid, record.properties.elevation);
    }
    Ok(samples)
}
