use anyhow::Result;
use std::path::Path;

use crate::dataset::FeatureDataset;
use crate::geom::{Reprojector, centroid};
use crate::sampler::{ElevationSampler, QueryPoint, SampleMap};

#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub feature_count: usize,
    pub point_count: usize,
    pub sampled_count: usize,
    pub written_count: usize,
}

/// One geographic query point per feature with a computable centroid, keyed
/// by feature id. Emission order is dataset order but carries no meaning
/// downstream; the keys do.
pub fn collect_query_points(dataset: &FeatureDataset) -> Result<Vec<QueryPoint>> {
    let reprojector = Reprojector::to_geographic(dataset.crs())?;
    let mut points = Vec::with_capacity(dataset.feature_count());
    for (qid, feature) in dataset.features() {
        let Some(geometry) = feature.geometry.as_ref() else {
            continue;
        };
        let Some(center) = centroid(geometry) else {
            continue;
        };
        let geographic = reprojector.project(center)?;
        points.push(QueryPoint {
            qid,
            lon: geographic.x(),
            lat: geographic.y(),
        });
    }
    Ok(points)
}

/// The whole pipeline: open, ensure the field, collect query points, one
/// batched remote sample, keyed write-back, persist. Fails fast before any
/// mutation or network traffic when the input is missing or unreadable.
pub fn run(
    input: &Path,
    field: &str,
    sentinel: f64,
    sampler: &dyn ElevationSampler,
) -> Result<RunSummary> {
    let mut dataset = FeatureDataset::open(input)?;
    let feature_count = dataset.feature_count();
    tracing::info!(
        "Opened {} ({} features, native CRS {})",
        input.display(),
        feature_count,
        dataset.crs()
    );

    dataset.ensure_field(field);

    let points = collect_query_points(&dataset)?;
    tracing::info!("Collected {} query points", points.len());

    let samples = if points.is_empty() {
        SampleMap::new()
    } else {
        sampler.sample(&points)?
    };
    tracing::info!("Sampled {} records", samples.len());

    let written = dataset.apply_samples(field, &samples, sentinel);
    dataset.save()?;
    tracing::info!("Wrote '{}' on {} of {} features", field, written, feature_count);

    Ok(RunSummary {
        feature_count,
        point_count: points.len(),
        sampled_count: samples.len(),
        written_count: written,
    })
}
