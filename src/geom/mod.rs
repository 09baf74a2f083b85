use anyhow::{Context, Result};
use geo::algorithm::centroid::Centroid;
use geo_types::{Geometry, Point};
use proj::Proj;

use crate::dataset::GEOGRAPHIC_CRS;

/// Centroid of a GeoJSON geometry in its native coordinates. Returns `None`
/// for geometries without a defined centroid (e.g. empty collections).
pub fn centroid(geometry: &geojson::Geometry) -> Option<Point<f64>> {
    let geometry = Geometry::<f64>::try_from(geometry.value.clone()).ok()?;
    geometry.centroid()
}

/// Transform from a dataset's native CRS into geographic coordinates.
/// Built once per run; the identity case skips proj entirely.
pub enum Reprojector {
    Identity,
    Transform(Proj),
}

impl Reprojector {
    pub fn to_geographic(native_crs: &str) -> Result<Self> {
        if native_crs.eq_ignore_ascii_case(GEOGRAPHIC_CRS) {
            return Ok(Self::Identity);
        }
        let transform = Proj::new_known_crs(native_crs, GEOGRAPHIC_CRS, None).with_context(
            || format!("Reproject: no transform from {} to {}", native_crs, GEOGRAPHIC_CRS),
        )?;
        Ok(Self::Transform(transform))
    }

    pub fn project(&self, point: Point<f64>) -> Result<Point<f64>> {
        match self {
            Self::Identity => Ok(point),
            Self::Transform(transform) => transform
                .convert(point)
                .context("Reproject: point transform failed"),
        }
    }
}
