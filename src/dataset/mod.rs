use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Stable per-run feature identifier: the feature's ordinal position in the
/// collection at load time. The collection is held in memory for the whole
/// run, so the id stays valid from collection through write-back.
pub type FeatureId = u64;

pub const GEOGRAPHIC_CRS: &str = "EPSG:4326";

/// A GeoJSON FeatureCollection loaded from disk, mutated in memory, and
/// persisted back to the same path.
#[derive(Debug)]
pub struct FeatureDataset {
    path: PathBuf,
    collection: FeatureCollection,
    crs: String,
}

impl FeatureDataset {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Dataset: input not found: {}", path.display());
        }
        let file = File::open(path)
            .with_context(|| format!("Dataset: failed to open {}", path.display()))?;
        let geojson: GeoJson = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Dataset: failed to parse {}", path.display()))?;
        let collection = match geojson {
            GeoJson::FeatureCollection(collection) => collection,
            _ => anyhow::bail!(
                "Dataset: {} is not a GeoJSON FeatureCollection",
                path.display()
            ),
        };
        let crs = parse_crs(collection.foreign_members.as_ref());
        Ok(Self {
            path: path.to_path_buf(),
            collection,
            crs,
        })
    }

    /// Native CRS of the dataset, as an authority string like `EPSG:26915`.
    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn feature_count(&self) -> usize {
        self.collection.features.len()
    }

    pub fn features(&self) -> impl Iterator<Item = (FeatureId, &Feature)> {
        self.collection
            .features
            .iter()
            .enumerate()
            .map(|(index, feature)| (index as FeatureId, feature))
    }

    /// Makes sure every feature carries the attribute key, inserting an
    /// explicit `null` where it is missing. Idempotent; existing values are
    /// never altered. Returns the number of features amended.
    pub fn ensure_field(&mut self, field: &str) -> usize {
        let mut amended = 0;
        for feature in &mut self.collection.features {
            let properties = feature.properties.get_or_insert_with(Map::new);
            if !properties.contains_key(field) {
                properties.insert(field.to_string(), Value::Null);
                amended += 1;
            }
        }
        if amended > 0 {
            tracing::info!("Added '{}' field to {} features", field, amended);
        }
        amended
    }

    /// Writes sampled values into the attribute field, matched by feature id.
    /// A `Some` sample writes the value, a `None` sample writes the sentinel,
    /// and features with no entry in the map are left untouched. Returns the
    /// number of features written.
    pub fn apply_samples(
        &mut self,
        field: &str,
        samples: &HashMap<FeatureId, Option<f64>>,
        sentinel: f64,
    ) -> usize {
        let mut written = 0;
        for (index, feature) in self.collection.features.iter_mut().enumerate() {
            let Some(sample) = samples.get(&(index as FeatureId)) else {
                continue;
            };
            let value = sample.unwrap_or(sentinel);
            let properties = feature.properties.get_or_insert_with(Map::new);
            properties.insert(field.to_string(), Value::from(value));
            written += 1;
        }
        written
    }

    /// Persists the collection back to the path it was loaded from, keeping
    /// foreign members (including the `crs` object) intact. Writes go to a
    /// sibling temp file renamed over the original, so a failed write never
    /// clobbers the input.
    pub fn save(&self) -> Result<()> {
        let directory = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(directory).with_context(|| {
            format!("Dataset: failed to create temp file in {}", directory.display())
        })?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer(&mut writer, &self.collection)
                .with_context(|| format!("Dataset: failed to serialize {}", self.path.display()))?;
            writer.flush()?;
        }
        temp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Dataset: failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Reads the legacy GeoJSON `crs` foreign member. Absent or unrecognized
/// members mean geographic coordinates, per the GeoJSON default.
fn parse_crs(foreign_members: Option<&Map<String, Value>>) -> String {
    let Some(crs) = foreign_members.and_then(|members| members.get("crs")) else {
        return GEOGRAPHIC_CRS.to_string();
    };
    let name = crs
        .pointer("/properties/name")
        .and_then(Value::as_str)
        .or_else(|| crs.as_str());
    match name {
        Some(name) => normalize_crs_name(name),
        None => GEOGRAPHIC_CRS.to_string(),
    }
}

/// Normalizes URN-style names (`urn:ogc:def:crs:EPSG::26915`, with or
/// without a version field before the code) to the `EPSG:nnnn` form the
/// proj crate accepts. CRS84 is axis-flipped 4326 but GeoJSON coordinates
/// are always lon/lat, so both map to EPSG:4326 here.
fn normalize_crs_name(name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    if upper.ends_with("CRS84") {
        return GEOGRAPHIC_CRS.to_string();
    }
    if upper.contains("EPSG") {
        // The code is the last non-empty colon-delimited field.
        let code = name.rsplit(':').find(|segment| !segment.is_empty());
        if let Some(code) = code
            && code.chars().all(|c| c.is_ascii_digit())
        {
            return format!("EPSG:{}", code);
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_dataset(value: &Value) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::with_suffix(".geojson").unwrap();
        std::fs::write(file.path(), serde_json::to_string(value).unwrap()).unwrap();
        file
    }

    fn point_collection() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [-111.9, 40.7]},
                    "properties": {"name": "a"}
                },
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [-111.8, 40.6]},
                    "properties": {"name": "b"}
                }
            ]
        })
    }

    #[test]
    fn open_fails_fast_on_missing_path() {
        let error = FeatureDataset::open(Path::new("/nonexistent/input.geojson")).unwrap_err();
        assert!(error.to_string().contains("not found"));
    }

    #[test]
    fn open_rejects_bare_feature() {
        let file = write_dataset(&json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [0.0, 0.0]},
            "properties": {}
        }));
        let error = FeatureDataset::open(file.path()).unwrap_err();
        assert!(error.to_string().contains("not a GeoJSON FeatureCollection"));
    }

    #[test]
    fn crs_defaults_to_geographic() {
        let file = write_dataset(&point_collection());
        let dataset = FeatureDataset::open(file.path()).unwrap();
        assert_eq!(dataset.crs(), "EPSG:4326");
    }

    #[test]
    fn crs_reads_urn_member() {
        let mut value = point_collection();
        value["crs"] = json!({
            "type": "name",
            "properties": {"name": "urn:ogc:def:crs:EPSG::26915"}
        });
        let file = write_dataset(&value);
        let dataset = FeatureDataset::open(file.path()).unwrap();
        assert_eq!(dataset.crs(), "EPSG:26915");
    }

    #[test]
    fn crs_reads_versioned_urn_member() {
        // OGC URNs may carry an authority version between EPSG and the code.
        let mut value = point_collection();
        value["crs"] = json!({
            "type": "name",
            "properties": {"name": "urn:ogc:def:crs:EPSG:8.9:26915"}
        });
        let file = write_dataset(&value);
        let dataset = FeatureDataset::open(file.path()).unwrap();
        assert_eq!(dataset.crs(), "EPSG:26915");
    }

    #[test]
    fn crs_keeps_unrecognized_names_verbatim() {
        let mut value = point_collection();
        value["crs"] = json!({
            "type": "name",
            "properties": {"name": "ESRI:102100"}
        });
        let file = write_dataset(&value);
        let dataset = FeatureDataset::open(file.path()).unwrap();
        assert_eq!(dataset.crs(), "ESRI:102100");
    }

    #[test]
    fn crs84_maps_to_epsg_4326() {
        let mut value = point_collection();
        value["crs"] = json!({
            "type": "name",
            "properties": {"name": "urn:ogc:def:crs:OGC:1.3:CRS84"}
        });
        let file = write_dataset(&value);
        let dataset = FeatureDataset::open(file.path()).unwrap();
        assert_eq!(dataset.crs(), "EPSG:4326");
    }

    #[test]
    fn ensure_field_is_idempotent() {
        let file = write_dataset(&point_collection());
        let mut dataset = FeatureDataset::open(file.path()).unwrap();

        assert_eq!(dataset.ensure_field("elevation"), 2);
        assert_eq!(dataset.ensure_field("elevation"), 0);

        for (_, feature) in dataset.features() {
            let properties = feature.properties.as_ref().unwrap();
            assert_eq!(properties.get("elevation"), Some(&Value::Null));
        }
    }

    #[test]
    fn ensure_field_keeps_existing_values() {
        let mut value = point_collection();
        value["features"][0]["properties"]["elevation"] = json!(42.0);
        let file = write_dataset(&value);
        let mut dataset = FeatureDataset::open(file.path()).unwrap();

        assert_eq!(dataset.ensure_field("elevation"), 1);
        let (_, first) = dataset.features().next().unwrap();
        assert_eq!(
            first.properties.as_ref().unwrap().get("elevation"),
            Some(&json!(42.0))
        );
    }

    #[test]
    fn apply_samples_writes_value_sentinel_or_nothing() {
        let mut value = point_collection();
        value["features"]
            .as_array_mut()
            .unwrap()
            .push(json!({
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-111.7, 40.5]},
                "properties": {"name": "c"}
            }));
        let file = write_dataset(&value);
        let mut dataset = FeatureDataset::open(file.path()).unwrap();
        dataset.ensure_field("elevation");

        let mut samples = HashMap::new();
        samples.insert(0, Some(1288.2));
        samples.insert(1, None);
        // id 2 has no sample on purpose

        assert_eq!(dataset.apply_samples("elevation", &samples, -9999.0), 2);

        let values: Vec<&Value> = dataset
            .features()
            .map(|(_, f)| f.properties.as_ref().unwrap().get("elevation").unwrap())
            .collect();
        assert_eq!(values[0], &json!(1288.2));
        assert_eq!(values[1], &json!(-9999.0));
        assert_eq!(values[2], &Value::Null);
    }

    #[test]
    fn save_replaces_the_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.geojson");
        std::fs::write(&path, serde_json::to_string(&point_collection()).unwrap()).unwrap();

        let mut dataset = FeatureDataset::open(&path).unwrap();
        dataset.ensure_field("elevation");
        dataset.save().unwrap();

        // The rename leaves exactly the dataset file behind, no temp files.
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("sites.geojson")]);

        let reloaded = FeatureDataset::open(&path).unwrap();
        assert_eq!(reloaded.feature_count(), 2);
    }

    #[test]
    fn save_round_trips_and_keeps_crs() {
        let mut value = point_collection();
        value["crs"] = json!({
            "type": "name",
            "properties": {"name": "urn:ogc:def:crs:EPSG::26915"}
        });
        let file = write_dataset(&value);

        let mut dataset = FeatureDataset::open(file.path()).unwrap();
        dataset.ensure_field("elevation");
        let mut samples = HashMap::new();
        samples.insert(0, Some(100.0));
        dataset.apply_samples("elevation", &samples, -9999.0);
        dataset.save().unwrap();

        let reloaded = FeatureDataset::open(file.path()).unwrap();
        assert_eq!(reloaded.crs(), "EPSG:26915");
        assert_eq!(reloaded.feature_count(), 2);
        let (_, first) = reloaded.features().next().unwrap();
        assert_eq!(
            first.properties.as_ref().unwrap().get("elevation"),
            Some(&json!(100.0))
        );
        assert_eq!(
            first.properties.as_ref().unwrap().get("name"),
            Some(&json!("a"))
        );
    }
}
