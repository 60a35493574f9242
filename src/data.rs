use crate::config::{AppConfig, InputConfig};
use crate::types::{Attribute, Region, StatRecord};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use geojson::GeoJson;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Everything the render pipeline consumes: joined regions, the full record
/// set (classification reads records that never joined, too), and the
/// undecorated background geometry.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub regions: Vec<Region>,
    pub records: Vec<StatRecord>,
    pub background: Vec<MultiPolygon<f64>>,
}

/// Load the three datasets concurrently and join. Any single load failure
/// fails the whole pipeline: there is no partial rendering.
pub fn load_inputs(config: &AppConfig) -> Result<Inputs> {
    info!("Loading input datasets...");

    let input = &config.input;
    let (records, (regions, background)) = rayon::join(
        || load_stat_records(input),
        || {
            rayon::join(
                || load_regions(input),
                || load_background(&input.background),
            )
        },
    );
    let records = records?;
    let mut regions = regions?;
    let background = background?;

    info!(
        records = records.len(),
        regions = regions.len(),
        background = background.len(),
        "Datasets loaded"
    );

    join_data(&mut regions, &records);

    Ok(Inputs {
        regions,
        records,
        background,
    })
}

/// Transfer every present attribute value from the record sharing a region's
/// key into that region's property bag. Unmatched regions come back
/// unchanged. A linear scan over the records per region is O(n*m), fine for
/// a few dozen rows each; index the records by key before calling this if
/// the inputs ever grow.
///
/// Duplicate keys on the record side resolve last-write-wins. That is
/// inherited ambiguity, pinned by a test rather than papered over.
pub fn join_data(regions: &mut [Region], records: &[StatRecord]) {
    for region in regions.iter_mut() {
        for record in records {
            if record.code == region.code {
                for attr in Attribute::ALL {
                    if let Some(v) = record.value(attr) {
                        region.attrs.insert(attr, v);
                    } else {
                        region.attrs.remove(&attr);
                    }
                }
                if region.name.is_none() && !record.name.is_empty() {
                    region.name = Some(record.name.clone());
                }
            }
        }
    }
}

fn load_stat_records(input: &InputConfig) -> Result<Vec<StatRecord>> {
    let file = File::open(&input.stats_csv)
        .with_context(|| format!("Failed to open CSV file: {:?}", input.stats_csv))?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let headers = rdr.headers()?.clone();

    let key_idx = headers
        .iter()
        .position(|h| h == input.join_column)
        .ok_or_else(|| anyhow!("Join column '{}' not found in CSV", input.join_column))?;
    let name_idx = headers
        .iter()
        .position(|h| h == input.name_column)
        .ok_or_else(|| anyhow!("Name column '{}' not found in CSV", input.name_column))?;

    let attr_indices: Vec<(Attribute, usize)> = Attribute::ALL
        .into_iter()
        .filter_map(|attr| {
            headers
                .iter()
                .position(|h| h == attr.as_str())
                .map(|i| (attr, i))
        })
        .collect();

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result?;
        let code = row.get(key_idx).unwrap_or("").to_string();
        if code.is_empty() {
            continue;
        }

        let mut values = std::collections::HashMap::new();
        for (attr, idx) in &attr_indices {
            // Malformed numeric text is missing, not zero.
            if let Some(v) = row.get(*idx).and_then(|s| s.trim().parse::<f64>().ok()) {
                if v.is_finite() {
                    values.insert(*attr, v);
                }
            }
        }

        records.push(StatRecord {
            code,
            name: row.get(name_idx).unwrap_or("").to_string(),
            values,
        });
    }

    Ok(records)
}

fn load_regions(input: &InputConfig) -> Result<Vec<Region>> {
    let extension = input
        .regions
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Regions geometry file has no extension"))?;

    match extension.as_str() {
        "shp" => load_regions_shapefile(input),
        "json" | "geojson" => load_regions_geojson(input),
        _ => Err(anyhow!("Unsupported geometry format: {}", extension)),
    }
}

fn load_regions_geojson(input: &InputConfig) -> Result<Vec<Region>> {
    let collection = read_feature_collection(&input.regions)?;

    let mut regions = Vec::new();
    for feature in collection.features {
        let props = feature.properties.as_ref();

        let code = match props.and_then(|p| p.get(&input.join_column)) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue, // no usable key
        };
        let name = match props.and_then(|p| p.get(&input.name_column)) {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => None,
        };

        let Some(geometry) = feature.geometry.and_then(to_multi_polygon) else {
            continue;
        };

        regions.push(Region {
            code,
            name,
            geometry,
            attrs: Default::default(),
        });
    }

    Ok(regions)
}

fn load_regions_shapefile(input: &InputConfig) -> Result<Vec<Region>> {
    let mut reader = shapefile::Reader::from_path(&input.regions)
        .with_context(|| format!("Failed to open shapefile: {:?}", input.regions))?;

    let mut regions = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let code = match record.get(&input.join_column) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => s.clone(),
            Some(shapefile::dbase::FieldValue::Character(None)) => continue,
            Some(_) => return Err(anyhow!("Shapefile join column must be a string")),
            None => {
                return Err(anyhow!(
                    "Join column '{}' not found in shapefile",
                    input.join_column
                ))
            }
        };
        let name = match record.get(&input.name_column) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => Some(s.clone()),
            _ => None,
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(p) => p
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            _ => continue, // skip non-polygon shapes
        };

        regions.push(Region {
            code,
            name,
            geometry,
            attrs: Default::default(),
        });
    }

    Ok(regions)
}

fn load_background(path: &Path) -> Result<Vec<MultiPolygon<f64>>> {
    let collection = read_feature_collection(path)?;
    Ok(collection
        .features
        .into_iter()
        .filter_map(|f| f.geometry.and_then(to_multi_polygon))
        .collect())
}

fn read_feature_collection(path: &Path) -> Result<geojson::FeatureCollection> {
    let file =
        File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);
    // Loads the whole file into memory; fine at this data scale.
    let geojson = GeoJson::from_reader(reader)
        .with_context(|| format!("Failed to parse GeoJSON: {:?}", path))?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(anyhow!("GeoJSON must be a FeatureCollection: {:?}", path)),
    }
}

fn to_multi_polygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let converted: geo::Geometry<f64> = geometry.value.try_into().ok()?;
    match converted {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        _ => None, // skip points/lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use std::collections::HashMap;
    use std::io::Write;

    fn record(code: &str, pairs: &[(Attribute, f64)]) -> StatRecord {
        StatRecord {
            code: code.to_string(),
            name: format!("Region {code}"),
            values: pairs.iter().copied().collect(),
        }
    }

    fn region(code: &str) -> Region {
        Region {
            code: code.to_string(),
            name: None,
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
            ]]),
            attrs: HashMap::new(),
        }
    }

    #[test]
    fn join_transfers_every_tracked_attribute() {
        let mut regions = vec![region("FR-A")];
        let records = vec![record(
            "FR-A",
            &[(Attribute::VarA, 10.0), (Attribute::VarC, 3.5)],
        )];
        join_data(&mut regions, &records);

        assert_eq!(regions[0].value(Attribute::VarA), Some(10.0));
        assert_eq!(regions[0].value(Attribute::VarC), Some(3.5));
        assert_eq!(regions[0].value(Attribute::VarB), None);
        assert_eq!(regions[0].name.as_deref(), Some("Region FR-A"));
    }

    #[test]
    fn unmatched_region_gains_no_attributes() {
        let mut regions = vec![region("FR-Z")];
        let records = vec![record("FR-A", &[(Attribute::VarA, 10.0)])];
        join_data(&mut regions, &records);
        assert!(regions[0].attrs.is_empty());
    }

    // Duplicate keys resolve last-write-wins. This pins the inherited
    // behavior; if it ever changes, it should change deliberately.
    #[test]
    fn duplicate_record_keys_last_write_wins() {
        let mut regions = vec![region("FR-A")];
        let records = vec![
            record("FR-A", &[(Attribute::VarA, 1.0)]),
            record("FR-A", &[(Attribute::VarA, 2.0)]),
        ];
        join_data(&mut regions, &records);
        assert_eq!(regions[0].value(Attribute::VarA), Some(2.0));
    }

    #[test]
    fn csv_malformed_numbers_are_missing_not_zero() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "adm1_code,name,varA,varB,varC,varD,varE").unwrap();
        writeln!(file, "FR-A,Alsace,10,not-a-number,,3,4").unwrap();
        file.flush().unwrap();

        let input = InputConfig {
            regions: "unused.geojson".into(),
            background: "unused.geojson".into(),
            stats_csv: file.path().to_path_buf(),
            join_column: "adm1_code".to_string(),
            name_column: "name".to_string(),
        };
        let records = load_stat_records(&input).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value(Attribute::VarA), Some(10.0));
        assert_eq!(records[0].value(Attribute::VarB), None);
        assert_eq!(records[0].value(Attribute::VarC), None);
        assert_eq!(records[0].value(Attribute::VarD), Some(3.0));
    }

    #[test]
    fn geojson_regions_load_and_join() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"adm1_code": "FR-A", "name": "Alsace"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[7.0, 48.0], [8.0, 48.0], [8.0, 49.0], [7.0, 48.0]]]
                }
            }, {
                "type": "Feature",
                "properties": {"name": "keyless, skipped"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
                }
            }]
        }"#;
        let mut file = tempfile::NamedTempFile::with_suffix(".geojson").unwrap();
        file.write_all(geojson.as_bytes()).unwrap();
        file.flush().unwrap();

        let input = InputConfig {
            regions: file.path().to_path_buf(),
            background: "unused.geojson".into(),
            stats_csv: "unused.csv".into(),
            join_column: "adm1_code".to_string(),
            name_column: "name".to_string(),
        };
        let regions = load_regions(&input).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].code, "FR-A");
        assert_eq!(regions[0].name.as_deref(), Some("Alsace"));
    }
}
