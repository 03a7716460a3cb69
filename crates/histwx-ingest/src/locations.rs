//! Location source: the ordered list of locations a run fetches

use csv::{ReaderBuilder, Trim};
use histwx_core::Location;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

use crate::{IngestError, IngestResult};

#[derive(Deserialize)]
struct LocationRow {
    #[serde(default)]
    location_id: Option<String>,
    #[serde(default)]
    location_name: Option<String>,
}

/// Load locations from a CSV file with `location_id,location_name` headers
///
/// `#` lines and blank lines are skipped and extra columns ignored. A row
/// missing either field is an error. Duplicate (id, name) pairs are dropped,
/// keeping the first.
pub fn load_locations(path: impl AsRef<Path>) -> IngestResult<Vec<Location>> {
    let path = path.as_ref();
    let csv_error = |source| IngestError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(Trim::All)
        .flexible(true)
        .from_reader(file);
    let headers = reader.headers().map_err(csv_error)?.clone();

    let mut locations = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        let line = record.position().map_or(0, |p| p.line());
        let row: LocationRow = record.deserialize(Some(&headers)).map_err(csv_error)?;

        let id = row.location_id.filter(|s| !s.is_empty());
        let name = row.location_name.filter(|s| !s.is_empty());
        match (id, name) {
            (Some(id), Some(name)) => locations.push(Location::new(id, name)),
            (Some(id), None) => {
                return Err(IngestError::InvalidRow {
                    path: path.to_path_buf(),
                    line,
                    reason: format!("location {} has no name", id),
                })
            }
            (None, _) => {
                return Err(IngestError::InvalidRow {
                    path: path.to_path_buf(),
                    line,
                    reason: "missing location_id".to_string(),
                })
            }
        }
    }

    let total = locations.len();
    let locations = dedup_locations(locations);
    debug!(
        path = %path.display(),
        "Loaded {} locations ({} duplicates dropped)",
        locations.len(),
        total - locations.len()
    );
    Ok(locations)
}

/// Drop repeated (id, name) pairs, keeping first-occurrence order
pub fn dedup_locations<I>(locations: I) -> Vec<Location>
where
    I: IntoIterator<Item = Location>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for location in locations {
        if seen.insert(location.clone()) {
            unique.push(location);
        } else {
            warn!(location = %location, "Duplicate location ignored");
        }
    }
    unique
}
