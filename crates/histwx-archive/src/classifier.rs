//! location_id → province/city lookup, validated once at load

use csv::{ReaderBuilder, Trim};
use histwx_core::{Classification, Location};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::{ArchiveError, ArchiveResult};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error(
        "no province/city configured for location_id '{0}'; add a \
         location_id,province,city row to the classifier CSV \
         (CITY_CSV_PATH or paths.classifier)"
    )]
    NotFound(String),
}

#[derive(Deserialize)]
struct ClassifierRow {
    #[serde(default)]
    location_id: Option<String>,
    #[serde(default)]
    province: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

/// Typed province/city mapping
#[derive(Debug, Clone, Default)]
pub struct LocationClassifier {
    entries: HashMap<String, Classification>,
    source: Option<PathBuf>,
}

impl LocationClassifier {
    /// Build from in-memory entries; a repeated id is an error
    pub fn from_entries<I>(entries: I) -> ArchiveResult<Self>
    where
        I: IntoIterator<Item = (String, Classification)>,
    {
        let mut map = HashMap::new();
        for (id, classification) in entries {
            validate(&id, &classification)?;
            if map.insert(id.clone(), classification).is_some() {
                return Err(ArchiveError::InvalidClassifier(format!(
                    "duplicate location_id '{}'",
                    id
                )));
            }
        }
        Ok(Self {
            entries: map,
            source: None,
        })
    }

    /// Load a `location_id,province,city` CSV (UTF-8, BOM tolerated)
    pub fn from_csv_path(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ArchiveError::ClassifierIo {
            path: path.to_path_buf(),
            source,
        })?;
        let contents = contents.strip_prefix('\u{feff}').unwrap_or(&contents);

        let csv_error = |source| ArchiveError::ClassifierCsv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(contents.as_bytes());

        let mut entries = Vec::new();
        for (index, result) in reader.deserialize::<ClassifierRow>().enumerate() {
            let row = result.map_err(csv_error)?;
            let id = row.location_id.unwrap_or_default();
            let classification = Classification {
                province: row.province.unwrap_or_default(),
                city: row.city.unwrap_or_default(),
            };
            if id.is_empty() {
                return Err(ArchiveError::InvalidClassifier(format!(
                    "{} record {}: missing location_id",
                    path.display(),
                    index + 1
                )));
            }
            entries.push((id, classification));
        }

        let mut classifier = Self::from_entries(entries)?;
        classifier.source = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            "Loaded {} location classifications",
            classifier.len()
        );
        Ok(classifier)
    }

    pub fn classify(&self, location_id: &str) -> Result<&Classification, ClassificationError> {
        self.entries
            .get(location_id)
            .ok_or_else(|| ClassificationError::NotFound(location_id.to_string()))
    }

    /// Locations with no entry, in input order
    pub fn missing<'a>(&self, locations: &'a [Location]) -> Vec<&'a Location> {
        locations
            .iter()
            .filter(|l| !self.entries.contains_key(&l.id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn validate(id: &str, classification: &Classification) -> ArchiveResult<()> {
    if classification.province.is_empty() || classification.city.is_empty() {
        return Err(ArchiveError::InvalidClassifier(format!(
            "location_id '{}' has an empty province or city",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_with_bom_and_extra_columns() {
        let file = write_csv(
            "\u{feff}location_id,location_name,province,city\n\
             101120101,济南,山东,济南\n\
             101120102, 长清 , 山东 , 济南 \n",
        );

        let classifier = LocationClassifier::from_csv_path(file.path()).unwrap();
        assert_eq!(classifier.len(), 2);
        assert_eq!(classifier.source(), Some(file.path()));

        let c = classifier.classify("101120102").unwrap();
        assert_eq!(c.province, "山东");
        assert_eq!(c.city, "济南");
    }

    #[test]
    fn test_not_found_names_configuration() {
        let classifier = LocationClassifier::default();
        let err = classifier.classify("999").unwrap_err();
        assert_eq!(err, ClassificationError::NotFound("999".into()));

        let message = err.to_string();
        assert!(message.contains("999"));
        assert!(message.contains("CITY_CSV_PATH"));
    }

    #[test]
    fn test_duplicate_id_rejected_at_load() {
        let file = write_csv("location_id,province,city\n1,山东,济南\n1,山东,青岛\n");
        let err = LocationClassifier::from_csv_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_empty_city_rejected_at_load() {
        let file = write_csv("location_id,province,city\n1,山东,\n");
        assert!(matches!(
            LocationClassifier::from_csv_path(file.path()),
            Err(ArchiveError::InvalidClassifier(_))
        ));
    }

    #[test]
    fn test_missing_lists_unconfigured() {
        let classifier = LocationClassifier::from_entries(vec![(
            "1".to_string(),
            Classification {
                province: "山东".into(),
                city: "济南".into(),
            },
        )])
        .unwrap();

        let locations = vec![Location::new("1", "a"), Location::new("2", "b")];
        let missing = classifier.missing(&locations);
        assert_eq!(missing, vec![&locations[1]]);
    }
}
