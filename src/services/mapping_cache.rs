//! Node-to-twin mapping table, fetched once and kept for the life of the process.

use log::info;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::client::build_agent;
use crate::config::LOG_BODIES;
use crate::error::BridgeError;
use crate::models::mapping::MappingEntry;

/// Where the mapping document comes from.
pub trait MappingSource {
    fn fetch(&self) -> Result<Vec<MappingEntry>, BridgeError>;
}

/// Reads the mapping document from an `http(s)://` URL, a `file://` URL or a plain path.
pub struct DocumentMappingSource {
    location: Location,
    log_verbosity: i32,
}

enum Location {
    Http { agent: ureq::Agent, url: String },
    File(PathBuf),
}

impl DocumentMappingSource {
    pub fn new(url: &str, timeout: Duration, log_verbosity: i32) -> Self {
        let location = if url.starts_with("http://") || url.starts_with("https://") {
            Location::Http {
                agent: build_agent(timeout),
                url: url.to_string(),
            }
        } else {
            Location::File(PathBuf::from(url.strip_prefix("file://").unwrap_or(url)))
        };
        DocumentMappingSource {
            location,
            log_verbosity,
        }
    }

    fn describe(&self) -> String {
        match &self.location {
            Location::Http { url, .. } => url.clone(),
            Location::File(path) => path.display().to_string(),
        }
    }

    fn download(&self) -> Result<String, BridgeError> {
        match &self.location {
            Location::Http { agent, url } => {
                let resp = agent
                    .get(url)
                    .header("Accept", "application/json")
                    .call()
                    .map_err(|e| BridgeError::MappingUnavailable(format!("GET {} failed: {}", url, e)))?;
                let status = resp.status();
                let body = resp
                    .into_body()
                    .read_to_string()
                    .map_err(|e| BridgeError::MappingUnavailable(format!("reading {} failed: {}", url, e)))?;
                if !status.is_success() {
                    return Err(BridgeError::MappingUnavailable(format!(
                        "GET {} returned http {}",
                        url,
                        status.as_u16()
                    )));
                }
                Ok(body)
            }
            Location::File(path) => std::fs::read_to_string(path)
                .map_err(|e| BridgeError::MappingUnavailable(format!("failed to read {}: {}", path.display(), e))),
        }
    }
}

impl MappingSource for DocumentMappingSource {
    fn fetch(&self) -> Result<Vec<MappingEntry>, BridgeError> {
        let json = self.download()?;
        if self.log_verbosity >= LOG_BODIES {
            info!("Mapping document from '{}':\n{}", self.describe(), json);
        }
        parse_mapping_document(&json)
    }
}

/// Parses the document, reporting the JSON path of the first offending field.
pub fn parse_mapping_document(json: &str) -> Result<Vec<MappingEntry>, BridgeError> {
    let mut de = serde_json::Deserializer::from_str(json);
    let entries: Vec<MappingEntry> = serde_path_to_error::deserialize(&mut de).map_err(|e| {
        BridgeError::MappingUnavailable(format!("invalid mapping document at '{}': {}", e.path(), e.inner()))
    })?;
    de.end()
        .map_err(|e| BridgeError::MappingUnavailable(format!("invalid mapping document: {}", e)))?;
    Ok(entries)
}

/// Cold-start cache over a [`MappingSource`].
///
/// The first successful `get` stores the table; later calls never re-fetch.
/// Failed loads are not cached, so the next invocation tries again.
pub struct MappingCache<S> {
    source: S,
    table: OnceLock<Vec<MappingEntry>>,
}

impl<S: MappingSource> MappingCache<S> {
    pub fn new(source: S) -> Self {
        MappingCache {
            source,
            table: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Result<&[MappingEntry], BridgeError> {
        if let Some(table) = self.table.get() {
            return Ok(table.as_slice());
        }
        info!("Mapping table not cached yet, loading from source");
        let fetched = self.source.fetch()?;
        info!("Mapping table loaded ({} entries)", fetched.len());
        // A concurrent first load may have won; its content is identical.
        Ok(self.table.get_or_init(|| fetched).as_slice())
    }

    pub fn is_loaded(&self) -> bool {
        self.table.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingSource {
        calls: Cell<usize>,
        fail_first: bool,
    }

    impl MappingSource for CountingSource {
        fn fetch(&self) -> Result<Vec<MappingEntry>, BridgeError> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if self.fail_first && n == 1 {
                return Err(BridgeError::MappingUnavailable("connection refused".into()));
            }
            parse_mapping_document(
                r#"[{"nodeKey":"Temp01","entityId":"sensor-1","modelId":"dtmi:sensor;1","propertyName":"Temperature"}]"#,
            )
        }
    }

    #[test]
    fn loads_once_and_serves_from_cache() {
        let cache = MappingCache::new(CountingSource {
            calls: Cell::new(0),
            fail_first: false,
        });
        assert!(!cache.is_loaded());
        assert_eq!(cache.get().unwrap().len(), 1);
        assert_eq!(cache.get().unwrap()[0].entity_id, "sensor-1");
        assert_eq!(cache.source.calls.get(), 1);
        assert!(cache.is_loaded());
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = MappingCache::new(CountingSource {
            calls: Cell::new(0),
            fail_first: true,
        });
        assert!(matches!(cache.get(), Err(BridgeError::MappingUnavailable(_))));
        assert!(!cache.is_loaded());
        assert_eq!(cache.get().unwrap().len(), 1);
        assert_eq!(cache.source.calls.get(), 2);
    }

    #[test]
    fn parse_error_reports_path() {
        let err = parse_mapping_document(r#"[{"nodeKey":"a","entityId":"b","modelId":"c"}]"#).unwrap_err();
        match err {
            BridgeError::MappingUnavailable(msg) => {
                assert!(msg.contains("[0]"), "unexpected message: {}", msg);
                assert!(msg.contains("propertyName"), "unexpected message: {}", msg);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_array_document_is_rejected() {
        assert!(matches!(
            parse_mapping_document(r#"{"nodeKey":"a"}"#),
            Err(BridgeError::MappingUnavailable(_))
        ));
    }

    #[test]
    fn trailing_content_is_rejected() {
        let doc = r#"[{"nodeKey":"Temp01","entityId":"sensor-1","modelId":"dtmi:sensor;1","propertyName":"Temperature"}] this is not json"#;
        assert!(matches!(parse_mapping_document(doc), Err(BridgeError::MappingUnavailable(_))));

        let concatenated = r#"[{"nodeKey":"a","entityId":"b","modelId":"c","propertyName":"d"}][]"#;
        assert!(matches!(parse_mapping_document(concatenated), Err(BridgeError::MappingUnavailable(_))));

        let padded = "  [{\"nodeKey\":\"a\",\"entityId\":\"b\",\"modelId\":\"c\",\"propertyName\":\"d\"}]\n";
        assert_eq!(parse_mapping_document(padded).unwrap().len(), 1);
    }

    #[test]
    fn reads_mapping_from_file_path() {
        let path = std::env::temp_dir().join(format!("opc-twin-bridge-map-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"NodeId":"1001","TwinId":"Boiler","ModelId":"dtmi:boiler;1","Property":"Pressure"}]"#,
        )
        .unwrap();
        let source = DocumentMappingSource::new(&format!("file://{}", path.display()), Duration::from_secs(1), 100);
        let entries = source.fetch().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(entries[0].property_name, "Pressure");
    }

    #[test]
    fn missing_file_is_unavailable() {
        let source = DocumentMappingSource::new("/nonexistent/map.json", Duration::from_secs(1), 100);
        assert!(matches!(source.fetch(), Err(BridgeError::MappingUnavailable(_))));
    }
}
