fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use filestream_protocol::types::{StatusResponse, TransferSummary, UploadResponse};
    use filestream_protocol::{ChunkMessage, MetadataMessage, TransferStatus};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    ///
    /// Producers that emit `100` and Rust's `100.0` for an `f64` are
    /// semantically identical.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    serde_json::json!(f)
                } else {
                    v.clone()
                }
            }
            serde_json::Value::Object(map) => {
                let normalized: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect();
                serde_json::Value::Object(normalized)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent, float-normalized comparison).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
    }

    // --- Broker messages ---

    #[test]
    fn fixture_metadata_message() {
        roundtrip_test::<MetadataMessage>("metadata_message.json");

        let msg = MetadataMessage::decode(read_fixture("metadata_message.json").as_bytes()).unwrap();
        let metadata = msg.metadata();
        assert_eq!(metadata.filename, "report.pdf");
        assert_eq!(metadata.total_chunks, 3);
        assert_eq!(metadata.created_at, msg.timestamp);
    }

    #[test]
    fn fixture_chunk_message() {
        roundtrip_test::<ChunkMessage>("chunk_message.json");

        let msg = ChunkMessage::decode(read_fixture("chunk_message.json").as_bytes()).unwrap();
        assert_eq!(msg.data, b"Hello");
        assert_eq!(msg.chunk_number, 2);
        assert_eq!(msg.size, 5);
    }

    #[test]
    fn chunk_message_matches_fixture_bytes() {
        let msg = ChunkMessage::new("3f1c9a52-7d2e-4b8a-9c61-0e5f2d7a8b14", 2, 3, b"Hello".to_vec());
        let ours = serde_json::to_value(&msg).unwrap();
        assert_eq!(ours, load_fixture("chunk_message.json"));
    }

    // --- Service contract ---

    #[test]
    fn fixture_status_response() {
        roundtrip_test::<StatusResponse>("status_response.json");

        let status: StatusResponse = serde_json::from_value(load_fixture("status_response.json")).unwrap();
        assert_eq!(status.status, TransferStatus::Uploading);
        assert!(status.error.is_none());
    }

    #[test]
    fn fixture_upload_response() {
        roundtrip_test::<UploadResponse>("upload_response.json");
    }

    #[test]
    fn fixture_transfer_list() {
        roundtrip_test::<Vec<TransferSummary>>("transfer_list.json");

        let list: Vec<TransferSummary> = serde_json::from_value(load_fixture("transfer_list.json")).unwrap();
        assert_eq!(list[0].status, TransferStatus::DownloadCompleted);
        assert_eq!(list[1].progress_percent, 0.0);
    }
}
