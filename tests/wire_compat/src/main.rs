fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chunkload_protocol::{
        ApiResponse, CODE_ERROR, CODE_OK, DelFileRequest, HashEvent, MergeRequest,
        UploadChunkData, VerifyData, VerifyRequest, parse_chunk_index,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    ///
    /// Browsers serialize `40.0` as `40`, serde serializes `f64` as `40.0`.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
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
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    // --- Requests ---

    #[test]
    fn fixture_verify_request() {
        let req = roundtrip_test::<VerifyRequest>("verify_request.json");
        assert_eq!(req.file_name, "holiday.mov");
    }

    #[test]
    fn fixture_merge_request() {
        let req = roundtrip_test::<MergeRequest>("merge_request.json");
        assert_eq!(req.chunk_size, 1_048_576);
    }

    #[test]
    fn fixture_del_file_request() {
        roundtrip_test::<DelFileRequest>("del_file_request.json");
    }

    #[test]
    fn merge_request_rejects_string_chunk_size() {
        let result = serde_json::from_str::<MergeRequest>(
            r#"{"fileHash":"a","fileName":"b","chunkSize":"1024"}"#,
        );
        assert!(result.is_err());
    }

    // --- Responses ---

    #[test]
    fn fixture_verify_response_missing() {
        let resp = roundtrip_test::<ApiResponse<VerifyData>>("verify_response_missing.json");
        assert!(resp.is_ok());
        let data = resp.data.unwrap();
        assert!(data.should_upload);
        let indices: Vec<_> = data
            .uploaded_list
            .iter()
            .filter_map(|k| parse_chunk_index(k))
            .collect();
        assert_eq!(indices, vec![0, 1, 4]);
    }

    #[test]
    fn fixture_verify_response_exists() {
        let resp = roundtrip_test::<ApiResponse<VerifyData>>("verify_response_exists.json");
        assert_eq!(resp.data, Some(VerifyData::already_uploaded()));
    }

    #[test]
    fn fixture_upload_response() {
        let resp = roundtrip_test::<ApiResponse<UploadChunkData>>("upload_response.json");
        assert_eq!(resp.code, CODE_OK);
        assert!(resp.data.unwrap().chunk_hash.ends_with("-3"));
    }

    #[test]
    fn fixture_merge_response() {
        let resp = roundtrip_test::<ApiResponse<String>>("merge_response.json");
        assert_eq!(resp.data.as_deref(), Some(""));
    }

    #[test]
    fn fixture_error_response() {
        let resp = roundtrip_test::<ApiResponse<serde_json::Value>>("error_response.json");
        assert!(!resp.is_ok());
        assert_eq!(resp.code, CODE_ERROR);
        assert!(resp.data.is_none());
    }

    #[test]
    fn untyped_envelope_defers_payload() {
        let body = serde_json::to_vec(&load_fixture("verify_response_missing.json")).unwrap();
        let resp = ApiResponse::from_slice(&body).unwrap();
        let data: VerifyData = resp.into_data().unwrap();
        assert_eq!(data.uploaded_list.len(), 3);
    }

    // --- Hasher events ---

    #[test]
    fn fixture_hash_progress() {
        let evt = roundtrip_test::<HashEvent>("hash_progress.json");
        assert!(!evt.is_terminal());
    }

    #[test]
    fn fixture_hash_done() {
        let evt = roundtrip_test::<HashEvent>("hash_done.json");
        match evt {
            HashEvent::Done { chunks, .. } => {
                assert_eq!(chunks.len(), 3);
                assert_eq!(chunks[2].len(), 3);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn fixture_hash_failed() {
        let evt = roundtrip_test::<HashEvent>("hash_failed.json");
        assert!(evt.is_terminal());
        assert!(matches!(evt, HashEvent::Failed { .. }));
    }
}
