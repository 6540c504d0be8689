use serde::{Deserialize, Serialize};

use crate::types::TransferMetadata;

// ---------------------------------------------------------------------------
// Broker messages
// ---------------------------------------------------------------------------

/// Descriptor published once per transfer on the metadata topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataMessage {
    pub file_id: String,
    pub original_filename: String,
    pub file_size: u64,
    pub total_chunks: u64,
    pub chunk_size: u64,
    pub md5_hash: String,
    pub timestamp: String,
}

impl MetadataMessage {
    /// Builds the wire message for `file_id` from its metadata.
    pub fn new(file_id: impl Into<String>, metadata: &TransferMetadata) -> Self {
        Self {
            file_id: file_id.into(),
            original_filename: metadata.filename.clone(),
            file_size: metadata.file_size,
            total_chunks: metadata.total_chunks,
            chunk_size: metadata.chunk_size,
            md5_hash: metadata.md5_hash.clone(),
            timestamp: metadata.created_at.clone(),
        }
    }

    /// Metadata carried by this message.
    pub fn metadata(&self) -> TransferMetadata {
        TransferMetadata {
            filename: self.original_filename.clone(),
            file_size: self.file_size,
            total_chunks: self.total_chunks,
            chunk_size: self.chunk_size,
            md5_hash: self.md5_hash.clone(),
            created_at: self.timestamp.clone(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// One chunk of a transfer, published on the chunk topic.
///
/// The payload travels as a lowercase hex string in `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMessage {
    pub file_id: String,
    pub chunk_number: u64,
    pub total_chunks: u64,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub size: u64,
}

impl ChunkMessage {
    pub fn new(
        file_id: impl Into<String>,
        chunk_number: u64,
        total_chunks: u64,
        data: Vec<u8>,
    ) -> Self {
        let size = data.len() as u64;
        Self {
            file_id: file_id.into(),
            chunk_number,
            total_chunks,
            data,
            size,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a chunk message, rejecting payloads whose length disagrees
    /// with the declared `size`.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let msg: Self = serde_json::from_slice(bytes)?;
        if msg.data.len() as u64 != msg.size {
            return Err(serde::de::Error::custom(format!(
                "chunk {} declares size {} but carries {} bytes",
                msg.chunk_number,
                msg.size,
                msg.data.len()
            )));
        }
        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Hex serde module for binary payloads embedded in JSON.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        hex::encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> TransferMetadata {
        TransferMetadata {
            filename: "report.pdf".into(),
            file_size: 2_500_000,
            total_chunks: 3,
            chunk_size: 1_048_576,
            md5_hash: "0123456789abcdef0123456789abcdef".into(),
            created_at: "2026-01-02T03:04:05+00:00".into(),
        }
    }

    #[test]
    fn metadata_field_names() {
        let msg = MetadataMessage::new("f1", &sample_metadata());
        let json = serde_json::to_value(&msg).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "chunk_size",
                "file_id",
                "file_size",
                "md5_hash",
                "original_filename",
                "timestamp",
                "total_chunks"
            ]
        );
        assert_eq!(obj["original_filename"], "report.pdf");
    }

    #[test]
    fn metadata_message_carries_metadata() {
        let metadata = sample_metadata();
        let msg = MetadataMessage::new("f1", &metadata);
        let decoded = MetadataMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.file_id, "f1");
        assert_eq!(decoded.metadata(), metadata);
    }

    #[test]
    fn chunk_payload_is_hex() {
        let msg = ChunkMessage::new("f1", 0, 1, b"Hello".to_vec());
        assert_eq!(msg.size, 5);
        let json = String::from_utf8(msg.encode().unwrap()).unwrap();
        assert!(json.contains("\"data\":\"48656c6c6f\""));
        assert!(json.contains("\"chunk_number\":0"));
    }

    #[test]
    fn chunk_decode_rejects_bad_hex() {
        let raw = br#"{"file_id":"f1","chunk_number":0,"total_chunks":1,"data":"zz","size":1}"#;
        assert!(ChunkMessage::decode(raw).is_err());
    }

    #[test]
    fn chunk_decode_rejects_size_mismatch() {
        let raw = br#"{"file_id":"f1","chunk_number":0,"total_chunks":1,"data":"4865","size":5}"#;
        let err = ChunkMessage::decode(raw).unwrap_err();
        assert!(err.to_string().contains("declares size 5"));
    }

    #[test]
    fn chunk_decode_accepts_uppercase_hex() {
        let raw = br#"{"file_id":"f1","chunk_number":2,"total_chunks":3,"data":"4A4B","size":2}"#;
        let msg = ChunkMessage::decode(raw).unwrap();
        assert_eq!(msg.data, b"JK");
        assert_eq!(msg.chunk_number, 2);
    }
}
