//! CBOR encoding of stored records.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, StoreError};
use crate::traits::Node;

/// Encode a record as CBOR bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Decode a record from CBOR bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Encode a record as a live node.
pub fn encode_node<T: Serialize>(value: &T) -> Result<Node> {
    encode(value).map(Node::Value)
}

/// Decode a live node. Tombstones decode to `None`.
pub fn decode_node<T: DeserializeOwned>(node: &Node) -> Result<Option<T>> {
    node.value().map(|bytes| decode(bytes)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        tags: Vec<String>,
    }

    #[test]
    fn test_node_codec() {
        let record = Record {
            name: "spec".into(),
            tags: vec!["draft".into()],
        };
        let node = encode_node(&record).unwrap();
        assert_eq!(decode_node::<Record>(&node).unwrap(), Some(record));
        assert_eq!(
            decode_node::<Record>(&Node::Tombstone { deleted_at: 1 }).unwrap(),
            None
        );
    }

    #[test]
    fn test_decode_garbage_is_serialization_error() {
        let err = decode::<Record>(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
