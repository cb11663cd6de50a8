use crate::error::StoreError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    InProgress,
    Completed,
}

/// Outcome of one client-identified mutating operation.
///
/// The replay payload only exists on `Completed`, so a record can never
/// carry a status code while still in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyRecord {
    InProgress,
    Completed { status_code: u16, body: Vec<u8> },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

impl IdempotencyRecord {
    pub fn completed(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        IdempotencyRecord::Completed {
            status_code,
            body: body.into(),
        }
    }

    pub fn status(&self) -> RecordStatus {
        match self {
            IdempotencyRecord::InProgress => RecordStatus::InProgress,
            IdempotencyRecord::Completed { .. } => RecordStatus::Completed,
        }
    }

    pub fn encode(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let wire = match self {
            IdempotencyRecord::InProgress => WireRecord {
                status: RecordStatus::InProgress,
                status_code: None,
                body: None,
            },
            IdempotencyRecord::Completed { status_code, body } => WireRecord {
                status: RecordStatus::Completed,
                status_code: Some(*status_code),
                body: Some(STANDARD.encode(body)),
            },
        };

        serde_json::to_vec(&wire).map_err(|e| corrupt(key, e.to_string()))
    }

    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self, StoreError> {
        let wire: WireRecord = serde_json::from_slice(bytes).map_err(|e| corrupt(key, e.to_string()))?;

        match (wire.status, wire.status_code, wire.body) {
            (RecordStatus::InProgress, None, None) => Ok(IdempotencyRecord::InProgress),
            (RecordStatus::Completed, Some(status_code), Some(body)) => {
                let body = STANDARD
                    .decode(body)
                    .map_err(|e| corrupt(key, format!("body is not valid base64: {}", e)))?;
                Ok(IdempotencyRecord::Completed { status_code, body })
            }
            (RecordStatus::InProgress, _, _) => {
                Err(corrupt(key, "in-progress record carries a response".to_string()))
            }
            (RecordStatus::Completed, _, _) => {
                Err(corrupt(key, "completed record is missing statusCode or body".to_string()))
            }
        }
    }
}

fn corrupt(key: &str, reason: String) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_progress_wire_format() {
        let encoded = IdempotencyRecord::InProgress.encode("k").unwrap();
        assert_eq!(encoded, br#"{"status":"in_progress"}"#.to_vec());
    }

    #[test]
    fn test_completed_preserves_arbitrary_bytes() {
        let body = vec![0u8, 159, 146, 150, b'{', b'}', 255];
        let record = IdempotencyRecord::completed(201, body.clone());
        let encoded = record.encode("k").unwrap();

        let json: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["statusCode"], 201);

        match IdempotencyRecord::decode("k", &encoded).unwrap() {
            IdempotencyRecord::Completed { status_code, body: decoded } => {
                assert_eq!(status_code, 201);
                assert_eq!(decoded, body);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_rejects_inconsistent_records() {
        let completed_without_body = br#"{"status":"completed","statusCode":200}"#;
        assert!(matches!(
            IdempotencyRecord::decode("k", completed_without_body),
            Err(StoreError::Corrupt { .. })
        ));

        let in_progress_with_code = br#"{"status":"in_progress","statusCode":200,"body":""}"#;
        assert!(IdempotencyRecord::decode("k", in_progress_with_code).is_err());

        let unknown_status = br#"{"status":"failed"}"#;
        assert!(IdempotencyRecord::decode("k", unknown_status).is_err());
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(IdempotencyRecord::InProgress.status(), RecordStatus::InProgress);
        assert_eq!(
            IdempotencyRecord::completed(200, b"ok".to_vec()).status(),
            RecordStatus::Completed
        );
    }
}
