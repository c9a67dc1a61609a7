// src/miner/job.rs
//! Jobs, seeds and shares
//!
//! Wire forms (`JobMessage`, `ShareMessage`) are what the pool speaks; `Job`
//! and `ShareSubmission` are the decoded values the engine works with.

use crate::miner::target::Target;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte offset of the 4-byte little-endian nonce inside the block template
pub const NONCE_OFFSET: usize = 39;

/// Smallest blob that can hold the nonce field
pub const MIN_BLOB_LEN: usize = NONCE_OFFSET + 4;

/// Identity of a digest-context generation
///
/// Compared byte-for-byte; any difference triggers a full context rebuild.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Seed(Vec<u8>);

impl Seed {
    /// Wraps raw seed bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Seed(bytes.into())
    }

    /// Decodes a seed from its hex wire form
    pub fn from_hex(hex_str: &str) -> Result<Self, MinerError> {
        Ok(Seed(hex::decode(hex_str)?))
    }

    /// Raw seed bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed({})", self)
    }
}

/// Short hex prefix, enough to tell generations apart in logs
impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<empty>");
        }
        let shown = &self.0[..self.0.len().min(8)];
        write!(f, "{}", hex::encode(shown))
    }
}

/// Job notification as sent by the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    /// Opaque job identifier
    pub job_id: String,
    /// Hex-encoded block template
    pub blob: String,
    /// Hex target, 8 (compact) or 64 (full) chars
    pub target: String,
    /// Hex seed selecting the dataset generation
    #[serde(default)]
    pub seed_hash: Option<String>,
}

/// A decoded mining job
///
/// Immutable once issued; a newer job supersedes it for dispatch purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Unique identifier for the job
    pub job_id: String,
    /// Block template the nonce is written into
    pub blob: Vec<u8>,
    /// Difficulty threshold for shares
    pub target: Target,
    /// Seed of the dataset this job must be hashed against
    pub seed: Seed,
}

impl Job {
    /// Builds a job, checking the template can hold a nonce
    pub fn new(
        job_id: impl Into<String>,
        blob: Vec<u8>,
        target: Target,
        seed: Seed,
    ) -> Result<Self, MinerError> {
        let job_id = job_id.into();
        if job_id.is_empty() {
            return Err(MinerError::InvalidJob("empty job_id".into()));
        }
        if blob.len() < MIN_BLOB_LEN {
            return Err(MinerError::InvalidJob(format!(
                "blob of {} bytes cannot hold a nonce at offset {}",
                blob.len(),
                NONCE_OFFSET
            )));
        }

        Ok(Job {
            job_id,
            blob,
            target,
            seed,
        })
    }
}

impl TryFrom<JobMessage> for Job {
    type Error = MinerError;

    fn try_from(msg: JobMessage) -> Result<Self, Self::Error> {
        let seed = match msg.seed_hash.as_deref() {
            Some(seed_hex) => Seed::from_hex(seed_hex)?,
            None => Seed::default(),
        };

        Job::new(
            msg.job_id,
            hex::decode(&msg.blob)?,
            Target::from_hex(&msg.target)?,
            seed,
        )
    }
}

/// Writes `nonce` little-endian into the nonce field of `blob`
///
/// `blob` must be at least [`MIN_BLOB_LEN`] bytes, which `Job::new` guarantees.
pub fn write_nonce(blob: &mut [u8], nonce: u32) {
    blob[NONCE_OFFSET..MIN_BLOB_LEN].copy_from_slice(&nonce.to_le_bytes());
}

/// A nonce/digest pair that satisfied the job target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareSubmission {
    /// Job ID this share belongs to
    pub job_id: String,
    /// Nonce that produced the qualifying digest
    pub nonce: u32,
    /// Resulting digest
    pub result: [u8; 32],
}

impl ShareSubmission {
    /// Wire form expected by the pool
    pub fn to_message(&self) -> ShareMessage {
        ShareMessage {
            job_id: self.job_id.clone(),
            nonce: hex::encode(self.nonce.to_le_bytes()),
            result: hex::encode(self.result),
        }
    }
}

/// Share as sent to the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareMessage {
    /// Job the share was found for
    pub job_id: String,
    /// 4-byte little-endian nonce, hex
    pub nonce: String,
    /// 32-byte digest, hex
    pub result: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn message(blob: &str) -> JobMessage {
        JobMessage {
            job_id: "A".into(),
            blob: blob.into(),
            target: "f33c0000".into(),
            seed_hash: Some("aa".repeat(32)),
        }
    }

    #[test]
    fn test_job_from_wire_message() {
        let json = format!(
            r#"{{"job_id":"A","blob":"{}","target":"f33c0000","seed_hash":"{}"}}"#,
            "07".repeat(76),
            "aa".repeat(32)
        );
        let msg: JobMessage = serde_json::from_str(&json).unwrap();
        let job = Job::try_from(msg).unwrap();

        assert_eq!(job.job_id, "A");
        assert_eq!(job.blob.len(), 76);
        assert_eq!(job.seed.as_bytes(), &[0xaa; 32]);
        assert_eq!(job.target.difficulty(), 275_265);
    }

    #[test]
    fn test_missing_seed_decodes_to_empty_seed() {
        let msg: JobMessage = serde_json::from_str(&format!(
            r#"{{"job_id":"A","blob":"{}","target":"ffffffff"}}"#,
            "00".repeat(43)
        ))
        .unwrap();

        assert_eq!(Job::try_from(msg).unwrap().seed, Seed::default());
    }

    #[test]
    fn test_short_blob_is_rejected() {
        let err = Job::try_from(message(&"00".repeat(42))).unwrap_err();
        assert!(matches!(err, MinerError::InvalidJob(_)));
    }

    #[test]
    fn test_bad_hex_is_rejected() {
        let err = Job::try_from(message("not hex")).unwrap_err();
        assert!(matches!(err, MinerError::InputError(_)));
    }

    #[test]
    fn test_write_nonce_little_endian_at_offset() {
        let mut blob = vec![0u8; 76];
        write_nonce(&mut blob, 0x1234_5678);

        assert_eq!(&blob[NONCE_OFFSET..NONCE_OFFSET + 4], &[0x78, 0x56, 0x34, 0x12]);
        assert!(blob[..NONCE_OFFSET].iter().all(|b| *b == 0));
        assert!(blob[NONCE_OFFSET + 4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_share_wire_format() {
        let share = ShareSubmission {
            job_id: "B".into(),
            nonce: 0x0000_00ff,
            result: hex!("d600bb8c2762fb638e6ea4daa807d4ee1fe0612716332d67e3dcf906f33c0000"),
        };
        let msg = share.to_message();

        assert_eq!(msg.nonce, "ff000000");
        assert_eq!(
            msg.result,
            "d600bb8c2762fb638e6ea4daa807d4ee1fe0612716332d67e3dcf906f33c0000"
        );
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({
                "job_id": "B",
                "nonce": "ff000000",
                "result": "d600bb8c2762fb638e6ea4daa807d4ee1fe0612716332d67e3dcf906f33c0000"
            })
        );
    }

    #[test]
    fn test_seed_equality_is_bytewise() {
        assert_eq!(Seed::from_hex("0102").unwrap(), Seed::new(vec![1, 2]));
        assert_ne!(Seed::new(vec![1, 2]), Seed::new(vec![1, 2, 0]));
    }
}
