//! The signed operation descriptor.
//!
//! ```text
//! 0  u32 signature
//! 4  u32 flag
//! 8  u64 model id
//! 16 u32 thread id
//! 20 u32 op index
//! 24 u64 duration
//! 32 u64 start
//! 40 u64 end
//! 48 u64 execution time
//! 56 u64 cube fops
//! 64 u64 vector fops
//! ```

pub mod index;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::parser::record::OpFlag;
use crate::parser::wire::{read_u32_le, read_u64_le};

pub use index::OpIndexTable;

/// Encoded descriptor size in bytes.
pub const PROF_OP_DESC_SIZE: usize = 72;

const SIGNATURE_SIZE: usize = 4;

/// Name and type written for synthesized step descriptors.
pub const KEYPOINT_OP_NAME: &str = "Iteration";
pub const KEYPOINT_OP_TYPE: &str = "KEYPOINT_OP";

/// Op type of a fused fine-grained subgraph.
pub const FFTS_PLUS_OP_TYPE: &str = "FFTS_PLUS";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescError {
    #[error("descriptor must be 72 bytes, got {0}")]
    InvalidLength(usize),

    #[error("signature mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    SignatureMismatch { stored: u32, computed: u32 },

    #[error("unknown descriptor flag {0}")]
    UnknownFlag(u32),
}

/// One completed operation, ready for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfOpDesc {
    pub flag: OpFlag,
    pub model_id: u64,
    pub thread_id: u32,
    pub op_index: u32,
    pub duration: u64,
    pub start: u64,
    pub end: u64,
    pub execution_time: u64,
    pub cube_fops: u64,
    pub vector_fops: u64,
}

impl ProfOpDesc {
    /// Serialize and sign.
    pub fn encode(&self) -> [u8; PROF_OP_DESC_SIZE] {
        let mut buf = [0u8; PROF_OP_DESC_SIZE];
        buf[4..8].copy_from_slice(&(self.flag as u32).to_le_bytes());
        buf[8..16].copy_from_slice(&self.model_id.to_le_bytes());
        buf[16..20].copy_from_slice(&self.thread_id.to_le_bytes());
        buf[20..24].copy_from_slice(&self.op_index.to_le_bytes());
        buf[24..32].copy_from_slice(&self.duration.to_le_bytes());
        buf[32..40].copy_from_slice(&self.start.to_le_bytes());
        buf[40..48].copy_from_slice(&self.end.to_le_bytes());
        buf[48..56].copy_from_slice(&self.execution_time.to_le_bytes());
        buf[56..64].copy_from_slice(&self.cube_fops.to_le_bytes());
        buf[64..72].copy_from_slice(&self.vector_fops.to_le_bytes());
        let signature = compute_signature(&buf);
        buf[..SIGNATURE_SIZE].copy_from_slice(&signature.to_le_bytes());
        buf
    }

    /// Verify the signature, then decode the fields.
    pub fn decode(data: &[u8]) -> Result<Self, DescError> {
        if data.len() != PROF_OP_DESC_SIZE {
            return Err(DescError::InvalidLength(data.len()));
        }
        let stored = read_u32_le(data, 0);
        let computed = compute_signature(data);
        if stored != computed {
            return Err(DescError::SignatureMismatch { stored, computed });
        }
        let raw_flag = read_u32_le(data, 4);
        let flag = OpFlag::from_u32(raw_flag).ok_or(DescError::UnknownFlag(raw_flag))?;
        Ok(Self {
            flag,
            model_id: read_u64_le(data, 8),
            thread_id: read_u32_le(data, 16),
            op_index: read_u32_le(data, 20),
            duration: read_u64_le(data, 24),
            start: read_u64_le(data, 32),
            end: read_u64_le(data, 40),
            execution_time: read_u64_le(data, 48),
            cube_fops: read_u64_le(data, 56),
            vector_fops: read_u64_le(data, 64),
        })
    }
}

/// Signature over every byte after the signature field: the first four
/// bytes of SHA-256, little-endian.
pub fn compute_signature(data: &[u8]) -> u32 {
    let body = data.get(SIGNATURE_SIZE..).unwrap_or(&[]);
    let digest = Sha256::digest(body);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// True when `data` is a whole descriptor whose signature matches.
pub fn verify(data: &[u8]) -> bool {
    data.len() == PROF_OP_DESC_SIZE && read_u32_le(data, 0) == compute_signature(data)
}
