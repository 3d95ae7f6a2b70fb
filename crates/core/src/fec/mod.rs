//! Forward-error-correction framing.
//!
//! Source packets are ordinary RTP packets with an FEC payload ID appended
//! as a footer, so receivers without FEC support can still play them.
//! Repair packets start with the payload ID, followed by the repair symbol.
//!
//! ```text
//! source:  [ RTP header | media payload | payload ID ]
//! repair:  [ payload ID | repair symbol              ]
//! ```
//!
//! Payload ID layouts (big endian, 8 bytes):
//!
//! | Scheme | SBN | ESI | SBL | BL |
//! |--------|-----|-----|-----|----|
//! | Reed-Solomon m=8 (RFC 6865) | 24 | 8 | 16 | 16 |
//! | LDPC-Staircase (RFC 6816) | 16 | 16 | 16 | 16 |
//!
//! SBN = source block number, ESI = encoding symbol id, SBL = source block
//! length (k), BL = block length (n).

pub mod composer;

use crate::address::FecScheme;
use crate::error::{Result, SendError};
use crate::packet::FecMeta;

pub use composer::{FecComposer, PayloadIdPosition};

/// Size of the payload ID for every supported scheme.
pub const PAYLOAD_ID_SIZE: usize = 8;

/// Serialize the payload ID of `meta` into `out`.
pub(crate) fn write_payload_id(meta: &FecMeta, out: &mut [u8]) -> Result<()> {
    if out.len() != PAYLOAD_ID_SIZE {
        return Err(SendError::BadLayout("FEC payload ID slot has wrong size"));
    }
    if meta.source_block_length > 0xffff || meta.block_length > 0xffff {
        return Err(SendError::BadLayout("FEC block length out of range"));
    }

    match meta.scheme {
        FecScheme::ReedSolomonM8 => {
            if meta.source_block_number > 0xff_ffff || meta.encoding_symbol_id > 0xff {
                return Err(SendError::BadLayout("RS8M payload ID field out of range"));
            }
            out[0..3].copy_from_slice(&meta.source_block_number.to_be_bytes()[1..4]);
            out[3] = meta.encoding_symbol_id as u8;
        }
        FecScheme::LdpcStaircase => {
            if meta.source_block_number > 0xffff || meta.encoding_symbol_id > 0xffff {
                return Err(SendError::BadLayout("LDPC payload ID field out of range"));
            }
            out[0..2].copy_from_slice(&(meta.source_block_number as u16).to_be_bytes());
            out[2..4].copy_from_slice(&(meta.encoding_symbol_id as u16).to_be_bytes());
        }
    }
    out[4..6].copy_from_slice(&(meta.source_block_length as u16).to_be_bytes());
    out[6..8].copy_from_slice(&(meta.block_length as u16).to_be_bytes());
    Ok(())
}
