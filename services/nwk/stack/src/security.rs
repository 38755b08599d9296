//! Payload security engine
//!
//! Payloads are sealed with AES-128-GCM under the shared network key. The
//! encoded network header supplies both the nonce (zero-padded to 12 bytes)
//! and the associated data, so any change to the network header invalidates
//! the tag. The 16-byte tag is appended to the payload.
//!
//! The engine works on one job at a time and never completes synchronously:
//! a queued job is ciphered on one [`SecurityEngine::poll`] step and reported
//! on the next, the way a hardware cipher block would be paced.

use crate::pool::{FrameHandle, FramePool};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::Aes128Gcm;
use nwk_wire::{MAX_PAYLOAD_SIZE, MIC_SIZE, NWK_HEADER_SIZE};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace};

/// Network key length in bytes
pub const KEY_SIZE: usize = 16;

const NONCE_SIZE: usize = 12;

/// Cipher direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Seal an outbound payload and append the tag
    Encrypt,
    /// Verify and strip the tag of an inbound payload
    Decrypt,
}

/// A finished job, returned to the pipeline that queued it
#[derive(Debug)]
pub struct SecurityCompletion {
    /// Frame the job ran on
    pub handle: FrameHandle,
    /// Job direction
    pub direction: Direction,
    /// Whether the cipher step succeeded (tag verified, for decryption)
    pub success: bool,
}

#[derive(Debug)]
struct Job {
    handle: FrameHandle,
    direction: Direction,
}

/// Poll-driven payload cipher
pub struct SecurityEngine {
    cipher: Option<Aes128Gcm>,
    queue: VecDeque<Job>,
    finished: Option<SecurityCompletion>,
}

impl SecurityEngine {
    /// Engine without a key; every job fails until one is installed
    pub fn new() -> Self {
        Self {
            cipher: None,
            queue: VecDeque::new(),
            finished: None,
        }
    }

    /// Install the network key
    pub fn set_key(&mut self, key: &[u8; KEY_SIZE]) {
        self.cipher = Some(Aes128Gcm::new(GenericArray::from_slice(key)));
    }

    /// Whether a key is installed
    pub fn has_key(&self) -> bool {
        self.cipher.is_some()
    }

    /// Queue a frame for encryption or decryption; ownership returns with the completion
    pub fn process(&mut self, handle: FrameHandle, direction: Direction) {
        trace!("Queued {:?} of frame {}", direction, handle.index());
        self.queue.push_back(Job { handle, direction });
    }

    /// Whether jobs are queued or awaiting report
    pub fn busy(&self) -> bool {
        !self.queue.is_empty() || self.finished.is_some()
    }

    /// Advance the engine by one step
    pub fn poll(&mut self, pool: &mut FramePool) -> Option<SecurityCompletion> {
        if let Some(done) = self.finished.take() {
            return Some(done);
        }

        let job = self.queue.pop_front()?;
        let result = match job.direction {
            Direction::Encrypt => self.encrypt(pool, &job.handle),
            Direction::Decrypt => self.decrypt(pool, &job.handle),
        };
        if let Err(err) = &result {
            debug!(
                "{:?} of frame {} failed: {}",
                job.direction,
                job.handle.index(),
                err
            );
        }

        self.finished = Some(SecurityCompletion {
            handle: job.handle,
            direction: job.direction,
            success: result.is_ok(),
        });
        None
    }

    fn encrypt(&self, pool: &mut FramePool, handle: &FrameHandle) -> Result<(), SecurityError> {
        let cipher = self.cipher.as_ref().ok_or(SecurityError::NoKey)?;
        let frame = pool.get_mut(handle);
        let header = frame.header().nwk.to_bytes();
        let len = frame.payload().len();
        if len + MIC_SIZE > MAX_PAYLOAD_SIZE {
            return Err(SecurityError::Length(len));
        }

        let nonce = nonce(&header);
        let buf = frame.payload_buf_mut();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &header, &mut buf[..len])
            .map_err(|_| SecurityError::Cipher)?;
        buf[len..len + MIC_SIZE].copy_from_slice(tag.as_slice());

        frame
            .set_payload_len(len + MIC_SIZE)
            .map_err(|_| SecurityError::Length(len))
    }

    fn decrypt(&self, pool: &mut FramePool, handle: &FrameHandle) -> Result<(), SecurityError> {
        let cipher = self.cipher.as_ref().ok_or(SecurityError::NoKey)?;
        let frame = pool.get_mut(handle);
        let header = frame.header().nwk.to_bytes();
        let len = frame.payload().len();
        if len < MIC_SIZE {
            return Err(SecurityError::Length(len));
        }

        let nonce = nonce(&header);
        let data_len = len - MIC_SIZE;
        let (data, tag) = frame.payload_mut().split_at_mut(data_len);
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&nonce),
                &header,
                data,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| SecurityError::Tag)?;

        frame
            .set_payload_len(data_len)
            .map_err(|_| SecurityError::Length(len))
    }
}

impl Default for SecurityEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SecurityEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityEngine")
            .field("has_key", &self.has_key())
            .field("queued", &self.queue.len())
            .field("finished", &self.finished)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
enum SecurityError {
    #[error("no network key")]
    NoKey,
    #[error("payload length {0} out of range")]
    Length(usize),
    #[error("cipher failure")]
    Cipher,
    #[error("authentication tag mismatch")]
    Tag,
}

fn nonce(header: &[u8; NWK_HEADER_SIZE]) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..NWK_HEADER_SIZE].copy_from_slice(header);
    nonce
}
