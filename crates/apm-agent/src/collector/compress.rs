// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded pool of reusable gzip compressors.
//!
//! The deflate state behind a compressor is a sizeable allocation, so the
//! pool keeps idle compressors around and hands them out one per concurrent
//! request. A semaphore caps how many compressions run at once; callers past
//! the cap wait for a permit instead of allocating another compressor.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use tokio::sync::Semaphore;

/// Fixed gzip member header: deflate method, no flags, no mtime, unknown OS.
///
/// `GzEncoder` cannot be reset onto a new buffer, so the gzip header and
/// CRC32/size trailer are written by hand around a reusable `DeflateEncoder`.
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];

/// Default number of compressors held by a pool.
pub const DEFAULT_POOL_SIZE: usize = 4;

pub struct CompressorPool {
    permits: Semaphore,
    idle: Mutex<Vec<Compressor>>,
    level: Compression,
}

impl CompressorPool {
    /// Creates a pool allowing `size` concurrent compressions. A size of zero
    /// is raised to one.
    #[must_use]
    pub fn new(size: usize, level: Compression) -> Self {
        let size = size.max(1);
        Self {
            permits: Semaphore::new(size),
            idle: Mutex::new(Vec::with_capacity(size)),
            level,
        }
    }

    /// Gzip-compresses `raw` using a pooled compressor.
    pub async fn compress(&self, raw: &[u8]) -> io::Result<Vec<u8>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| io::Error::other("compressor pool closed"))?;

        let mut compressor = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| Compressor::new(self.level));

        let result = compressor.gzip(raw);
        // A compressor that failed mid-stream is discarded; `reset` on the
        // next use would otherwise flush its leftovers.
        if result.is_ok() {
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(compressor);
        }
        result
    }

    /// Number of compressors currently parked in the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for CompressorPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE, Compression::default())
    }
}

struct Compressor {
    encoder: DeflateEncoder<Vec<u8>>,
}

impl Compressor {
    fn new(level: Compression) -> Self {
        Self {
            encoder: DeflateEncoder::new(Vec::new(), level),
        }
    }

    fn gzip(&mut self, raw: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(GZIP_HEADER.len() + raw.len() / 2 + 64);
        out.extend_from_slice(&GZIP_HEADER);
        self.encoder.reset(out)?;
        self.encoder.write_all(raw)?;
        let mut out = self.encoder.reset(Vec::new())?;

        let mut crc = Crc::new();
        crc.update(raw);
        out.extend_from_slice(&crc.sum().to_le_bytes());
        // ISIZE is the input length modulo 2^32.
        #[allow(clippy::cast_possible_truncation)]
        let input_size = raw.len() as u32;
        out.extend_from_slice(&input_size.to_le_bytes());
        Ok(out)
    }
}
