//! RIFF/WAVE decoding for the headless audio backend.
//!
//! Only the header is interpreted: PCM (format 1) and IEEE float (format 3)
//! streams are accepted and their shape reported. Samples are kept as raw
//! bytes; playback is outside this host.

use futures::future::{self, FutureExt, LocalBoxFuture};

use crate::audio::{AudioBackend, AudioInfo};
use crate::backend::BackendResult;
use crate::error::BackendError;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

/// Shape of a decoded WAV stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub block_align: u16,
}

/// A decoded clip: format plus the untouched `data` chunk.
#[derive(Debug, Clone)]
pub struct WavClip {
    pub format: WavFormat,
    pub samples: Vec<u8>,
}

impl WavClip {
    pub fn frame_count(&self) -> u32 {
        match self.format.block_align {
            0 => 0,
            align => (self.samples.len() / align as usize) as u32,
        }
    }

    pub fn info(&self) -> AudioInfo {
        let frames = self.frame_count();
        let duration_ms = match self.format.sample_rate {
            0 => 0,
            rate => ((frames as f64 / rate as f64) * 1000.0).round() as u32,
        };
        AudioInfo {
            duration_ms,
            frame_count: frames,
            channel_count: self.format.channels as u32,
            sample_rate: self.format.sample_rate,
        }
    }
}

fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes
        .get(at..at + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_le_bytes)
}

fn le_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
}

fn invalid(reason: &str) -> BackendError {
    BackendError::native(format!("unable to decode audio data: {reason}"))
}

/// Parse a complete RIFF/WAVE byte stream.
pub fn parse_wav(data: &[u8]) -> BackendResult<WavClip> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(invalid("not a RIFF/WAVE stream"));
    }

    let mut format = None;
    let mut samples = None;
    let mut offset = 12;
    while offset + 8 <= data.len() {
        let id = &data[offset..offset + 4];
        let size = le_u32(data, offset + 4).ok_or_else(|| invalid("truncated chunk header"))? as usize;
        let body_start = offset + 8;
        let body_end = body_start
            .checked_add(size)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| invalid("chunk runs past end of stream"))?;
        let body = &data[body_start..body_end];

        match id {
            b"fmt " => {
                if body.len() < 16 {
                    return Err(invalid("fmt chunk too short"));
                }
                format = Some(WavFormat {
                    format_tag: le_u16(body, 0).unwrap_or_default(),
                    channels: le_u16(body, 2).unwrap_or_default(),
                    sample_rate: le_u32(body, 4).unwrap_or_default(),
                    block_align: le_u16(body, 12).unwrap_or_default(),
                    bits_per_sample: le_u16(body, 14).unwrap_or_default(),
                });
            }
            b"data" => samples = Some(body.to_vec()),
            _ => {}
        }

        // chunks are word aligned
        offset = body_end + (size & 1);
    }

    let format = format.ok_or_else(|| invalid("missing fmt chunk"))?;
    let samples = samples.ok_or_else(|| invalid("missing data chunk"))?;

    match format.format_tag {
        FORMAT_PCM | FORMAT_IEEE_FLOAT => {}
        other => return Err(invalid(&format!("unsupported format tag {other}"))),
    }
    if format.channels == 0 || format.sample_rate == 0 || format.block_align == 0 {
        return Err(invalid("fmt chunk describes an empty stream"));
    }

    Ok(WavClip { format, samples })
}

/// Audio context of the WAV backend. Carries no state.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavContext;

/// Decodes WAV streams in process; decode results settle immediately.
#[derive(Debug, Default)]
pub struct WavAudio;

impl AudioBackend for WavAudio {
    type Context = WavContext;
    type Buffer = WavClip;

    fn create_context(&self) -> BackendResult<WavContext> {
        Ok(WavContext)
    }

    fn decode(
        &self,
        _context: &WavContext,
        data: Vec<u8>,
    ) -> LocalBoxFuture<'static, BackendResult<WavClip>> {
        future::ready(parse_wav(&data)).boxed_local()
    }

    fn info(&self, buffer: &WavClip) -> AudioInfo {
        buffer.info()
    }
}

#[cfg(test)]
pub(crate) fn build_wav(format_tag: u16, channels: u16, sample_rate: u32, frames: u32) -> Vec<u8> {
    let bits_per_sample: u16 = if format_tag == FORMAT_IEEE_FLOAT { 32 } else { 16 };
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * block_align as u32;
    let data_size = frames * block_align as u32;

    let mut wav = Vec::new();
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(4 + 8 + 16 + 8 + data_size).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&format_tag.to_le_bytes());
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());
    wav.resize(wav.len() + data_size as usize, 0);
    wav
}
