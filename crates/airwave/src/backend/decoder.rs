//! Symphonia decoding for live streams
//!
//! `SymphoniaSource` turns a station's byte stream into interleaved f32
//! samples that rodio can play directly.

use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::{ChannelCount, SampleRate, Source};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{self, CodecType, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::BackendError;
use crate::playback::types::StreamDetails;

const FALLBACK_CHANNELS: u16 = 2;
const FALLBACK_RATE: u32 = 44_100;

/// Display label for a codec, as shown in stream details
pub fn codec_label(codec: CodecType) -> &'static str {
    match codec {
        codecs::CODEC_TYPE_MP3 => "MP3",
        codecs::CODEC_TYPE_AAC => "AAC",
        codecs::CODEC_TYPE_VORBIS => "Vorbis",
        codecs::CODEC_TYPE_OPUS => "Opus",
        codecs::CODEC_TYPE_FLAC => "FLAC",
        codecs::CODEC_TYPE_PCM_U8 => "PCM 8-bit",
        codecs::CODEC_TYPE_PCM_S16LE | codecs::CODEC_TYPE_PCM_S16BE => "PCM 16-bit",
        codecs::CODEC_TYPE_PCM_S24LE | codecs::CODEC_TYPE_PCM_S24BE => "PCM 24-bit",
        codecs::CODEC_TYPE_PCM_S32LE | codecs::CODEC_TYPE_PCM_S32BE => "PCM 32-bit",
        codecs::CODEC_TYPE_PCM_F32LE | codecs::CODEC_TYPE_PCM_F32BE => "PCM float",
        _ => "Audio",
    }
}

/// Outcome of pulling one packet from the container
enum Pull {
    Frame,
    Finished,
}

pub struct SymphoniaSource {
    reader: Box<dyn FormatReader>,
    codec: Box<dyn Decoder>,
    track: u32,
    frame: Option<SampleBuffer<f32>>,
    cursor: usize,
    spec: (u16, u32),
    label: &'static str,
    /// Why decoding stopped, when it was not a clean end of stream
    failure: Arc<Mutex<Option<String>>>,
}

impl SymphoniaSource {
    /// Probe the stream and build a decoder. Blocks until the container is
    /// recognised and the first frame is decoded.
    pub fn open<R>(input: R, format_hint: Option<&str>) -> Result<Self, BackendError>
    where
        R: Read + Send + Sync + 'static,
    {
        let stream = MediaSourceStream::new(
            Box::new(ReadOnlySource::new(input)),
            MediaSourceStreamOptions::default(),
        );

        let mut hint = Hint::new();
        if let Some(extension) = format_hint {
            hint.with_extension(extension);
        }

        let reader = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| BackendError::Decode(format!("unrecognised stream: {e}")))?
            .format;

        let (track, params) = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != codecs::CODEC_TYPE_NULL)
            .map(|t| (t.id, t.codec_params.clone()))
            .ok_or_else(|| BackendError::Decode("stream carries no audio track".to_string()))?;

        let codec = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| BackendError::Decode(format!("unsupported codec: {e}")))?;

        let channels = params
            .channels
            .map_or(FALLBACK_CHANNELS, |c| c.count() as u16);
        let rate = params.sample_rate.unwrap_or(FALLBACK_RATE);

        let mut source = Self {
            reader,
            codec,
            track,
            frame: None,
            cursor: 0,
            spec: (channels, rate),
            label: codec_label(params.codec),
            failure: Arc::new(Mutex::new(None)),
        };

        // The container header can understate the output rate (HE-AAC), so
        // the first real frame decides what rodio is told.
        source.pull();
        Ok(source)
    }

    pub fn codec_name(&self) -> &str {
        self.label
    }

    pub fn error_slot(&self) -> Arc<Mutex<Option<String>>> {
        Arc::clone(&self.failure)
    }

    pub fn details(&self) -> StreamDetails {
        let (channels, sample_rate) = self.spec;
        StreamDetails {
            codec_name: self.label.to_string(),
            channels,
            sample_rate,
            bitrate: None,
            station_name: None,
        }
    }

    /// Decode the next packet of our track into `frame`
    fn pull(&mut self) -> Pull {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) if packet.track_id() == self.track => packet,
                Ok(_) => continue,
                Err(e) => return finish(&self.failure, e),
            };

            let decoded = match self.codec.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(reason)) => {
                    tracing::trace!(%reason, "dropping corrupt packet");
                    continue;
                }
                Err(e) => return finish(&self.failure, e),
            };

            let spec: SignalSpec = *decoded.spec();
            let frames = decoded.capacity();
            self.spec = (spec.channels.count() as u16, spec.rate);

            let frame = match self.frame.take() {
                Some(buf) if buf.capacity() >= frames => buf,
                _ => SampleBuffer::new(frames as u64, spec),
            };
            self.frame.insert(frame).copy_interleaved_ref(decoded);
            self.cursor = 0;
            return Pull::Frame;
        }
    }
}

fn finish(failure: &Mutex<Option<String>>, error: SymphoniaError) -> Pull {
    match error {
        SymphoniaError::IoError(ref io) if io.kind() == ErrorKind::UnexpectedEof => {}
        other => {
            *failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(other.to_string());
        }
    }
    Pull::Finished
}

impl Iterator for SymphoniaSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        loop {
            let pending = self
                .frame
                .as_ref()
                .and_then(|buf| buf.samples().get(self.cursor).copied());
            if let Some(sample) = pending {
                self.cursor += 1;
                return Some(sample);
            }
            if let Pull::Finished = self.pull() {
                return None;
            }
        }
    }
}

impl Source for SymphoniaSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> ChannelCount {
        self.spec.0
    }

    fn sample_rate(&self) -> SampleRate {
        self.spec.1
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// 16-bit PCM RIFF image
    fn wav(rate: u32, channels: u16, pcm: &[i16]) -> Cursor<Vec<u8>> {
        let data_len = (pcm.len() * 2) as u32;
        let frame_bytes = channels * 2;

        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend(b"RIFF");
        out.extend((36 + data_len).to_le_bytes());
        out.extend(b"WAVEfmt ");
        out.extend(16u32.to_le_bytes());
        out.extend(1u16.to_le_bytes());
        out.extend(channels.to_le_bytes());
        out.extend(rate.to_le_bytes());
        out.extend((rate * frame_bytes as u32).to_le_bytes());
        out.extend(frame_bytes.to_le_bytes());
        out.extend(16u16.to_le_bytes());
        out.extend(b"data");
        out.extend(data_len.to_le_bytes());
        out.extend(pcm.iter().flat_map(|s| s.to_le_bytes()));
        Cursor::new(out)
    }

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| ((i % 64) * 200) as i16).collect()
    }

    #[test]
    fn mono_stream_reports_its_format() {
        let source = SymphoniaSource::open(wav(44_100, 1, &ramp(1024)), None).unwrap();
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 44_100);
        assert_eq!(source.codec_name(), "PCM 16-bit");
    }

    #[test]
    fn extension_hint_is_accepted() {
        let source = SymphoniaSource::open(wav(48_000, 2, &ramp(2048)), Some("wav")).unwrap();
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 48_000);
    }

    #[test]
    fn yields_every_sample_normalised() {
        let pcm = [1000, 2000, 3000, 4000];
        let decoded: Vec<f32> = SymphoniaSource::open(wav(44_100, 1, &pcm), None)
            .unwrap()
            .collect();
        assert_eq!(decoded.len(), pcm.len());
        assert!(decoded.iter().all(|&s| s > 0.0 && s <= 1.0));
    }

    #[test]
    fn clean_end_of_stream_is_not_a_failure() {
        let source = SymphoniaSource::open(wav(44_100, 1, &[0; 500]), None).unwrap();
        let slot = source.error_slot();
        assert_eq!(source.count(), 500);
        assert!(slot.lock().unwrap().is_none());
    }

    #[test]
    fn details_follow_decoded_format() {
        let details = SymphoniaSource::open(wav(22_050, 1, &[0; 100]), None)
            .unwrap()
            .details();
        assert_eq!(details.channels, 1);
        assert_eq!(details.sample_rate, 22_050);
        assert_eq!(details.bitrate, None);
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        let noise: Vec<u8> = (0..1024u32).map(|i| (i * 7 % 256) as u8).collect();
        assert!(matches!(
            SymphoniaSource::open(Cursor::new(noise), None),
            Err(BackendError::Decode(_))
        ));
        assert!(SymphoniaSource::open(Cursor::new(Vec::new()), None).is_err());
    }
}
