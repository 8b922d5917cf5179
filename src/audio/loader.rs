use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::resample::resample_mono;
use crate::audio::types::{AudioBuffer, AudioFormat};
use crate::config::AudioConfig;
use crate::error::AudioError;

/// Decodes encoded audio bytes into an analysis-ready [`AudioBuffer`]
pub struct AudioLoader;

impl AudioLoader {
    /// Decode, downmix, resample, normalize and check the duration ceiling.
    ///
    /// This is the only fatal stage of the pipeline.
    pub fn decode(bytes: &[u8], format: AudioFormat, config: &AudioConfig) -> Result<AudioBuffer, AudioError> {
        if bytes.len() as u64 > config.max_file_bytes {
            return Err(AudioError::FileTooLarge {
                size: bytes.len() as u64,
                limit: config.max_file_bytes,
            });
        }

        let (interleaved, channels, source_rate) = match format {
            AudioFormat::Wav => Self::decode_wav(bytes)?,
            AudioFormat::Mp3 | AudioFormat::Flac | AudioFormat::M4a => {
                Self::decode_with_symphonia(bytes, format)?
            }
        };

        let mono = Self::downmix(&interleaved, channels);
        if mono.is_empty() {
            return Err(AudioError::Decode {
                reason: "no audio samples decoded".to_string(),
            });
        }

        // Gate on the decoded length so long files are never resampled
        if mono.len() > config.max_samples(source_rate) {
            return Err(AudioError::DurationExceeded {
                duration: mono.len() as f64 / source_rate as f64,
                limit: config.max_duration_secs,
            });
        }

        let mut samples = resample_mono(&mono, source_rate, config.sample_rate)?;

        if config.normalize {
            Self::normalize(&mut samples);
        }

        let buffer = AudioBuffer::new(samples, config.sample_rate)?;
        tracing::info!(
            "Loaded audio: {} samples at {} Hz ({:.2}s, source {} Hz, {} channel(s))",
            buffer.len(),
            buffer.sample_rate(),
            buffer.duration(),
            source_rate,
            channels
        );

        Ok(buffer)
    }

    /// Decode WAV with hound
    fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, usize, u32), AudioError> {
        let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| AudioError::Decode {
            reason: format!("invalid WAV data: {}", e),
        })?;

        let spec = reader.spec();
        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AudioError::Decode {
                    reason: format!("corrupt WAV samples: {}", e),
                })?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| Self::int_to_float(s, bit_depth)))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| AudioError::Decode {
                        reason: format!("corrupt WAV samples: {}", e),
                    })?
            }
        };

        Ok((samples, spec.channels.max(1) as usize, spec.sample_rate))
    }

    /// Decode compressed formats with Symphonia
    fn decode_with_symphonia(bytes: &[u8], format: AudioFormat) -> Result<(Vec<f32>, usize, u32), AudioError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(format.extension());

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| AudioError::Decode {
                reason: format!("unrecognized {} container: {}", format, e),
            })?;

        let mut reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::Decode {
                reason: "no audio track found".to_string(),
            })?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.ok_or_else(|| AudioError::Decode {
            reason: "no sample rate found".to_string(),
        })?;

        let dec_opts: DecoderOptions = Default::default();
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &dec_opts)
            .map_err(|e| AudioError::Decode {
                reason: format!("unsupported codec: {}", e),
            })?;

        let mut samples = Vec::new();
        let mut channels = track.codec_params.channels.map_or(1, |c| c.count());

        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(AudioError::Decode {
                        reason: format!("failed to read packet: {}", e),
                    })
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(SymphoniaError::IoError(_)) => break,
                Err(e) => {
                    return Err(AudioError::Decode {
                        reason: format!("decoder failure: {}", e),
                    })
                }
            };

            let spec = *decoded.spec();
            channels = spec.channels.count().max(1);

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        Ok((samples, channels, sample_rate))
    }

    /// Convert integer sample to float (-1.0 to 1.0)
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        let full_scale = (1i64 << (bit_depth.clamp(8, 32) - 1)) as f32;
        sample as f32 / full_scale
    }

    /// Average interleaved channels down to mono
    fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
        if channels <= 1 {
            return interleaved.to_vec();
        }

        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Scale so the peak absolute amplitude is exactly 1.0
    fn normalize(samples: &mut [f32]) {
        let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        if peak > 0.0 {
            for sample in samples.iter_mut() {
                *sample /= peak;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encode mono samples as a 16-bit WAV in memory
    pub(crate) fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn crc8(bytes: &[u8]) -> u8 {
        bytes.iter().fold(0u8, |mut crc, &b| {
            crc ^= b;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
            }
            crc
        })
    }

    fn crc16(bytes: &[u8]) -> u16 {
        bytes.iter().fold(0u16, |mut crc, &b| {
            crc ^= (b as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
            }
            crc
        })
    }

    /// Encode mono samples as an uncompressed (verbatim subframe) 16-bit FLAC stream
    fn flac_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
        const BLOCK: usize = 4096;
        assert!(samples.len().div_ceil(BLOCK) < 128);

        let mut out = b"fLaC".to_vec();
        // Last metadata block, STREAMINFO, 34 bytes
        out.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
        out.extend_from_slice(&(BLOCK as u16).to_be_bytes());
        out.extend_from_slice(&(BLOCK as u16).to_be_bytes());
        out.extend_from_slice(&[0; 6]);
        let packed = ((sample_rate as u64) << 44) | (15u64 << 36) | samples.len() as u64;
        out.extend_from_slice(&packed.to_be_bytes());
        out.extend_from_slice(&[0; 16]);

        for (index, block) in samples.chunks(BLOCK).enumerate() {
            // Fixed blocking, 16-bit block size at end of header, rate from STREAMINFO,
            // mono, 16 bits per sample
            let mut frame = vec![0xFF, 0xF8, 0x70, 0x08, index as u8];
            frame.extend_from_slice(&((block.len() - 1) as u16).to_be_bytes());
            frame.push(crc8(&frame));

            frame.push(0x02);
            for &s in block {
                frame.extend_from_slice(&((s.clamp(-1.0, 1.0) * 32767.0) as i16).to_be_bytes());
            }
            let crc = crc16(&frame);
            frame.extend_from_slice(&crc.to_be_bytes());
            out.extend_from_slice(&frame);
        }
        out
    }

    fn sine(len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_int_to_float_conversion() {
        assert_eq!(AudioLoader::int_to_float(0, 16), 0.0);
        assert_eq!(AudioLoader::int_to_float(32767, 16), 32767.0 / 32768.0);
        assert_eq!(AudioLoader::int_to_float(-32768, 16), -1.0);
        assert_eq!(AudioLoader::int_to_float(-128, 8), -1.0);
        assert_eq!(AudioLoader::int_to_float(-8388608, 24), -1.0);
    }

    #[test]
    fn test_downmix_stereo() {
        let stereo = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(AudioLoader::downmix(&stereo, 2), vec![1.5, 3.5, 5.5]);
    }

    #[test]
    fn test_decode_wav_normalizes_peak() {
        let config = AudioConfig::default();
        let bytes = wav_bytes(&sine(22050, 22050), 22050);

        let buffer = AudioLoader::decode(&bytes, AudioFormat::Wav, &config).unwrap();
        assert_eq!(buffer.sample_rate(), 22050);
        assert_eq!(buffer.len(), 22050);
        assert!((buffer.peak() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_resamples_to_analysis_rate() {
        let config = AudioConfig::default();
        let bytes = wav_bytes(&sine(44100, 44100), 44100);

        let buffer = AudioLoader::decode(&bytes, AudioFormat::Wav, &config).unwrap();
        assert_eq!(buffer.sample_rate(), config.sample_rate);
        assert_eq!(buffer.len(), 22050);
        assert_eq!(buffer.duration(), 1.0);
    }

    #[test]
    fn test_ceiling_applies_at_source_rate() {
        let config = AudioConfig {
            max_duration_secs: 1.0,
            ..AudioConfig::default()
        };

        for source_rate in [44100, 48000] {
            let at_limit = wav_bytes(&sine(source_rate as usize, source_rate), source_rate);
            let buffer = AudioLoader::decode(&at_limit, AudioFormat::Wav, &config).unwrap();
            assert_eq!(buffer.len(), 22050, "{} Hz", source_rate);

            let over_limit = wav_bytes(&sine(source_rate as usize + 1, source_rate), source_rate);
            match AudioLoader::decode(&over_limit, AudioFormat::Wav, &config) {
                Err(AudioError::DurationExceeded { duration, limit }) => {
                    assert!(duration > 1.0, "{} Hz", source_rate);
                    assert_eq!(limit, 1.0);
                }
                other => panic!("{} Hz: expected DurationExceeded, got {:?}", source_rate, other),
            }
        }
    }

    #[test]
    fn test_duration_exactly_at_ceiling_succeeds() {
        let config = AudioConfig {
            max_duration_secs: 2.0,
            ..AudioConfig::default()
        };
        let bytes = wav_bytes(&sine(44100, 22050), 22050);

        let buffer = AudioLoader::decode(&bytes, AudioFormat::Wav, &config).unwrap();
        assert_eq!(buffer.duration(), 2.0);
    }

    #[test]
    fn test_one_sample_over_ceiling_fails() {
        let config = AudioConfig {
            max_duration_secs: 2.0,
            ..AudioConfig::default()
        };
        let bytes = wav_bytes(&sine(44101, 22050), 22050);

        match AudioLoader::decode(&bytes, AudioFormat::Wav, &config) {
            Err(AudioError::DurationExceeded { limit, .. }) => assert_eq!(limit, 2.0),
            other => panic!("Expected DurationExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_flac_matches_wav() {
        let config = AudioConfig::default();
        let source = sine(44100, 44100);

        let flac = AudioLoader::decode(&flac_bytes(&source, 44100), AudioFormat::Flac, &config).unwrap();
        let wav = AudioLoader::decode(&wav_bytes(&source, 44100), AudioFormat::Wav, &config).unwrap();

        assert_eq!(flac.sample_rate(), 22050);
        assert_eq!(flac.len(), 22050);
        assert!((flac.peak() - 1.0).abs() < 1e-6);
        let crossings = flac
            .samples()
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        assert!((870..=890).contains(&crossings), "{} zero crossings", crossings);

        let max_diff = flac
            .samples()
            .iter()
            .zip(wav.samples())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff < 1e-4, "FLAC and WAV differ by {}", max_diff);
    }

    #[test]
    fn test_flac_duration_ceiling() {
        let config = AudioConfig {
            max_duration_secs: 1.0,
            ..AudioConfig::default()
        };
        let over_limit = flac_bytes(&sine(48001, 48000), 48000);
        assert!(matches!(
            AudioLoader::decode(&over_limit, AudioFormat::Flac, &config),
            Err(AudioError::DurationExceeded { .. })
        ));
    }

    #[test]
    fn test_corrupt_bytes_fail_to_decode() {
        let config = AudioConfig::default();
        for format in AudioFormat::ALL {
            let result = AudioLoader::decode(b"definitely not audio", format, &config);
            assert!(matches!(result, Err(AudioError::Decode { .. })), "{:?}", format);
        }
    }

    #[test]
    fn test_oversized_upload_rejected() {
        let config = AudioConfig {
            max_file_bytes: 16,
            ..AudioConfig::default()
        };
        let bytes = wav_bytes(&sine(100, 22050), 22050);
        assert!(matches!(
            AudioLoader::decode(&bytes, AudioFormat::Wav, &config),
            Err(AudioError::FileTooLarge { .. })
        ));
    }
}
