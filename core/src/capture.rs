use crate::config::{RecorderCommand, SpeechSettings};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("microphone access was denied")]
    PermissionDenied,
    #[error("no microphone found")]
    DeviceNotFound,
    #[error("audio capture failed: {0}")]
    Failed(String),
}

/// Audio format and pacing for one capture session.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_interval: Duration,
}

impl AudioConfig {
    /// Bytes of 16-bit PCM per chunk interval.
    pub fn chunk_bytes(&self) -> usize {
        let samples = u128::from(self.sample_rate) * self.chunk_interval.as_millis() / 1000;
        let bytes = samples * u128::from(self.channels) * 2;
        usize::try_from(bytes).unwrap_or(usize::MAX).max(2)
    }
}

impl From<&SpeechSettings> for AudioConfig {
    fn from(settings: &SpeechSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            chunk_interval: settings.chunk_interval,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self::from(&SpeechSettings::default())
    }
}

/// An open microphone stream.
#[async_trait]
pub trait AudioCapture: Send {
    /// Next chunk of audio; `None` once the stream has ended.
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, CaptureError>>;
    /// Release the device. Safe to call more than once.
    async fn stop(&mut self);
}

#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn open(&self, config: &AudioConfig) -> Result<Box<dyn AudioCapture>, CaptureError>;
}

/// Captures audio by running an external recorder that writes raw PCM to
/// stdout (`parec`, `arecord`, ...).
#[derive(Debug, Clone)]
pub struct CommandAudioSource {
    recorder: RecorderCommand,
}

impl CommandAudioSource {
    pub fn new(recorder: RecorderCommand) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl AudioSource for CommandAudioSource {
    async fn open(&self, config: &AudioConfig) -> Result<Box<dyn AudioCapture>, CaptureError> {
        let mut child = Command::new(&self.recorder.program)
            .args(&self.recorder.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::PermissionDenied => CaptureError::PermissionDenied,
                ErrorKind::NotFound => CaptureError::DeviceNotFound,
                _ => CaptureError::Failed(format!("{}: {err}", self.recorder.program)),
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Failed("recorder stdout unavailable".to_string()))?;
        tracing::debug!(program = %self.recorder.program, "microphone capture started");
        Ok(Box::new(CommandCapture {
            child: Some(child),
            stdout,
            buf: vec![0u8; config.chunk_bytes()],
            filled: 0,
            received: false,
        }))
    }
}

// The partially filled chunk lives on the struct so a `next_chunk` future
// dropped by `select!` loses no audio.
struct CommandCapture {
    child: Option<Child>,
    stdout: ChildStdout,
    buf: Vec<u8>,
    filled: usize,
    received: bool,
}

impl CommandCapture {
    /// Reap the recorder once its output has ended. Only a clean exit ends
    /// the stream quietly.
    async fn exit_status(&mut self) -> Option<Result<Vec<u8>, CaptureError>> {
        let status = self.child.as_mut()?.wait().await;
        self.child = None;
        match status {
            Ok(status) if status.success() => None,
            Ok(status) => {
                tracing::warn!(%status, received = self.received, "recorder exited");
                if self.received {
                    Some(Err(CaptureError::Failed(format!("recorder exited with {status}"))))
                } else {
                    Some(Err(CaptureError::DeviceNotFound))
                }
            }
            Err(err) => Some(Err(CaptureError::Failed(err.to_string()))),
        }
    }
}

#[async_trait]
impl AudioCapture for CommandCapture {
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, CaptureError>> {
        if self.child.is_none() {
            return None;
        }
        while self.filled < self.buf.len() {
            match self.stdout.read(&mut self.buf[self.filled..]).await {
                Ok(0) => break,
                Ok(n) => self.filled += n,
                Err(err) => return Some(Err(CaptureError::Failed(err.to_string()))),
            }
        }
        if self.filled == 0 {
            return self.exit_status().await;
        }
        let chunk = self.buf[..self.filled].to_vec();
        self.filled = 0;
        self.received = true;
        Some(Ok(chunk))
    }

    async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill().await {
                tracing::debug!(%err, "recorder already exited");
            }
            tracing::debug!("microphone capture stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_matches_interval() {
        let config = AudioConfig {
            sample_rate: 16_000,
            channels: 1,
            chunk_interval: Duration::from_millis(100),
        };
        assert_eq!(config.chunk_bytes(), 3_200);

        let stereo = AudioConfig {
            channels: 2,
            ..config
        };
        assert_eq!(stereo.chunk_bytes(), 6_400);
    }

    #[tokio::test]
    async fn missing_recorder_is_device_not_found() {
        let source = CommandAudioSource::new(RecorderCommand {
            program: "shiori-no-such-recorder".into(),
            args: Vec::new(),
        });
        let err = source.open(&AudioConfig::default()).await.err();
        assert_eq!(err, Some(CaptureError::DeviceNotFound));
    }

    fn shell_recorder(script: &str) -> CommandAudioSource {
        CommandAudioSource::new(RecorderCommand {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
        })
    }

    #[tokio::test]
    async fn recorder_failing_at_start_is_device_not_found() {
        let mut capture = shell_recorder("exit 1")
            .open(&AudioConfig::default())
            .await
            .expect("spawn");
        assert_eq!(
            capture.next_chunk().await,
            Some(Err(CaptureError::DeviceNotFound))
        );
        assert_eq!(capture.next_chunk().await, None);
    }

    #[tokio::test]
    async fn recorder_failing_mid_stream_is_reported() {
        let mut capture = shell_recorder("printf abcd; exit 3")
            .open(&AudioConfig::default())
            .await
            .expect("spawn");
        assert_eq!(capture.next_chunk().await, Some(Ok(b"abcd".to_vec())));
        assert!(matches!(
            capture.next_chunk().await,
            Some(Err(CaptureError::Failed(_)))
        ));
    }

    #[tokio::test]
    async fn recorder_clean_exit_ends_stream() {
        let mut capture = shell_recorder("printf abcd")
            .open(&AudioConfig::default())
            .await
            .expect("spawn");
        assert_eq!(capture.next_chunk().await, Some(Ok(b"abcd".to_vec())));
        assert_eq!(capture.next_chunk().await, None);
        capture.stop().await;
    }
}
