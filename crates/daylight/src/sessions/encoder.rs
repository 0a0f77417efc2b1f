//! Encoder process handle and launcher.
//!
//! An [`EncoderHandle`] owns one running encoder: its stdin pipe and its exit
//! status. Nothing else holds the pipe. Handles are only created by an
//! [`EncoderLauncher`], which the session manager calls.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use lapseconf::EncoderConfig;
use lapseproto::CameraId;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::paths::SessionPaths;

/// One live encoder subprocess.
#[async_trait]
pub trait EncoderHandle: Send {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Non-blocking liveness probe.
    fn is_alive(&mut self) -> bool;

    /// Write a frame to the encoder's stdin and flush.
    async fn write(&mut self, frame: &[u8]) -> Result<(), SessionError>;

    /// Flush, close stdin so the encoder can finalize, and wait for exit.
    async fn close_input_and_wait(self: Box<Self>) -> Result<(), SessionError>;
}

/// Starts encoders for sessions.
#[async_trait]
pub trait EncoderLauncher: Send + Sync {
    async fn launch(
        &self,
        camera: &CameraId,
        paths: &SessionPaths,
    ) -> Result<Box<dyn EncoderHandle>, SessionError>;
}

/// A real subprocess fed through its stdin.
///
/// Dropping the handle without closing it kills the process.
#[derive(Debug)]
pub struct EncoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    program: PathBuf,
}

impl EncoderProcess {
    /// Spawn `command` with stdin piped. Stdout/stderr are left as configured.
    pub fn spawn(mut command: Command) -> Result<Self, SessionError> {
        let program = PathBuf::from(command.as_std().get_program());
        command.stdin(Stdio::piped()).kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| SessionError::Spawn {
            program: program.clone(),
            source: e,
        })?;
        let stdin = child.stdin.take().ok_or_else(|| SessionError::Spawn {
            program: program.clone(),
            source: io::Error::other("stdin was not captured"),
        })?;

        debug!(program = %program.display(), pid = ?child.id(), "spawned encoder");
        Ok(Self {
            child,
            stdin: Some(stdin),
            program,
        })
    }
}

#[async_trait]
impl EncoderHandle for EncoderProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(program = %self.program.display(), %status, "encoder has exited");
                false
            }
            Err(e) => {
                warn!(program = %self.program.display(), error = %e, "liveness probe failed");
                false
            }
        }
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), SessionError> {
        if !self.is_alive() {
            return Err(SessionError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "encoder has exited",
            )));
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            SessionError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "encoder input already closed",
            ))
        })?;
        stdin.write_all(frame).await.map_err(SessionError::Write)?;
        stdin.flush().await.map_err(SessionError::Write)?;
        Ok(())
    }

    async fn close_input_and_wait(mut self: Box<Self>) -> Result<(), SessionError> {
        if let Some(mut stdin) = self.stdin.take() {
            // A dead reader makes these fail; the exit status below tells the real story
            if let Err(e) = stdin.flush().await {
                debug!(error = %e, "flush before close failed");
            }
            if let Err(e) = stdin.shutdown().await {
                debug!(error = %e, "closing encoder input failed");
            }
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SessionError::Wait(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(SessionError::Wait(status.to_string()))
        }
    }
}

/// Launches ffmpeg configured from `[encoder]`.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    config: EncoderConfig,
}

impl FfmpegLauncher {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Command line arguments, excluding the program itself.
    ///
    /// JPEG frames arrive on stdin; a silent audio track keeps players happy;
    /// the fragmented MP4 flags keep a partially written file playable.
    pub fn args(&self, video_file: &Path) -> Vec<OsString> {
        let c = &self.config;
        let mut args: Vec<OsString> = [
            "-y",
            "-hide_banner",
            "-report",
            "-nostats",
            "-f",
            "image2pipe",
            "-i",
            "pipe:0",
            "-f",
            "lavfi",
            "-i",
            "anullsrc",
            "-c:a",
            "aac",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        let pairs = [
            ("-filter:v", format!("scale={}:{}", c.width, c.height)),
            ("-b:v", c.video_bitrate.clone()),
            ("-c:v", c.codec.clone()),
            ("-preset", c.preset.clone()),
            ("-crf", c.crf.to_string()),
            ("-vf", format!("format={}", c.pixel_format)),
            (
                "-movflags",
                "+frag_keyframe+separate_moof+omit_tfhd_offset+empty_moov".to_string(),
            ),
        ];
        for (flag, value) in pairs {
            args.push(flag.into());
            args.push(value.into());
        }

        args.push("-shortest".into());
        args.push(video_file.as_os_str().to_owned());
        args
    }

    /// Value for the `FFREPORT` environment variable.
    pub fn report_env(&self, paths: &SessionPaths) -> String {
        format!(
            "file={}:level={}",
            paths.log_template.display(),
            self.config.report_level
        )
    }

    pub fn command(&self, paths: &SessionPaths) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.args(&paths.video_file))
            .env_clear()
            .env("FFREPORT", self.report_env(paths))
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

#[async_trait]
impl EncoderLauncher for FfmpegLauncher {
    async fn launch(
        &self,
        camera: &CameraId,
        paths: &SessionPaths,
    ) -> Result<Box<dyn EncoderHandle>, SessionError> {
        let process = EncoderProcess::spawn(self.command(paths))?;
        info!(
            camera = %camera,
            pid = ?process.id(),
            video = %paths.video_file.display(),
            "encoder started"
        );
        Ok(Box::new(process))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> SessionPaths {
        SessionPaths {
            video_dir: PathBuf::from("/v/2024/20240621"),
            log_dir: PathBuf::from("/l/2024/20240621"),
            video_file: PathBuf::from("/v/2024/20240621/cam-20240621-043005.mp4"),
            log_template: PathBuf::from("/l/2024/20240621/%p-%t.log"),
        }
    }

    fn joined(args: &[OsString]) -> String {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_default_args() {
        let launcher = FfmpegLauncher::new(EncoderConfig::default());
        let line = joined(&launcher.args(&paths().video_file));
        assert_eq!(
            line,
            "-y -hide_banner -report -nostats -f image2pipe -i pipe:0 \
             -f lavfi -i anullsrc -c:a aac -filter:v scale=1280:720 \
             -b:v 2M -c:v h264 -preset slow -crf 25 -vf format=yuv420p \
             -movflags +frag_keyframe+separate_moof+omit_tfhd_offset+empty_moov \
             -shortest /v/2024/20240621/cam-20240621-043005.mp4"
        );
    }

    #[test]
    fn test_args_follow_config() {
        let launcher = FfmpegLauncher::new(EncoderConfig {
            width: 1920,
            height: 1080,
            crf: 20,
            preset: "veryfast".to_string(),
            ..EncoderConfig::default()
        });
        let line = joined(&launcher.args(Path::new("/out.mp4")));
        assert!(line.contains("scale=1920:1080"));
        assert!(line.contains("-crf 20"));
        assert!(line.contains("-preset veryfast"));
        assert!(line.ends_with("-shortest /out.mp4"));
    }

    #[test]
    fn test_report_env() {
        let launcher = FfmpegLauncher::new(EncoderConfig::default());
        assert_eq!(
            launcher.report_env(&paths()),
            "file=/l/2024/20240621/%p-%t.log:level=32"
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let launcher = FfmpegLauncher::new(EncoderConfig {
            program: PathBuf::from("/definitely/not/an/encoder"),
            ..EncoderConfig::default()
        });
        let err = launcher
            .launch(&CameraId::new("cam"), &paths())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_write_and_close() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.bin");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(format!("cat > '{}'", out.display()));

        let mut process = EncoderProcess::spawn(cmd).unwrap();
        assert!(process.is_alive());
        process.write(&[1u8; 1000]).await.unwrap();
        process.write(&[2u8; 1000]).await.unwrap();
        Box::new(process).close_input_and_wait().await.unwrap();

        let written = std::fs::read(&out).unwrap();
        assert_eq!(written.len(), 2000);
        assert_eq!(written[0], 1);
        assert_eq!(written[1999], 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dead_process_is_detected_and_write_fails() {
        let mut process = EncoderProcess::spawn(Command::new("true")).unwrap();

        let mut alive = true;
        for _ in 0..100 {
            if !process.is_alive() {
                alive = false;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!alive);

        let err = process.write(b"frame").await.unwrap_err();
        assert!(matches!(err, SessionError::Write(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abnormal_exit_is_wait_error() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("cat > /dev/null; exit 3");
        let process = EncoderProcess::spawn(cmd).unwrap();
        let err = Box::new(process).close_input_and_wait().await.unwrap_err();
        assert!(matches!(err, SessionError::Wait(_)));
    }
}
