pub mod child;

use anyhow::{Context, anyhow};
use std::{borrow::Cow, ffi::OsStr, fmt, io, process::ExitStatus};

/// Max retained child output, older output is dropped.
const MAX_CHUNKS_LEN: usize = 32 * 1024;

/// Convert exit code result into simple result, including the command & stderr on failure.
pub fn exit_ok_stderr(
    name: &'static str,
    done: io::Result<ExitStatus>,
    cmd_str: &str,
    chunks: &Chunks,
) -> anyhow::Result<()> {
    let code = done.with_context(|| format!("{name}: {cmd_str}"))?;
    match code.success() {
        true => Ok(()),
        false => Err(cmd_err(
            format!("{name} exit code {:?}", code.code()),
            cmd_str,
            chunks,
        )),
    }
}

/// Error with the command string & tail of the process output.
pub fn cmd_err(err: impl fmt::Display, cmd_str: &str, chunks: &Chunks) -> anyhow::Error {
    anyhow!(
        "{err}\n----cmd-----\n{cmd_str}\n---stderr---\n{}\n------------",
        chunks.out.trim()
    )
}

/// Accumulated child process output.
#[derive(Debug, Default)]
pub struct Chunks {
    out: String,
}

impl Chunks {
    pub fn push(&mut self, chunk: &[u8]) {
        self.out.push_str(&String::from_utf8_lossy(chunk));
        if self.out.len() > MAX_CHUNKS_LEN {
            let mut cut = self.out.len() - MAX_CHUNKS_LEN;
            while !self.out.is_char_boundary(cut) {
                cut += 1;
            }
            self.out.drain(..cut);
        }
    }

    /// Last non-empty `\r` or `\n` delimited line.
    pub fn last_line(&self) -> &str {
        self.lines().next().unwrap_or("")
    }

    /// Lines in reverse order.
    fn lines(&self) -> impl Iterator<Item = &str> {
        self.out
            .rsplit(['\r', '\n'])
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

/// Progress line written by the engine to stderr,
/// e.g. `48 frames ⠋ 123.45 FPS`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineProgress {
    pub frame: u64,
    pub fps: f32,
}

impl EngineProgress {
    pub fn try_parse(line: &str) -> Option<Self> {
        // strip ansi erase-line suffix
        let line = line.split('\u{1b}').next()?.trim();
        let mut words = line.split_whitespace();
        let frame = words.next()?.parse().ok()?;
        if !words.next()?.starts_with("frame") {
            return None;
        }
        let words: Vec<_> = words.collect();
        let fps = match words.as_slice() {
            [.., fps, "FPS"] => fps.parse().ok()?,
            _ => 0.0,
        };
        Some(Self { frame, fps })
    }
}

pub trait CommandExt {
    /// Adds two arguments.
    fn arg2(&mut self, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self;

    /// Adds two arguments, the 2nd an option. `None` mean noop.
    fn arg2_opt(&mut self, a: impl AsRef<OsStr>, b: Option<impl AsRef<OsStr>>) -> &mut Self;

    /// Adds two arguments if `condition` otherwise noop.
    fn arg2_if(&mut self, condition: bool, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>)
    -> &mut Self;

    /// Convert to a shell-like command string for logging & errors.
    fn to_cmd_str(&self) -> String;
}

impl CommandExt for tokio::process::Command {
    fn arg2(&mut self, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self {
        self.arg(a).arg(b)
    }

    fn arg2_opt(&mut self, a: impl AsRef<OsStr>, b: Option<impl AsRef<OsStr>>) -> &mut Self {
        match b {
            Some(b) => self.arg2(a, b),
            None => self,
        }
    }

    fn arg2_if(&mut self, c: bool, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self {
        match c {
            true => self.arg2(a, b),
            false => self,
        }
    }

    fn to_cmd_str(&self) -> String {
        let cmd = self.as_std();
        std::iter::once(cmd.get_program())
            .chain(cmd.get_args())
            .map(|a| shell_escape::escape(Cow::Owned(a.to_string_lossy().into_owned())))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_engine_progress() {
        assert_eq!(
            EngineProgress::try_parse("48 frames ⠋ 123.45 FPS\u{1b}[K"),
            Some(EngineProgress {
                frame: 48,
                fps: 123.45
            })
        );
        assert_eq!(
            EngineProgress::try_parse("1 frame  0.00 FPS"),
            Some(EngineProgress { frame: 1, fps: 0.0 })
        );
        assert_eq!(EngineProgress::try_parse("VMAF version 1.5.2"), None);
        assert_eq!(EngineProgress::try_parse("vmaf_v0.6.1: 76.699269"), None);
    }

    #[test]
    fn chunks_last_line() {
        let mut chunks = Chunks::default();
        chunks.push(b"VMAF version rc\n\r1 frame ");
        chunks.push(b" 1.00 FPS\r2 frames");
        assert_eq!(chunks.last_line(), "2 frames");
        chunks.push(b"\n\n");
        assert_eq!(chunks.last_line(), "2 frames");
    }

    #[test]
    fn chunks_bounded() {
        let mut chunks = Chunks::default();
        for _ in 0..MAX_CHUNKS_LEN {
            chunks.push("é\n".as_bytes());
        }
        assert!(chunks.out.len() <= MAX_CHUNKS_LEN);
        assert_eq!(chunks.last_line(), "é");
    }

    #[test]
    fn cmd_str() {
        let mut cmd = tokio::process::Command::new("vmafrc");
        cmd.arg2("--reference", "a b.yuv")
            .arg2_if(false, "--subsample", "5")
            .arg2_opt("--threads", Some("4"))
            .arg2_opt("--model", None::<&str>);
        assert_eq!(cmd.to_cmd_str(), "vmafrc --reference 'a b.yuv' --threads 4");
    }
}
