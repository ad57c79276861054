//! Export through an external converter.
//!
//! The dataset only holds `.mscz` archives. Every other format is produced
//! by running MuseScore on a temporary copy of the archive:
//! `<exe> <input.mscz> -o <output.ext>`.

use crate::error::ScoreError;
use crate::format::ScoreFormat;
use crate::mscz::MsczScore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Executable names tried in order.
pub const MUSESCORE_EXECUTABLES: [&str; 5] = [
    "musescore4",
    "mscore4portable",
    "musescore3",
    "musescore",
    "mscore",
];

/// Converts a score archive on disk into another format.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert `input` into `format`, writing `output`. Returns `output`.
    async fn convert(
        &self,
        input: &Path,
        format: ScoreFormat,
        output: &Path,
    ) -> Result<PathBuf, ScoreError>;
}

/// Runs a MuseScore executable.
#[derive(Debug, Clone)]
pub struct MuseScoreConverter {
    binary_path: PathBuf,
}

impl MuseScoreConverter {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Find MuseScore on `PATH`.
    pub fn from_path() -> Result<Self, ScoreError> {
        MUSESCORE_EXECUTABLES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
            .ok_or_else(|| ScoreError::ToolUnavailable {
                tool: "musescore".to_string(),
            })
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

#[async_trait]
impl Converter for MuseScoreConverter {
    async fn convert(
        &self,
        input: &Path,
        format: ScoreFormat,
        output: &Path,
    ) -> Result<PathBuf, ScoreError> {
        info!(
            "Converting to {} with {}",
            format,
            self.binary_path.display()
        );
        let result = Command::new(&self.binary_path)
            .arg(input)
            .arg("-o")
            .arg(output)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ScoreError::ToolUnavailable {
                    tool: self.binary_path.display().to_string(),
                },
                _ => ScoreError::ConversionFailed {
                    format: format.to_string(),
                    detail: format!("failed to execute {}: {}", self.binary_path.display(), e),
                },
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ScoreError::ConversionFailed {
                format: format.to_string(),
                detail: format!("{} ({})", result.status, stderr.trim()),
            });
        }
        if !output.exists() {
            return Err(ScoreError::ConversionFailed {
                format: format.to_string(),
                detail: "converter exited successfully but wrote no output".into(),
            });
        }
        Ok(output.to_path_buf())
    }
}

/// Produce `format` bytes from `score`.
///
/// `mscz` is returned as-is. Other formats go through `converter`, or the
/// MuseScore found on `PATH` when none is given. Temporary files live in a
/// scratch directory removed on every path.
pub async fn export_bytes(
    score: &MsczScore,
    format: ScoreFormat,
    converter: Option<&dyn Converter>,
) -> Result<Vec<u8>, ScoreError> {
    if format == ScoreFormat::Mscz {
        return Ok(score.as_bytes().to_vec());
    }

    let fallback;
    let converter: &dyn Converter = match converter {
        Some(c) => c,
        None => {
            fallback = MuseScoreConverter::from_path()?;
            &fallback
        }
    };

    let scratch = tempfile::Builder::new()
        .prefix("scoredl-export-")
        .tempdir()
        .map_err(|e| ScoreError::Io {
            path: std::env::temp_dir(),
            source: e,
        })?;
    let input = scratch.path().join("score.mscz");
    let output = scratch.path().join(format!("score.{}", format.extension()));

    tokio::fs::write(&input, score.as_bytes())
        .await
        .map_err(|e| ScoreError::Io {
            path: input.clone(),
            source: e,
        })?;

    let written = converter.convert(&input, format, &output).await?;
    let bytes = tokio::fs::read(&written).await.map_err(|e| ScoreError::Io {
        path: written.clone(),
        source: e,
    })?;
    debug!("Converter produced {} bytes", bytes.len());
    Ok(bytes)
}

/// Export `score` as `format` to `path`, atomically.
pub async fn export(
    score: &MsczScore,
    format: ScoreFormat,
    path: &Path,
    converter: Option<&dyn Converter>,
) -> Result<(), ScoreError> {
    let bytes = export_bytes(score, format, converter).await?;
    crate::download::write_atomic(path, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn score() -> MsczScore {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut w = zip::ZipWriter::new(&mut cursor);
            let opts = zip::write::FileOptions::default();
            w.start_file("META-INF/container.xml", opts).unwrap();
            w.write_all(br#"<container><rootfiles><rootfile full-path="s.mscx"/></rootfiles></container>"#)
                .unwrap();
            w.start_file("s.mscx", opts).unwrap();
            w.write_all(b"<museScore/>").unwrap();
            w.finish().unwrap();
        }
        MsczScore::from_bytes(cursor.into_inner()).unwrap()
    }

    /// Writes `converted:<format>` to the output path.
    struct FakeConverter;

    #[async_trait]
    impl Converter for FakeConverter {
        async fn convert(
            &self,
            input: &Path,
            format: ScoreFormat,
            output: &Path,
        ) -> Result<PathBuf, ScoreError> {
            assert!(input.exists());
            std::fs::write(output, format!("converted:{format}")).unwrap();
            Ok(output.to_path_buf())
        }
    }

    #[tokio::test]
    async fn mscz_needs_no_converter() {
        let s = score();
        let bytes = export_bytes(&s, ScoreFormat::Mscz, None).await.unwrap();
        assert_eq!(bytes, s.as_bytes());
    }

    #[tokio::test]
    async fn other_formats_go_through_converter() {
        let bytes = export_bytes(&score(), ScoreFormat::Flac, Some(&FakeConverter))
            .await
            .unwrap();
        assert_eq!(bytes, b"converted:flac");
    }

    #[tokio::test]
    async fn export_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mid");
        export(&score(), ScoreFormat::Mid, &path, Some(&FakeConverter))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"converted:mid");
    }

    // Process-spawning cases share one test so no fork races a script write.
    #[cfg(unix)]
    #[tokio::test]
    async fn runs_external_executable() {
        use std::os::unix::fs::PermissionsExt;

        let missing = MuseScoreConverter::new("/nonexistent/musescore-xyz");
        let err = export_bytes(&score(), ScoreFormat::Mp3, Some(&missing))
            .await
            .unwrap_err();
        match err {
            ScoreError::ToolUnavailable { tool } => assert!(tool.contains("musescore-xyz")),
            other => panic!("unexpected {other:?}"),
        }

        let dir = tempfile::tempdir().unwrap();
        let script = |name: &str, body: &str| {
            let p = dir.path().join(name);
            std::fs::write(&p, body).unwrap();
            std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o755)).unwrap();
            p
        };
        let ok = script("ok.sh", "#!/bin/sh\ncp \"$1\" \"$3\"\n");
        let fail = script("fail.sh", "#!/bin/sh\necho boom >&2\nexit 3\n");

        let bytes = export_bytes(&score(), ScoreFormat::Pdf, Some(&MuseScoreConverter::new(ok)))
            .await
            .unwrap();
        assert_eq!(bytes, score().as_bytes());

        let err = export_bytes(&score(), ScoreFormat::Pdf, Some(&MuseScoreConverter::new(fail)))
            .await
            .unwrap_err();
        match err {
            ScoreError::ConversionFailed { detail, .. } => assert!(detail.contains("boom")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
