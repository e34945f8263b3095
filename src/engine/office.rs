//! Office Module
//!
//! LibreOfficeをヘッドレスで起動し、ワークブックをPDFに変換するモジュール。
//!
//! 実行中は専用のユーザープロファイル（一時ディレクトリ）を1つだけ使い、
//! エンジンの終了時に削除します。

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::error::EngineError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const SOURCE_NAME: &str = "workbook.xlsx";
const OUTPUT_NAME: &str = "workbook.pdf";
const STDERR_NAME: &str = "stderr.log";

/// PDF変換に使用するLibreOfficeの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficeConfig {
    /// 実行ファイル（`soffice`など）
    pub program: PathBuf,
    /// 1シートあたりの変換の制限時間
    pub timeout: Duration,
}

impl Default for OfficeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("soffice"),
            timeout: Duration::from_secs(120),
        }
    }
}

impl OfficeConfig {
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// 起動済みのLibreOffice設定（プロファイルを保持）
#[derive(Debug)]
pub(crate) struct OfficeRunner {
    config: OfficeConfig,
    profile: TempDir,
}

impl OfficeRunner {
    pub fn start(config: OfficeConfig) -> Result<Self, EngineError> {
        let profile = tempfile::Builder::new()
            .prefix("sheetbatch-office-")
            .tempdir()?;
        log::debug!(
            "Using {} with profile {}",
            config.program.display(),
            profile.path().display()
        );
        Ok(Self { config, profile })
    }

    /// ワークブックをPDFに変換し、`target`に書き出す
    ///
    /// ワークブックの表示中のシートだけが出力されます。
    pub fn convert_to_pdf(&self, workbook: &[u8], target: &Path) -> Result<(), EngineError> {
        let work = tempfile::Builder::new()
            .prefix("sheetbatch-pdf-")
            .tempdir()?;
        let source = work.path().join(SOURCE_NAME);
        fs::write(&source, workbook)?;
        // 出力量に関わらず子プロセスが止まらないようファイルで受ける
        let stderr_path = work.path().join(STDERR_NAME);
        let stderr_file = fs::File::create(&stderr_path)?;

        let program = self.config.program.display().to_string();
        let mut child = Command::new(&self.config.program)
            .args(["--headless", "--norestore", "--nologo", "--nodefault"])
            .arg(format!(
                "-env:UserInstallation={}",
                file_url(self.profile.path())
            ))
            .args(["--convert-to", "pdf", "--outdir"])
            .arg(work.path())
            .arg(&source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file))
            .spawn()
            .map_err(|e| EngineError::Process {
                program: program.clone(),
                status: "failed to start".to_string(),
                stderr: e.to_string(),
            })?;

        let status = wait_with_timeout(&mut child, self.config.timeout, &program)?;

        // 読めなくても終了ステータスで判定できる
        let stderr = fs::read(&stderr_path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();

        if !status.success() {
            return Err(EngineError::Process {
                program,
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        // 変換に失敗しても終了コードが0になる場合がある
        let produced = work.path().join(OUTPUT_NAME);
        if !produced.is_file() {
            return Err(EngineError::Process {
                program,
                status: "produced no PDF".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        fs::copy(&produced, target)?;
        Ok(())
    }

    /// プロファイルを削除する
    pub fn shutdown(self) -> Result<(), EngineError> {
        self.profile.close()?;
        Ok(())
    }
}

/// 制限時間まで終了を待つ。時間切れの場合はプロセスを終了させる
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    program: &str,
) -> Result<ExitStatus, EngineError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                log::warn!("Failed to stop '{}': {}", program, e);
            }
            let _ = child.wait();
            return Err(EngineError::Timeout {
                program: program.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// ディレクトリを`file://`URLに変換
fn file_url(path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    format!("file:///{}", path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OfficeConfig::default();
        assert_eq!(config.program, PathBuf::from("soffice"));
        assert_eq!(config.timeout, Duration::from_secs(120));

        let config = config
            .with_program("/opt/libreoffice/program/soffice")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout.as_secs(), 5);
    }

    #[test]
    fn test_file_url() {
        assert_eq!(file_url(Path::new("/tmp/profile")), "file:///tmp/profile");
        assert_eq!(
            file_url(Path::new(r"C:\Temp\profile")),
            "file:///C:/Temp/profile"
        );
    }

    #[test]
    fn test_missing_program_is_reported() {
        let runner = OfficeRunner::start(
            OfficeConfig::default().with_program("sheetbatch-no-such-office-binary"),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();

        let result = runner.convert_to_pdf(b"PK", &dir.path().join("out.pdf"));
        assert!(matches!(result, Err(EngineError::Process { .. })));
        runner.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_removes_profile() {
        let runner = OfficeRunner::start(OfficeConfig::default()).unwrap();
        let profile = runner.profile.path().to_path_buf();
        assert!(profile.is_dir());
        runner.shutdown().unwrap();
        assert!(!profile.exists());
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-office");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_convert_and_timeout_with_scripted_office() {
            let dir = tempfile::tempdir().unwrap();

            // --outdir の次の引数に workbook.pdf を書き出す
            let converter = script(
                dir.path(),
                r#"while [ $# -gt 0 ]; do
  if [ "$1" = "--outdir" ]; then out="$2"; fi
  shift
done
printf '%%PDF-1.4' > "$out/workbook.pdf""#,
            );
            let runner =
                OfficeRunner::start(OfficeConfig::default().with_program(&converter)).unwrap();
            let target = dir.path().join("book_Sheet1.pdf");
            runner.convert_to_pdf(b"PK", &target).unwrap();
            assert_eq!(fs::read(&target).unwrap(), b"%PDF-1.4");
            runner.shutdown().unwrap();

            let silent = dir.path().join("silent-office");
            fs::rename(script(dir.path(), "exit 0"), &silent).unwrap();
            let runner =
                OfficeRunner::start(OfficeConfig::default().with_program(&silent)).unwrap();
            let result = runner.convert_to_pdf(b"PK", &dir.path().join("none.pdf"));
            assert!(matches!(result, Err(EngineError::Process { .. })));
            runner.shutdown().unwrap();

            let slow = dir.path().join("slow-office");
            fs::rename(script(dir.path(), "sleep 5"), &slow).unwrap();
            let runner = OfficeRunner::start(
                OfficeConfig::default()
                    .with_program(&slow)
                    .with_timeout(Duration::from_millis(200)),
            )
            .unwrap();
            let result = runner.convert_to_pdf(b"PK", &dir.path().join("late.pdf"));
            assert!(matches!(result, Err(EngineError::Timeout { .. })));
            runner.shutdown().unwrap();
        }

        #[test]
        fn test_verbose_converter_does_not_stall() {
            let dir = tempfile::tempdir().unwrap();
            // 標準エラーにパイプの容量を超える量を書いてから変換する
            let chatty = script(
                dir.path(),
                r#"i=0
while [ $i -lt 4000 ]; do
  echo "warn: font substitution for glyph run number $i in the current sheet" >&2
  i=$((i + 1))
done
while [ $# -gt 0 ]; do
  if [ "$1" = "--outdir" ]; then out="$2"; fi
  shift
done
printf '%%PDF-1.4' > "$out/workbook.pdf""#,
            );
            let runner = OfficeRunner::start(
                OfficeConfig::default()
                    .with_program(&chatty)
                    .with_timeout(Duration::from_secs(20)),
            )
            .unwrap();
            let target = dir.path().join("chatty.pdf");
            runner.convert_to_pdf(b"PK", &target).unwrap();
            assert_eq!(fs::read(&target).unwrap(), b"%PDF-1.4");
            runner.shutdown().unwrap();
        }
    }
}
