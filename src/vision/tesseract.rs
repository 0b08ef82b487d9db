//! Tesseract OCR backend
//!
//! Drives the `tesseract` command line tool. Availability is checked once when
//! the engine is built; every call runs under a deadline and holds one of a
//! bounded number of permits.

use image::{DynamicImage, ImageFormat};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::OcrSettings;
use crate::error::ExtractionError;
use crate::vision::ocr::{InstallationStatus, RecognitionPermits, TextRecognitionEngine};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Characters of stderr kept in error messages
const STDERR_TAIL: usize = 512;
const INSTALL_HINT: &str =
    "Install Tesseract OCR (https://tesseract-ocr.github.io/tessdoc/Installation.html) or set ocr.tesseract_path";

/// What the version check found
#[derive(Debug, Clone)]
enum Capability {
    Ready {
        version: String,
        languages: Vec<String>,
    },
    Missing {
        error: String,
    },
}

/// Tesseract engine wrapper
pub struct TesseractOcr {
    command: PathBuf,
    languages: String,
    line_psm: u32,
    block_psm: u32,
    timeout: Duration,
    permits: RecognitionPermits,
    capability: Capability,
}

impl TesseractOcr {
    /// Create the engine and check the executable
    pub fn new(settings: &OcrSettings) -> Self {
        let command = settings
            .tesseract_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("tesseract"));
        info!(
            "Initializing tesseract OCR ({:?}) with languages: {}",
            command, settings.languages
        );

        let capability = detect_capability(&command);
        match &capability {
            Capability::Ready { version, languages } => {
                info!("Tesseract {} available", version);
                for lang in settings.languages.split('+').filter(|l| !l.is_empty()) {
                    if !languages.is_empty() && !languages.iter().any(|l| l == lang) {
                        warn!("Tesseract language '{}' is not installed", lang);
                    }
                }
            }
            Capability::Missing { error } => {
                warn!("Tesseract unavailable, zones will come back empty: {}", error);
            }
        }

        Self {
            command,
            languages: settings.languages.clone(),
            line_psm: settings.line_psm,
            block_psm: settings.block_psm,
            timeout: Duration::from_millis(settings.timeout_ms.max(1)),
            permits: RecognitionPermits::new(settings.max_concurrent),
            capability,
        }
    }

    fn run(&self, image: &DynamicImage, psm: u32) -> Result<String, ExtractionError> {
        if let Capability::Missing { error } = &self.capability {
            return Err(ExtractionError::EngineUnavailable(error.clone()));
        }
        if image.width() == 0 || image.height() == 0 {
            return Ok(String::new());
        }

        let deadline = Instant::now() + self.timeout;
        let _permit = self
            .permits
            .acquire(self.timeout)
            .ok_or(ExtractionError::Timeout(self.timeout))?;

        let workdir = tempfile::tempdir()
            .map_err(|e| ExtractionError::Recognition(format!("failed to create scratch dir: {}", e)))?;
        let input = workdir.path().join("roi.png");
        image
            .save_with_format(&input, ImageFormat::Png)
            .map_err(|e| ExtractionError::Recognition(format!("failed to write crop: {}", e)))?;
        let output_base = workdir.path().join("out");

        debug!(
            "Tesseract: {}x{} crop, psm {}, {} permits free",
            image.width(),
            image.height(),
            psm,
            self.permits.available()
        );

        let mut child = Command::new(&self.command)
            .arg(&input)
            .arg(&output_base)
            .arg("-l")
            .arg(&self.languages)
            .arg("--psm")
            .arg(psm.to_string())
            .arg("--dpi")
            .arg("300")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExtractionError::EngineUnavailable(format!("failed to run tesseract: {}", e)))?;

        // Drained concurrently so a full pipe cannot stall the child
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut stderr = String::new();
                let _ = pipe.read_to_string(&mut stderr);
                stderr
            })
        });

        let status = wait_with_deadline(&mut child, deadline, self.timeout)?;
        if !status.success() {
            let stderr = stderr_reader
                .and_then(|reader| reader.join().ok())
                .unwrap_or_default();
            return Err(ExtractionError::Recognition(format!(
                "tesseract exited with {}: {}",
                status,
                tail(stderr.trim(), STDERR_TAIL)
            )));
        }

        let text = std::fs::read_to_string(output_base.with_extension("txt"))
            .map_err(|e| ExtractionError::Recognition(format!("failed to read tesseract output: {}", e)))?;
        Ok(text.trim().to_string())
    }
}

impl TextRecognitionEngine for TesseractOcr {
    fn recognize_line(&self, image: &DynamicImage) -> Result<String, ExtractionError> {
        self.run(image, self.line_psm)
    }

    fn recognize_block(&self, image: &DynamicImage) -> Result<String, ExtractionError> {
        self.run(image, self.block_psm)
    }

    fn is_available(&self) -> bool {
        matches!(self.capability, Capability::Ready { .. })
    }

    fn verify_installation(&self) -> InstallationStatus {
        match &self.capability {
            Capability::Ready { version, languages } => {
                InstallationStatus::ready(version.clone(), languages.clone())
            }
            Capability::Missing { error } => InstallationStatus::missing(error.clone(), INSTALL_HINT),
        }
    }
}

/// Last `max` characters of `text`
fn tail(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    match text.char_indices().nth(count - max) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Poll the child until it exits; kill it once the deadline passes
fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
    timeout: Duration,
) -> Result<ExitStatus, ExtractionError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => return Err(ExtractionError::Recognition(e.to_string())),
        }
        if Instant::now() >= deadline {
            warn!("Tesseract exceeded {:?}, killing it", timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExtractionError::Timeout(timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn detect_capability(command: &Path) -> Capability {
    let output = match Command::new(command).arg("--version").stdin(Stdio::null()).output() {
        Ok(output) => output,
        Err(e) => {
            return Capability::Missing {
                error: format!("failed to run {:?}: {}", command, e),
            }
        }
    };
    if !output.status.success() {
        return Capability::Missing {
            error: format!(
                "{:?} --version failed: {}",
                command,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        };
    }

    // Older releases print the banner on stderr
    let banner = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };
    let version = parse_version(&banner).unwrap_or_else(|| "unknown".to_string());
    let languages = list_languages(command).unwrap_or_default();

    Capability::Ready { version, languages }
}

/// Version from a banner such as "tesseract 5.3.0\n leptonica-1.82.0"
fn parse_version(banner: &str) -> Option<String> {
    let first = banner.lines().next()?.trim();
    let version = first.strip_prefix("tesseract")?.trim().trim_start_matches('v');
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Installed language packs
pub fn list_languages(command: &Path) -> Option<Vec<String>> {
    let output = Command::new(command)
        .arg("--list-langs")
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(parse_language_list(&stdout))
}

fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip_while(|line| !line.starts_with("List of available languages"))
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn settings_for(path: PathBuf) -> OcrSettings {
        OcrSettings {
            tesseract_path: Some(path),
            timeout_ms: 2_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("tesseract 5.3.0\n leptonica-1.82.0\n"),
            Some("5.3.0".to_string())
        );
        assert_eq!(parse_version("tesseract v4.1.1"), Some("4.1.1".to_string()));
        assert_eq!(parse_version("something else"), None);
    }

    #[test]
    fn test_parse_language_list() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nosd\npol\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "osd", "pol"]);
    }

    #[test]
    fn test_missing_executable() {
        let engine = TesseractOcr::new(&settings_for(PathBuf::from("/nonexistent/tesseract")));
        assert!(!engine.is_available());

        let status = engine.verify_installation();
        assert!(!status.installed);
        assert!(status.error.is_some());
        assert!(status.solution.is_some());

        let crop = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        assert!(matches!(
            engine.recognize_line(&crop),
            Err(ExtractionError::EngineUnavailable(_))
        ));
    }

    #[cfg(unix)]
    fn fake_tesseract(dir: &Path, recognize: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("tesseract");
        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"--version\" ]; then echo 'tesseract 5.3.0'; exit 0; fi\n\
             if [ \"$1\" = \"--list-langs\" ]; then echo 'List of available languages (2):'; echo eng; echo pol; exit 0; fi\n\
             {}\n",
            recognize
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_tesseract_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_tesseract(dir.path(), "echo '  JAN   KOWALSKI ' > \"$2.txt\"");
        let engine = TesseractOcr::new(&settings_for(path));

        assert!(engine.is_available());
        let status = engine.verify_installation();
        assert_eq!(status.version.as_deref(), Some("5.3.0"));
        assert_eq!(status.languages, vec!["eng", "pol"]);

        let crop = DynamicImage::ImageRgb8(RgbImage::new(40, 12));
        assert_eq!(engine.recognize_line(&crop).unwrap(), "JAN   KOWALSKI");
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_tesseract_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_tesseract(dir.path(), "echo 'bad image' >&2; exit 1");
        let engine = TesseractOcr::new(&settings_for(path));

        let crop = DynamicImage::ImageRgb8(RgbImage::new(40, 12));
        match engine.recognize_block(&crop) {
            Err(ExtractionError::Recognition(message)) => assert!(message.contains("bad image")),
            other => panic!("expected recognition failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_large_stderr_does_not_stall() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_tesseract(
            dir.path(),
            "head -c 200000 /dev/zero | tr '\\0' x >&2; exit 1",
        );
        let mut settings = settings_for(path);
        settings.timeout_ms = 5_000;
        let engine = TesseractOcr::new(&settings);

        let started = Instant::now();
        let crop = DynamicImage::ImageRgb8(RgbImage::new(40, 12));
        match engine.recognize_line(&crop) {
            Err(ExtractionError::Recognition(message)) => {
                assert!(message.ends_with("xxxx"));
                assert!(message.len() < 1_000);
            }
            other => panic!("expected recognition failure, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("żółw", 2), "łw");
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_tesseract_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_tesseract(dir.path(), "sleep 5");
        let mut settings = settings_for(path);
        settings.timeout_ms = 200;
        let engine = TesseractOcr::new(&settings);

        let started = Instant::now();
        let crop = DynamicImage::ImageRgb8(RgbImage::new(40, 12));
        assert!(matches!(
            engine.recognize_line(&crop),
            Err(ExtractionError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
