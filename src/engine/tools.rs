use super::{Backend, TextMode, ToolDiag};
use crate::{config::Config, job::Format};
use anyhow::{Context, Result, anyhow};
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Backend driving the poppler, LibreOffice and tesseract command-line tools.
pub struct ToolBackend {
    pdftotext: PathBuf,
    soffice: PathBuf,
    pdftoppm: PathBuf,
    tesseract: PathBuf,
    timeout: Duration,
}

impl ToolBackend {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            pdftotext: resolve_exe(&cfg.tools.pdftotext, "DOCSMITH_PDFTOTEXT", "pdftotext"),
            soffice: resolve_exe(&cfg.tools.soffice, "DOCSMITH_SOFFICE", "soffice"),
            pdftoppm: resolve_exe(&cfg.tools.pdftoppm, "DOCSMITH_PDFTOPPM", "pdftoppm"),
            tesseract: resolve_exe(&cfg.tools.tesseract, "DOCSMITH_TESSERACT", "tesseract"),
            timeout: cfg.engine.timeout(),
        })
    }

    fn run<I, S>(&self, exe: &Path, args: I, timeout: Duration) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(exe);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        debug!("run {:?} timeout={:?}", cmd, timeout);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", exe.display()))?;
        let output = wait_with_timeout(&mut child, timeout)
            .with_context(|| format!("waiting for {}", exe.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} failed ({}): {}",
                exe.display(),
                output.status,
                stderr.trim()
            ));
        }
        Ok(output)
    }

    fn version(&self, tool: &str, exe: &Path, flag: &str) -> ToolDiag {
        match self.run(exe, [flag], Duration::from_secs(30)) {
            Ok(out) => {
                // poppler prints its banner on stderr
                let text = if out.stdout.is_empty() {
                    String::from_utf8_lossy(&out.stderr).into_owned()
                } else {
                    String::from_utf8_lossy(&out.stdout).into_owned()
                };
                ToolDiag {
                    tool: tool.into(),
                    exe: exe.display().to_string(),
                    ok: true,
                    version: text.lines().next().map(|l| l.trim().to_string()),
                    error: None,
                }
            }
            Err(err) => ToolDiag {
                tool: tool.into(),
                exe: exe.display().to_string(),
                ok: false,
                version: None,
                error: Some(format!("{err:#}")),
            },
        }
    }
}

fn resolve_exe(raw: &str, env_key: &str, default: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var(env_key) {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return p;
            }
        }
        return PathBuf::from(default);
    }
    expand_tilde(raw)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// `file://` URL for an absolute path, percent-encoding anything outside
/// the unreserved set.
fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut url = String::from("file://");
    if !raw.starts_with('/') {
        url.push('/');
    }
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' | b':' => {
                url.push(b as char)
            }
            _ => url.push_str(&format!("%{b:02X}")),
        }
    }
    url
}

/// LibreOffice filter name for each target.
fn soffice_filter(input: &Path, target: Format) -> &'static str {
    let from_pdf = input
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case("pdf"));
    match target {
        Format::Pdf => "pdf",
        Format::Docx if from_pdf => "docx:MS Word 2007 XML",
        Format::Docx => "docx",
        Format::Csv => "csv",
        Format::Text => "txt:Text",
    }
}

impl Backend for ToolBackend {
    fn doctor(&self) -> Result<Vec<ToolDiag>> {
        Ok(vec![
            self.version("pdftotext", &self.pdftotext, "-v"),
            self.version("pdftoppm", &self.pdftoppm, "-v"),
            self.version("soffice", &self.soffice, "--version"),
            self.version("tesseract", &self.tesseract, "--version"),
        ])
    }

    fn extract_pages(&self, doc: &Path, mode: TextMode) -> Result<Vec<String>> {
        let mut args: Vec<&OsStr> = vec![OsStr::new("-enc"), OsStr::new("UTF-8")];
        if mode == TextMode::Layout {
            args.push(OsStr::new("-layout"));
        }
        args.push(doc.as_os_str());
        args.push(OsStr::new("-"));

        let out = self.run(&self.pdftotext, args, self.timeout)?;
        let text = String::from_utf8_lossy(&out.stdout);

        // pdftotext ends every page with a form feed
        let mut pages: Vec<String> = text.split('\u{c}').map(str::to_string).collect();
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        Ok(pages)
    }

    fn render(
        &self,
        input: &Path,
        target: Format,
        out_dir: &Path,
        timeout: Duration,
    ) -> Result<()> {
        // A private profile keeps concurrent soffice instances from locking
        // each other out.
        let profile = std::path::absolute(out_dir.join(".profile"))
            .with_context(|| format!("resolving profile dir under {}", out_dir.display()))?;
        let profile_arg = format!("-env:UserInstallation={}", file_url(&profile));

        let mut args: Vec<&OsStr> = vec![
            OsStr::new("--headless"),
            OsStr::new("--norestore"),
            OsStr::new(&profile_arg),
        ];
        let filter = soffice_filter(input, target);
        if target == Format::Docx && filter.contains("Word") {
            args.push(OsStr::new("--infilter=writer_pdf_import"));
        }
        args.extend([
            OsStr::new("--convert-to"),
            OsStr::new(filter),
            OsStr::new("--outdir"),
            out_dir.as_os_str(),
            input.as_os_str(),
        ]);

        self.run(&self.soffice, args, timeout)?;
        let _ = crate::util::remove_path(&profile);
        Ok(())
    }

    fn rasterize(&self, doc: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let prefix = out_dir.join("page");
        let dpi = dpi.to_string();
        let args: Vec<&OsStr> = vec![
            OsStr::new("-r"),
            OsStr::new(&dpi),
            OsStr::new("-png"),
            doc.as_os_str(),
            prefix.as_os_str(),
        ];
        self.run(&self.pdftoppm, args, self.timeout)?;

        // page-01.png, page-02.png, ... zero padded, so lexical order is page order
        let mut images: Vec<PathBuf> = std::fs::read_dir(out_dir)
            .with_context(|| format!("read_dir {}", out_dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|e| e == "png")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("page"))
            })
            .collect();
        images.sort();
        Ok(images)
    }

    fn recognize(&self, page_image: &Path, language: &str) -> Result<String> {
        let args: Vec<&OsStr> = vec![
            page_image.as_os_str(),
            OsStr::new("stdout"),
            OsStr::new("-l"),
            OsStr::new(language),
        ];
        let out = self.run(&self.tesseract, args, self.timeout)?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Output> {
    // Drain pipes while waiting so a chatty tool can't deadlock on a full
    // stdout/stderr buffer.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_reader {
            out.read_to_end(&mut buf).with_context(|| "read stdout")?;
        }
        Ok(buf)
    });

    let stderr_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_reader {
            err.read_to_end(&mut buf).with_context(|| "read stderr")?;
        }
        Ok(buf)
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            let stdout = stdout_thread
                .join()
                .map_err(|_| anyhow!("stdout reader thread panicked"))??;
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if start.elapsed() > timeout {
            warn!("child process timed out after {:?}", timeout);
            let _ = child.kill();
            child.wait().with_context(|| "wait after kill")?;
            // Readers are left detached: a grandchild (soffice.bin) may still
            // hold the pipes open.
            drop(stdout_thread);
            drop(stderr_thread);
            return Err(anyhow!("process exceeded timeout ({:?})", timeout));
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}
