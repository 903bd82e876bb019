use crate::job::Format;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub tables: Tables,
    #[serde(default)]
    pub validation: Validation,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub postprocess: Postprocess,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub print_summary: bool,
    /// Run the periodic sweep in the background while a command executes.
    pub background_sweep: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
            background_sweep: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub work_dir: String,
    pub output_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            work_dir: ".docsmith-work".into(),
            output_dir: ".docsmith-out".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    /// Trimmed text-layer length must exceed this to count as text-based.
    pub min_text_chars: usize,
    /// AUTO, TEXT or IMAGE.
    pub forced_kind: String,
}
impl Default for Classification {
    fn default() -> Self {
        Self {
            min_text_chars: 30,
            forced_kind: "AUTO".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub allow_placeholder: bool,
    /// Fall back to the renderer when structural PDF->docx extraction fails.
    pub word_fallback_to_renderer: bool,
}
impl Default for Policy {
    fn default() -> Self {
        Self {
            allow_placeholder: true,
            word_fallback_to_renderer: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    pub timeout_seconds: u64,
    pub ocr_dpi: u32,
    pub ocr_language: String,
    pub page_break_marker: String,
}
impl Default for Engine {
    fn default() -> Self {
        Self {
            timeout_seconds: 180,
            ocr_dpi: 300,
            ocr_language: "eng".into(),
            page_break_marker: "--- PAGE BREAK ---".into(),
        }
    }
}

impl Engine {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub pdftotext: String,
    pub soffice: String,
    pub pdftoppm: String,
    pub tesseract: String,
}
impl Default for Tools {
    fn default() -> Self {
        Self {
            pdftotext: "auto".into(),
            soffice: "auto".into(),
            pdftoppm: "auto".into(),
            tesseract: "auto".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub min_columns: usize,
    pub min_rows: usize,
}
impl Default for Tables {
    fn default() -> Self {
        Self {
            min_columns: 2,
            min_rows: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Validation {
    pub pdf_min_bytes: u64,
    pub docx_min_bytes: u64,
    pub csv_min_bytes: u64,
    pub text_min_bytes: u64,
    pub check_signature: bool,
}
impl Default for Validation {
    fn default() -> Self {
        Self {
            pdf_min_bytes: 512,
            docx_min_bytes: 1024,
            csv_min_bytes: 8,
            text_min_bytes: 1,
            check_signature: true,
        }
    }
}

impl Validation {
    pub fn min_bytes(&self, format: Format) -> u64 {
        match format {
            Format::Pdf => self.pdf_min_bytes,
            Format::Docx => self.docx_min_bytes,
            Format::Csv => self.csv_min_bytes,
            Format::Text => self.text_min_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Lifecycle {
    pub deferred_delete_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub retention_seconds: u64,
}
impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            deferred_delete_seconds: 30,
            sweep_interval_seconds: 3600,
            retention_seconds: 7200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Postprocess {
    pub normalize_unicode: bool,
    pub normalize_newlines: bool,
    pub trim_trailing_whitespace: bool,
}
impl Default for Postprocess {
    fn default() -> Self {
        Self {
            normalize_unicode: true,
            normalize_newlines: true,
            trim_trailing_whitespace: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
