#![allow(dead_code)]

use anyhow::{Result, anyhow, bail};
use docsmith::{
    config::Config,
    engine::{Backend, TextMode},
    job::Format,
    resources::ResourceManager,
    Pipeline,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the fake renderer does when asked to render.
#[derive(Debug, Clone)]
pub enum Render {
    Fail(String),
    /// Exit cleanly without writing anything.
    Nothing,
    Write(Vec<u8>),
    Panic,
}

/// Scripted backend: the text layer, the OCR result per page and the
/// renderer's behavior are all fixed up front.
pub struct FakeBackend {
    pub text_pages: Option<Vec<String>>,
    pub ocr_pages: Vec<String>,
    pub render: Render,
    pub extract_calls: AtomicUsize,
    pub recognize_calls: AtomicUsize,
    pub render_calls: AtomicUsize,
    pub languages: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            text_pages: None,
            ocr_pages: Vec::new(),
            render: Render::Fail("renderer not scripted".into()),
            extract_calls: AtomicUsize::new(0),
            recognize_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            languages: Mutex::new(Vec::new()),
        }
    }

    pub fn with_text(mut self, pages: &[&str]) -> Self {
        self.text_pages = Some(pages.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn with_ocr(mut self, pages: &[&str]) -> Self {
        self.ocr_pages = pages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_render(mut self, render: Render) -> Self {
        self.render = render;
        self
    }

    pub fn recognize_count(&self) -> usize {
        self.recognize_calls.load(Ordering::SeqCst)
    }

    pub fn render_count(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }
}

impl Backend for FakeBackend {
    fn extract_pages(&self, _doc: &Path, _mode: TextMode) -> Result<Vec<String>> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.text_pages
            .clone()
            .ok_or_else(|| anyhow!("pdftotext: no text layer"))
    }

    fn render(&self, input: &Path, target: Format, out_dir: &Path, _t: Duration) -> Result<()> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        match &self.render {
            Render::Fail(msg) => bail!("{msg}"),
            Render::Nothing => Ok(()),
            Render::Panic => panic!("renderer crashed"),
            Render::Write(bytes) => {
                let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
                std::fs::write(out_dir.join(format!("{stem}.{}", target.extension())), bytes)?;
                Ok(())
            }
        }
    }

    /// Each "image" holds the text OCR should return for that page.
    fn rasterize(&self, _doc: &Path, _dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut images = Vec::new();
        for (i, text) in self.ocr_pages.iter().enumerate() {
            let p = out_dir.join(format!("page-{:02}.png", i + 1));
            std::fs::write(&p, text)?;
            images.push(p);
        }
        Ok(images)
    }

    fn recognize(&self, page_image: &Path, language: &str) -> Result<String> {
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        self.languages.lock().unwrap().push(language.to_string());
        Ok(std::fs::read_to_string(page_image)?)
    }
}

/// Config rooted in `dir`, with a PDF floor low enough for lopdf fixtures.
pub fn test_config(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.paths.work_dir = dir.join("work").display().to_string();
    cfg.paths.output_dir = dir.join("out").display().to_string();
    cfg.validation.pdf_min_bytes = 64;
    cfg
}

pub fn pipeline(cfg: &Config, backend: FakeBackend) -> Pipeline<FakeBackend> {
    let resources = ResourceManager::from_config(cfg).expect("resource manager");
    Pipeline::new(cfg, backend, resources)
}

pub fn write_input(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, body).expect("write input");
    p
}

pub fn entries(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Prose long enough to classify as text-based, without column gaps.
pub fn prose(chars: usize) -> String {
    let sentence = "The quick brown fox jumps over the lazy dog. ";
    sentence.chars().cycle().take(chars).collect()
}

/// Minimal PDF with `pages` pages, each carrying one line of text.
pub fn build_pdf(path: &Path, pages: u32) {
    use lopdf::{Document, Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let media_box = vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Integer(612),
        Object::Integer(792),
    ];

    let mut page_ids = Vec::new();
    for n in 1..=pages {
        let content = format!("BT /F1 24 Tf 72 720 Td (Page {n}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page = dictionary! {
            "Type" => "Page",
            "MediaBox" => media_box.clone(),
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
        };
        page_ids.push(doc.add_object(page));
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(pages as i64),
    });
    for &pid in &page_ids {
        let dict = doc
            .get_object_mut(pid)
            .and_then(|o| o.as_dict_mut())
            .expect("page dict");
        dict.set("Parent", Object::Reference(pages_id));
    }

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.save(path).expect("save pdf");
}

pub fn rotation_of(path: &Path, page: u32) -> i64 {
    let doc = lopdf::Document::load(path).expect("load pdf");
    let id = doc.get_pages()[&page];
    doc.get_dictionary(id)
        .ok()
        .and_then(|d| d.get(b"Rotate").ok())
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(0)
}

/// Like [`build_pdf`], but pages sit under an intermediate node and take
/// their media box and fonts from the tree instead of carrying their own.
pub fn build_nested_pdf(path: &Path, pages: u32) {
    use lopdf::{Document, Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let root_id = doc.new_object_id();
    let branch_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for n in 1..=pages {
        let content = format!("BT /F1 24 Tf 72 720 Td (Page {n}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        page_ids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(branch_id),
            "Contents" => Object::Reference(content_id),
        }));
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    doc.objects.insert(
        branch_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Parent" => Object::Reference(root_id),
            "Kids" => kids,
            "Count" => Object::Integer(pages as i64),
        }),
    );
    doc.objects.insert(
        root_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(branch_id)],
            "Count" => Object::Integer(pages as i64),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(root_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.save(path).expect("save pdf");
}

/// The `N` of each page's `(Page N)` text, in document order.
pub fn page_labels(path: &Path) -> Vec<u32> {
    let doc = lopdf::Document::load(path).expect("load pdf");
    doc.get_pages()
        .values()
        .map(|id| {
            let content = doc.get_page_content(*id).expect("page content");
            let text = String::from_utf8_lossy(&content).into_owned();
            text.split("(Page ")
                .nth(1)
                .and_then(|rest| rest.split(')').next())
                .and_then(|n| n.parse().ok())
                .expect("page label")
        })
        .collect()
}

/// Page dictionary entry, resolved on the page itself only.
pub fn page_has(path: &Path, page: u32, key: &[u8]) -> bool {
    let doc = lopdf::Document::load(path).expect("load pdf");
    let id = doc.get_pages()[&page];
    doc.get_dictionary(id).is_ok_and(|d| d.has(key))
}
