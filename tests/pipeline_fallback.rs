mod common;

use common::{FakeBackend, Render, entries, pipeline, prose, test_config, write_input};
use docsmith::{
    ConvertError, ErrorKind, Format, JobOptions,
    engine::{EngineKind, placeholder::NOTICE},
    job::{AttemptOutcome, DocKind, JobStatus},
    policy::Strategy,
};
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

fn document_xml(docx: &Path) -> String {
    let file = std::fs::File::open(docx).expect("open docx");
    let mut archive = zip::ZipArchive::new(file).expect("docx is a zip");
    let mut part = archive.by_name("word/document.xml").expect("document part");
    let mut xml = String::new();
    part.read_to_string(&mut xml).expect("read document part");
    xml
}

#[test]
fn text_pdf_to_word_uses_structural_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let text = prose(500);
    let backend = FakeBackend::new().with_text(&[&text[..250], &text[250..]]);
    let p = pipeline(&cfg, backend);
    let input = write_input(dir.path(), "memo.pdf", b"%PDF-1.4 fake");

    let out = p.submit(&input, Format::Docx, &JobOptions::default()).unwrap();

    assert_eq!(out.job.detected_kind, DocKind::TextBased);
    assert_eq!(out.engine, Some(EngineKind::StructuralExtractor));
    assert_eq!(out.job.status, JobStatus::Succeeded { soft: false });
    assert_eq!(out.report.attempts.len(), 1);
    assert!(out.report.attempts[0].succeeded());
    let size = std::fs::metadata(&out.output_path).unwrap().len();
    assert!(size >= cfg.validation.docx_min_bytes, "docx only {size} bytes");
    assert!(document_xml(&out.output_path).contains("quick brown fox"));
    assert_eq!(p.backend().recognize_count(), 0);
}

#[test]
fn image_pdf_to_word_runs_ocr_once_per_page() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let backend = FakeBackend::new()
        .with_text(&["scan 0001\n"])
        .with_ocr(&["first page", "second page", "third page"]);
    let p = pipeline(&cfg, backend);
    let input = write_input(dir.path(), "scan.pdf", b"%PDF-1.4 fake");

    let out = p.submit(&input, Format::Docx, &JobOptions::default()).unwrap();

    assert_eq!(out.job.detected_kind, DocKind::ImageBased);
    assert_eq!(out.engine, Some(EngineKind::OcrReconstructor));
    assert_eq!(out.report.strategies, vec![Strategy::Ocr]);
    assert_eq!(p.backend().recognize_count(), 3);

    let xml = document_xml(&out.output_path);
    assert_eq!(xml.matches(&cfg.engine.page_break_marker).count(), 2);
    assert!(xml.contains("third page"));
}

#[test]
fn table_free_pdf_falls_through_to_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let text = prose(400);
    let backend = FakeBackend::new()
        .with_text(&[&text])
        .with_ocr(&["", "   "]);
    let p = pipeline(&cfg, backend);
    let input = write_input(dir.path(), "letter.pdf", b"%PDF-1.4 fake");

    let out = p.submit(&input, Format::Csv, &JobOptions::default()).unwrap();

    assert!(out.soft_failure);
    assert_eq!(out.job.status, JobStatus::Succeeded { soft: true });
    assert_eq!(out.engine, Some(EngineKind::PlaceholderNotice));
    assert_eq!(
        out.report.strategies,
        vec![Strategy::StructuralTables, Strategy::OcrLines, Strategy::Placeholder]
    );
    assert!(!out.report.attempts[0].succeeded());
    assert!(!out.report.attempts[1].succeeded());

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(&out.output_path)
        .unwrap();
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][0], NOTICE);
}

#[test]
fn layout_tables_become_csv_rows() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let page = "Quarterly results\n\nRegion    Q1     Q2\nNorth     10     12\nSouth     7      9\n";
    let backend = FakeBackend::new().with_text(&[page]);
    let p = pipeline(&cfg, backend);
    let input = write_input(dir.path(), "results.pdf", b"%PDF-1.4 fake");

    let out = p.submit(&input, Format::Csv, &JobOptions::default()).unwrap();

    assert_eq!(out.engine, Some(EngineKind::StructuralExtractor));
    let body = std::fs::read_to_string(&out.output_path).unwrap();
    assert!(body.contains("1,North,10,12"), "got: {body}");
}

#[test]
fn validation_failure_moves_to_the_next_variant() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.validation.docx_min_bytes = 200_000;
    let mut rendered = b"PK\x03\x04".to_vec();
    rendered.resize(250_000, 0);
    let text = prose(300);
    let backend = FakeBackend::new()
        .with_text(&[&text])
        .with_render(Render::Write(rendered));
    let p = pipeline(&cfg, backend);
    let input = write_input(dir.path(), "memo.pdf", b"%PDF-1.4 fake");

    let out = p.submit(&input, Format::Docx, &JobOptions::default()).unwrap();

    let attempts = &out.report.attempts;
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].strategy, Strategy::Structural);
    assert!(matches!(
        attempts[0].outcome,
        AttemptOutcome::Failed {
            kind: ErrorKind::ValidationFailure,
            ..
        }
    ));
    assert_eq!(attempts[1].strategy, Strategy::Renderer);
    assert_eq!(out.engine, Some(EngineKind::ExternalRenderer));
    assert_eq!(p.backend().render_count(), 1);
    // classification plus the single structural attempt
    assert_eq!(
        p.backend()
            .extract_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}

#[test]
fn renderer_failure_exhausts_word_to_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let backend = FakeBackend::new().with_render(Render::Fail("soffice exited with 1".into()));
    let p = pipeline(&cfg, backend);
    let input = write_input(dir.path(), "report.docx", b"PK\x03\x04 fake docx");

    let err = p
        .submit(&input, Format::Pdf, &JobOptions::default())
        .unwrap_err();

    match &err {
        ConvertError::ExhaustedFailed {
            attempts,
            kind,
            detail,
        } => {
            assert_eq!(*attempts, 1);
            assert_eq!(*kind, ErrorKind::EngineFailure);
            assert!(detail.contains("soffice exited with 1"), "got: {detail}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::ExhaustedFailed);
    // word-like inputs are never classified
    assert_eq!(
        p.backend()
            .extract_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[test]
fn renderer_that_writes_nothing_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let p = pipeline(&cfg, FakeBackend::new().with_render(Render::Nothing));
    let input = write_input(dir.path(), "sheet.xlsx", b"PK\x03\x04 fake");

    let err = p
        .submit(&input, Format::Pdf, &JobOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("produced no .pdf"), "got: {err}");
}

#[test]
fn engine_panic_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let p = pipeline(&cfg, FakeBackend::new().with_render(Render::Panic));
    let input = write_input(dir.path(), "page.html", b"<html>hi</html>");

    let err = p
        .submit(&input, Format::Pdf, &JobOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("panicked"), "got: {err}");
    assert!(entries(&dir.path().join("work")).is_empty());
}

#[test]
fn word_to_pdf_delivers_rendered_file() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let mut pdf = b"%PDF-1.4\n".to_vec();
    pdf.resize(128, b' ');
    let p = pipeline(&cfg, FakeBackend::new().with_render(Render::Write(pdf)));
    let input = write_input(dir.path(), "report.docx", b"PK\x03\x04 fake docx");

    let out = p.submit(&input, Format::Pdf, &JobOptions::default()).unwrap();

    assert!(out.report.classification.is_none());
    assert_eq!(out.engine, Some(EngineKind::ExternalRenderer));
    let name = out.output_path.file_name().unwrap().to_str().unwrap();
    assert_eq!(name, format!("{}-report.pdf", out.job.job_id));
    assert!(out.output_path.starts_with(dir.path().join("out")));
}

#[test]
fn pdf_to_text_joins_pages_with_marker() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let a = prose(120);
    let b = prose(80);
    let p = pipeline(&cfg, FakeBackend::new().with_text(&[&a, &b]));
    let input = write_input(dir.path(), "notes.pdf", b"%PDF-1.4 fake");

    let out = p.submit(&input, Format::Text, &JobOptions::default()).unwrap();

    let body = std::fs::read_to_string(&out.output_path).unwrap();
    assert_eq!(body.matches(&cfg.engine.page_break_marker).count(), 1);
    assert_eq!(out.report.strategies, vec![Strategy::Structural, Strategy::Ocr]);
}

#[test]
fn unreadable_text_layer_is_treated_as_image_based() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let p = pipeline(&cfg, FakeBackend::new().with_ocr(&["recovered by ocr"]));
    let input = write_input(dir.path(), "broken.pdf", b"%PDF-1.4 fake");

    let out = p.submit(&input, Format::Text, &JobOptions::default()).unwrap();

    let classification = out.report.classification.as_ref().unwrap();
    assert_eq!(classification.kind, DocKind::ImageBased);
    assert!(classification.error.is_some());
    assert_eq!(out.engine, Some(EngineKind::OcrReconstructor));
}

#[test]
fn ocr_language_can_be_overridden_per_job() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let p = pipeline(&cfg, FakeBackend::new().with_ocr(&["eins", "zwei"]));
    let input = write_input(dir.path(), "brief.pdf", b"%PDF-1.4 fake");
    let options = JobOptions {
        ocr_language: Some("deu".into()),
        ..JobOptions::default()
    };

    p.submit(&input, Format::Text, &options).unwrap();

    let langs = p.backend().languages.lock().unwrap().clone();
    assert_eq!(langs, vec!["deu".to_string(), "deu".to_string()]);
}

#[test]
fn missing_or_empty_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let p = pipeline(&cfg, FakeBackend::new());

    let err = p
        .submit(&dir.path().join("nope.pdf"), Format::Docx, &JobOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputMissing);

    let empty = write_input(dir.path(), "empty.pdf", b"");
    let err = p
        .submit(&empty, Format::Docx, &JobOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputMissing);
}

#[test]
fn unsupported_pairs_are_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let p = pipeline(&cfg, FakeBackend::new());

    let pdf = write_input(dir.path(), "a.pdf", b"%PDF-1.4 fake");
    let err = p.submit(&pdf, Format::Pdf, &JobOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);

    let png = write_input(dir.path(), "a.png", b"\x89PNG");
    let err = p.submit(&png, Format::Docx, &JobOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);

    assert!(entries(&dir.path().join("work")).is_empty());
}

#[test]
fn cancelled_job_stops_before_the_first_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let p = pipeline(&cfg, FakeBackend::new().with_render(Render::Nothing));
    let input = write_input(dir.path(), "report.docx", b"PK\x03\x04 fake docx");
    let options = JobOptions::default();
    options.cancel.cancel();

    let err = p.submit(&input, Format::Pdf, &options).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(p.backend().render_count(), 0);
    assert!(entries(&dir.path().join("work")).is_empty());
}

#[test]
fn scratch_space_is_gone_after_every_job() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let text = prose(200);
    let p = pipeline(
        &cfg,
        FakeBackend::new()
            .with_text(&[&text])
            .with_ocr(&["", ""]),
    );
    let good = write_input(dir.path(), "good.pdf", b"%PDF-1.4 fake");
    let bad = write_input(dir.path(), "bad.docx", b"PK\x03\x04 fake");

    p.submit(&good, Format::Docx, &JobOptions::default()).unwrap();
    p.submit(&good, Format::Csv, &JobOptions::default()).unwrap();
    p.submit(&bad, Format::Pdf, &JobOptions::default()).unwrap_err();

    assert!(entries(&dir.path().join("work")).is_empty());
}

#[test]
fn delivered_output_is_removed_after_the_delay() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.lifecycle.deferred_delete_seconds = 0;
    let text = prose(200);
    let p = pipeline(&cfg, FakeBackend::new().with_text(&[&text]));
    let input = write_input(dir.path(), "memo.pdf", b"%PDF-1.4 fake");

    let out = p.submit(&input, Format::Text, &JobOptions::default()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while out.output_path.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!out.output_path.exists());
    assert!(input.exists(), "input must never be deleted");
}

#[test]
fn pending_deliveries_are_flushed_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let text = prose(200);
    let p = pipeline(&cfg, FakeBackend::new().with_text(&[&text]));
    let input = write_input(dir.path(), "memo.pdf", b"%PDF-1.4 fake");

    let out = p.submit(&input, Format::Text, &JobOptions::default()).unwrap();
    assert!(out.output_path.exists());

    drop(p);
    assert!(!out.output_path.exists());
}

#[test]
fn plan_reports_chain_without_running_engines() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let p = pipeline(&cfg, FakeBackend::new().with_text(&["tiny"]));
    let input = write_input(dir.path(), "scan.pdf", b"%PDF-1.4 fake");

    let plan = p.plan(&input, Format::Docx).unwrap();

    assert_eq!(plan.kind, DocKind::ImageBased);
    assert_eq!(plan.strategies, vec![Strategy::Ocr]);
    assert_eq!(p.backend().recognize_count(), 0);
}
