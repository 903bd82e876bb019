use docsmith::{ErrorKind, page_range::resolve, parse_page_spec};

#[test]
fn commas_and_ranges() {
    assert_eq!(parse_page_spec("1,3,5-7", 10).pages(), &[1, 3, 5, 6, 7]);
}

#[test]
fn reversed_range_is_swapped() {
    assert_eq!(parse_page_spec("9-3", 10).pages(), &[3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn out_of_range_pages_are_dropped() {
    assert!(parse_page_spec("99", 5).is_empty());
    assert_eq!(parse_page_spec("4-12", 6).pages(), &[4, 5, 6]);
}

#[test]
fn duplicates_and_order_are_normalized() {
    assert_eq!(parse_page_spec("5,1-3,2,5", 9).pages(), &[1, 2, 3, 5]);
}

#[test]
fn malformed_tokens_are_ignored() {
    assert_eq!(parse_page_spec("1, x, 3-, 4-5, -", 9).pages(), &[1, 4, 5]);
    assert!(parse_page_spec("", 9).is_empty());
}

#[test]
fn bare_number_is_one_page() {
    assert_eq!(parse_page_spec("10", 12).pages(), &[10]);
    assert_eq!(parse_page_spec("2 4", 12).pages(), &[2, 4]);
}

#[test]
fn resolve_defaults_to_every_page() {
    assert_eq!(resolve(None, 3).unwrap().pages(), &[1, 2, 3]);
    assert_eq!(resolve(Some("  "), 3).unwrap().pages(), &[1, 2, 3]);
    assert_eq!(resolve(Some("all"), 3).unwrap().pages(), &[1, 2, 3]);
}

#[test]
fn resolve_rejects_selection_outside_document() {
    let err = resolve(Some("40-50"), 3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PageSpecInvalid);
    assert_eq!(resolve(Some("2-9"), 3).unwrap().pages(), &[2, 3]);
}
