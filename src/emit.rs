//! # Emit — Document Serialization
//!
//! A finished registry becomes three text payloads:
//!
//! - the cell declarations, one checkbox per cell in allocation order
//! - the rule sheet, one line per drive rule in emission order
//! - the debug table, one row per label
//!
//! Payloads are spliced into existing page and stylesheet templates between
//! marker comments. Everything outside the markers is preserved.

use crate::hardware::{CircuitError, Hardware, Rule};
use anyhow::{Context, Result};
use blake3::Hasher;
use rayon::prelude::*;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const HARDWARE_START: &str = "<!--HARDWARE START-->";
pub const HARDWARE_END: &str = "<!--HARDWARE END-->";
pub const DEBUG_START: &str = "<!--DEBUG START-->";
pub const DEBUG_END: &str = "<!--DEBUG END-->";
pub const CSS_START: &str = "/*HARDWARE START*/";
pub const CSS_END: &str = "/*HARDWARE END*/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpliceError {
    #[error("template has no `{0}` marker")]
    MissingMarker(String),
}

pub fn render_cells(hw: &Hardware) -> String {
    let mut buf = String::new();
    for (id, checked) in hw.cells().iter().enumerate() {
        let checked = if *checked { " checked" } else { "" };
        writeln!(&mut buf, "<input type=\"checkbox\" id=\"i{}\"{}>", id, checked).unwrap();
    }
    buf
}

pub fn render_rules(hw: &Hardware) -> String {
    let lines: Vec<String> = hw.rules().par_iter().map(Rule::css).collect();
    let mut buf = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        buf.push_str(&line);
        buf.push('\n');
    }
    buf
}

/// Debug table: one row per label, values filled in by the page script.
pub fn render_debug(hw: &Hardware) -> String {
    let mut buf = String::new();
    buf.push_str("<table id=\"debug\">\n    <thead>\n        <tr>\n");
    for heading in ["Label", "Dec", "Hex", "Bin", "Range"] {
        writeln!(&mut buf, "            <th>{}</th>", heading).unwrap();
    }
    buf.push_str("        </tr>\n    </thead>\n    <tbody>\n");
    for label in hw.labels() {
        writeln!(
            &mut buf,
            "<tr data-start=\"{}\" data-end=\"{}\" class=\"label\">",
            label.start, label.end
        )
        .unwrap();
        writeln!(&mut buf, "<td>{}</td>", label.name).unwrap();
        buf.push_str("<td class=\"dec\"></td>\n");
        buf.push_str("<td class=\"hex\"></td><td class=\"bin\"></td>\n");
        writeln!(&mut buf, "<td>{}-{}</td>", label.start, label.end).unwrap();
        buf.push_str("</tr>\n");
    }
    buf.push_str("</tbody></table>\n");
    buf
}

/// Replace the region between the first `start` marker and the next `end`
/// marker, keeping both markers. The payload follows a newline after `start`.
pub fn splice(template: &str, start: &str, end: &str, payload: &str) -> Result<String, SpliceError> {
    let open = template
        .find(start)
        .ok_or_else(|| SpliceError::MissingMarker(start.to_string()))?;
    let body = open + start.len();
    let close = template[body..]
        .find(end)
        .map(|offset| body + offset)
        .ok_or_else(|| SpliceError::MissingMarker(end.to_string()))?;
    let mut out = String::with_capacity(template.len() + payload.len() + 1);
    out.push_str(&template[..body]);
    out.push('\n');
    out.push_str(payload);
    out.push_str(&template[close..]);
    Ok(out)
}

/// Rewritten page and stylesheet for `hw`.
pub fn render_documents(
    hw: &Hardware,
    html_template: &str,
    css_template: &str,
) -> Result<(String, String)> {
    if !hw.is_finished() {
        return Err(CircuitError::NotFinished.into());
    }
    let html = splice(html_template, HARDWARE_START, HARDWARE_END, &render_cells(hw))?;
    let html = splice(&html, DEBUG_START, DEBUG_END, &render_debug(hw))?;
    let css = splice(css_template, CSS_START, CSS_END, &render_rules(hw))?;
    Ok((html, css))
}

/// Splice `hw` into the templates at `html_path` and `css_path` in place.
/// Neither file is written unless every splice succeeds.
pub fn write_documents(hw: &Hardware, html_path: &Path, css_path: &Path) -> Result<()> {
    let html_template = fs::read_to_string(html_path)
        .with_context(|| format!("reading {}", html_path.display()))?;
    let css_template = fs::read_to_string(css_path)
        .with_context(|| format!("reading {}", css_path.display()))?;
    let (html, css) = render_documents(hw, &html_template, &css_template)?;
    fs::write(html_path, html)?;
    fs::write(css_path, css)?;
    info!(
        cells = hw.cell_count(),
        rules = hw.rules().len(),
        html = %html_path.display(),
        css = %css_path.display(),
        "wrote documents"
    );
    Ok(())
}

pub type CircuitHash = String;

/// BLAKE3 over the cell declarations and rule sheet.
pub fn circuit_hash(hw: &Hardware) -> CircuitHash {
    let mut hasher = Hasher::new();
    hasher.update(render_cells(hw).as_bytes());
    hasher.update(b"\0");
    hasher.update(render_rules(hw).as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

pub fn labels_json(hw: &Hardware) -> Result<String> {
    Ok(serde_json::to_string_pretty(hw.labels())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Label;
    use tempfile::tempdir;

    const PAGE: &str = "<html>\n<!--HARDWARE START-->old cells<!--HARDWARE END-->\n\
                        <!--DEBUG START-->old table<!--DEBUG END-->\n</html>\n";
    const SHEET: &str = "body{}\n/*HARDWARE START*/old rules/*HARDWARE END*/\nfooter{}\n";

    fn small_circuit() -> Hardware {
        let mut hw = Hardware::new();
        let a = hw.bit(false);
        let b = hw.bit(true);
        b.iff(&mut hw, a);
        a.label(&mut hw, "input");
        hw.finish().unwrap();
        hw
    }

    #[test]
    fn cells_render_in_allocation_order() {
        let hw = small_circuit();
        assert_eq!(
            render_cells(&hw),
            "<input type=\"checkbox\" id=\"i0\">\n<input type=\"checkbox\" id=\"i1\" checked>\n"
        );
    }

    #[test]
    fn rules_render_one_per_line() {
        let hw = small_circuit();
        let sheet = render_rules(&hw);
        assert_eq!(sheet.lines().count(), 2);
        assert_eq!(
            sheet.lines().next(),
            Some(":is(#i0:checked~#i1):not(:checked){display:block;}")
        );
    }

    #[test]
    fn debug_table_has_a_row_per_label() {
        let hw = small_circuit();
        let table = render_debug(&hw);
        assert!(table.starts_with("<table id=\"debug\">"));
        assert!(table.contains("<tr data-start=\"0\" data-end=\"0\" class=\"label\">"));
        assert!(table.contains("<td>input</td>"));
        assert!(table.contains("<td>0-0</td>"));
        assert!(table.ends_with("</tbody></table>\n"));
    }

    #[test]
    fn splice_keeps_markers_and_surroundings() {
        let out = splice("a<S>gone<E>b<S>kept<E>", "<S>", "<E>", "new").unwrap();
        assert_eq!(out, "a<S>\nnew<E>b<S>kept<E>");
        assert_eq!(
            splice("a<S>b", "<S>", "<E>", "x"),
            Err(SpliceError::MissingMarker("<E>".into()))
        );
        assert_eq!(
            splice("a<E>b", "<S>", "<E>", "x"),
            Err(SpliceError::MissingMarker("<S>".into()))
        );
    }

    #[test]
    fn write_documents_splices_both_files() {
        let dir = tempdir().unwrap();
        let html = dir.path().join("index.html");
        let css = dir.path().join("puter.css");
        fs::write(&html, PAGE).unwrap();
        fs::write(&css, SHEET).unwrap();
        let hw = small_circuit();
        write_documents(&hw, &html, &css).unwrap();

        let page = fs::read_to_string(&html).unwrap();
        assert!(page.starts_with("<html>\n<!--HARDWARE START-->\n<input"));
        assert!(!page.contains("old cells"));
        assert!(!page.contains("old table"));
        assert!(page.ends_with("<!--DEBUG END-->\n</html>\n"));
        let sheet = fs::read_to_string(&css).unwrap();
        assert!(sheet.starts_with("body{}\n/*HARDWARE START*/\n:is("));
        assert!(sheet.ends_with("{display:block;}\n/*HARDWARE END*/\nfooter{}\n"));
    }

    #[test]
    fn missing_marker_leaves_files_untouched() {
        let dir = tempdir().unwrap();
        let html = dir.path().join("index.html");
        let css = dir.path().join("puter.css");
        let broken_page = "<html><!--HARDWARE START--><!--HARDWARE END--></html>";
        fs::write(&html, broken_page).unwrap();
        fs::write(&css, SHEET).unwrap();
        let hw = small_circuit();
        assert!(write_documents(&hw, &html, &css).is_err());
        assert_eq!(fs::read_to_string(&html).unwrap(), broken_page);
        assert_eq!(fs::read_to_string(&css).unwrap(), SHEET);
    }

    #[test]
    fn unfinished_registry_is_rejected() {
        let mut hw = Hardware::new();
        hw.bit(false);
        let err = render_documents(&hw, PAGE, SHEET).unwrap_err();
        assert_eq!(err.downcast_ref::<CircuitError>(), Some(&CircuitError::NotFinished));
    }

    #[test]
    fn hash_tracks_circuit_content() {
        let first = circuit_hash(&small_circuit());
        assert_eq!(first.len(), 64);
        assert_eq!(first, circuit_hash(&small_circuit()));
        let mut other = Hardware::new();
        other.bit(false);
        other.finish().unwrap();
        assert_ne!(first, circuit_hash(&other));
    }

    #[test]
    fn labels_export_as_json() {
        let hw = small_circuit();
        let json = labels_json(&hw).unwrap();
        let labels: Vec<Label> = serde_json::from_str(&json).unwrap();
        assert_eq!(labels, hw.labels());
    }
}
