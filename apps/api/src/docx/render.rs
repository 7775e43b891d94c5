//! Best-effort HTML preview of a WordprocessingML document.
//!
//! Covers what a reviewer needs to read a contract: paragraphs, headings,
//! bold/italic/underline runs, tabs, line breaks and tables. Anything else is
//! dropped. Malformed markup ends the walk early; what was rendered is kept.

use bytes::Bytes;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use crate::docx::container::{DocxPackage, PRIMARY_PART};
use crate::placeholders::xml_pattern::escape_xml;

/// Renders the primary part of a `.docx` package. Never fails.
pub fn render_docx_html(bytes: &Bytes) -> String {
    match DocxPackage::unpack(bytes.clone()).and_then(|p| p.read_part(PRIMARY_PART)) {
        Ok(xml) => render_preview_html(&xml),
        Err(e) => {
            warn!("Preview rendering skipped: {e}");
            render_preview_html("")
        }
    }
}

/// Renders WordprocessingML markup as an HTML fragment.
pub fn render_preview_html(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    let mut html = HtmlWriter::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => html.open(&e),
            Ok(Event::Empty(e)) => {
                html.open(&e);
                html.close(e.local_name().as_ref());
            }
            Ok(Event::End(e)) => html.close(e.local_name().as_ref()),
            Ok(Event::Text(t)) if html.in_text => match t.unescape() {
                Ok(text) => html.text(&text),
                Err(e) => warn!("Preview: undecodable text skipped: {e}"),
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(
                    "Preview: malformed markup at byte {}: {e}",
                    reader.buffer_position()
                );
                break;
            }
            Ok(_) => {}
        }
    }

    html.finish()
}

#[derive(Default)]
struct HtmlWriter {
    out: String,
    paragraph: Option<Paragraph>,
    in_paragraph_props: bool,
    in_run_props: bool,
    in_text: bool,
    bold: bool,
    italic: bool,
    underline: bool,
}

struct Paragraph {
    tag: &'static str,
    body: String,
}

impl HtmlWriter {
    fn open(&mut self, e: &BytesStart<'_>) {
        match e.local_name().as_ref() {
            b"p" => {
                self.paragraph = Some(Paragraph {
                    tag: "p",
                    body: String::new(),
                })
            }
            b"pPr" => self.in_paragraph_props = true,
            b"pStyle" if self.in_paragraph_props => {
                if let (Some(paragraph), Some(style)) = (self.paragraph.as_mut(), attr_val(e)) {
                    paragraph.tag = heading_tag(&style).unwrap_or("p");
                }
            }
            b"r" => {
                self.bold = false;
                self.italic = false;
                self.underline = false;
            }
            b"rPr" => self.in_run_props = true,
            b"b" if self.in_run_props => self.bold = toggle_on(e),
            b"i" if self.in_run_props => self.italic = toggle_on(e),
            b"u" if self.in_run_props => {
                self.underline = attr_val(e).map_or(true, |v| v != "none")
            }
            b"t" => self.in_text = true,
            b"tab" if !self.in_paragraph_props => self.push("&emsp;"),
            b"br" | b"cr" => self.push("<br/>"),
            b"tbl" => self.out.push_str("<table>"),
            b"tr" => self.out.push_str("<tr>"),
            b"tc" => self.out.push_str("<td>"),
            _ => {}
        }
    }

    fn close(&mut self, local_name: &[u8]) {
        match local_name {
            b"p" => {
                if let Some(paragraph) = self.paragraph.take() {
                    self.out.push_str(&format!(
                        "<{tag}>{body}</{tag}>",
                        tag = paragraph.tag,
                        body = paragraph.body
                    ));
                }
            }
            b"pPr" => self.in_paragraph_props = false,
            b"rPr" => self.in_run_props = false,
            b"t" => self.in_text = false,
            b"tbl" => self.out.push_str("</table>"),
            b"tr" => self.out.push_str("</tr>"),
            b"tc" => self.out.push_str("</td>"),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        let mut fragment = escape_xml(text);
        if self.underline {
            fragment = format!("<u>{fragment}</u>");
        }
        if self.italic {
            fragment = format!("<em>{fragment}</em>");
        }
        if self.bold {
            fragment = format!("<strong>{fragment}</strong>");
        }
        self.push(&fragment);
    }

    fn push(&mut self, fragment: &str) {
        match self.paragraph.as_mut() {
            Some(paragraph) => paragraph.body.push_str(fragment),
            None => self.out.push_str(fragment),
        }
    }

    fn finish(mut self) -> String {
        self.close(b"p");
        format!("<div class=\"docx-preview\">{}</div>", self.out)
    }
}

/// Value of the element's `val` attribute, whatever its prefix.
fn attr_val(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == b"val")
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// `<w:b/>` is on; `<w:b w:val="0"/>` (or false/off) is off.
fn toggle_on(e: &BytesStart<'_>) -> bool {
    !matches!(attr_val(e).as_deref(), Some("0" | "false" | "off"))
}

fn heading_tag(style: &str) -> Option<&'static str> {
    if style.eq_ignore_ascii_case("title") {
        return Some("h1");
    }
    let level = style
        .strip_prefix("Heading")
        .or_else(|| style.strip_prefix("heading"))?
        .trim()
        .parse::<u8>()
        .ok()?;
    match level {
        1 => Some("h1"),
        2 => Some("h2"),
        3 => Some("h3"),
        4 => Some("h4"),
        5 => Some("h5"),
        6 => Some("h6"),
        _ => None,
    }
}
