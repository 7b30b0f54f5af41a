//! Sample templates for testing and demonstration.
//!
//! HTML samples use `{{Placeholder}}` tokens; Word samples are assembled in
//! memory by [`WordTemplateBuilder`], which writes the minimal set of package
//! parts a word processor needs to open the file.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::Result;
use crate::model::{ContentEntry, DocumentRequest, ImageData, PdfRequest, TableData, TemplateKind};

/// A 1×1 transparent PNG.
pub const PIXEL_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64,
    0xf8, 0xcf, 0x50, 0x0f, 0x00, 0x03, 0x86, 0x01, 0x80, 0x5a, 0x34, 0x7d, 0x6b, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Base64 form of [`PIXEL_PNG`].
pub const PIXEL_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

/// Invoice with header fields and a totals line.
pub fn invoice_html() -> &'static str {
    r##"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Invoice {{InvoiceNumber}}</title></head>
<body>
    <h1 style="color: #1a365d">Invoice #{{InvoiceNumber}}</h1>
    <p><strong>Billed to:</strong> {{CustomerName}}</p>
    <p><strong>Date:</strong> {{InvoiceDate}}</p>
    <table style="width: 100%">
        <tr><th>Item</th><th>Qty</th><th>Price</th></tr>
        <tr><td>Web Development</td><td>40</td><td>$150.00</td></tr>
    </table>
    <p style="text-align: right"><strong>Total: {{Total}}</strong></p>
    <p style="font-size: 10px">Invoice {{InvoiceNumber}}: thank you for your business.</p>
</body>
</html>
"##
}

/// Short letter.
pub fn letter_html() -> &'static str {
    r##"<!DOCTYPE html>
<html>
<body>
    <p>Dear {{RecipientName}},</p>
    <p>{{Body}}</p>
    <p>Kind regards,<br/>{{SenderName}}</p>
</body>
</html>
"##
}

/// Template-language source: compiled first, then `{{Signature}}` is
/// substituted in the resulting HTML.
pub fn report_ejs() -> &'static str {
    r##"<!DOCTYPE html>
<html>
<body>
    <h1><%= title %></h1>
    <ul>
    <% items.forEach(function (item) { %>
        <li><%= item %></li>
    <% }); %>
    </ul>
    <p>{{Signature}}</p>
</body>
</html>
"##
}

// ---------------------------------------------------------------------------
// Word
// ---------------------------------------------------------------------------

const NS_DECLS: &str = concat!(
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#,
);

const IMAGE_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

enum Block {
    Paragraph(Vec<String>),
    Table(Vec<Vec<String>>),
    Image { name: String, index: usize },
}

struct Media {
    extension: String,
    data: Vec<u8>,
}

/// Builds minimal `.docx` packages containing paragraphs, tables and inline
/// pictures.
#[derive(Default)]
pub struct WordTemplateBuilder {
    blocks: Vec<Block>,
    media: Vec<Media>,
}

impl WordTemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paragraph with a single run.
    pub fn paragraph(self, text: &str) -> Self {
        self.runs(&[text])
    }

    /// Paragraph with one run per slice element.
    pub fn runs(mut self, runs: &[&str]) -> Self {
        self.blocks
            .push(Block::Paragraph(runs.iter().map(|r| r.to_string()).collect()));
        self
    }

    /// Table; the first row is the header row.
    pub fn table(mut self, rows: &[&[&str]]) -> Self {
        self.blocks.push(Block::Table(
            rows.iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        ));
        self
    }

    /// Inline picture whose drawing is named `name`.
    pub fn image(mut self, name: &str, extension: &str, data: &[u8]) -> Self {
        self.media.push(Media {
            extension: extension.to_string(),
            data: data.to_vec(),
        });
        self.blocks.push(Block::Image {
            name: name.to_string(),
            index: self.media.len(),
        });
        self
    }

    /// Assemble the package.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(self.content_types().as_bytes())?;
        zip.start_file("_rels/.rels", options)?;
        zip.write_all(PACKAGE_RELS_XML.as_bytes())?;
        zip.start_file("word/document.xml", options)?;
        zip.write_all(self.document_xml().as_bytes())?;
        zip.start_file("word/_rels/document.xml.rels", options)?;
        zip.write_all(self.document_rels().as_bytes())?;
        for (i, media) in self.media.iter().enumerate() {
            zip.start_file(format!("word/media/image{}.{}", i + 1, media.extension), options)?;
            zip.write_all(&media.data)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    fn content_types(&self) -> String {
        let mut defaults = String::new();
        let mut seen: Vec<&str> = Vec::new();
        for media in &self.media {
            let ext = media.extension.as_str();
            if seen.contains(&ext) {
                continue;
            }
            seen.push(ext);
            let mime = match ext {
                "jpg" | "jpeg" => "image/jpeg",
                "gif" => "image/gif",
                _ => "image/png",
            };
            defaults.push_str(&format!(r#"<Default Extension="{ext}" ContentType="{mime}"/>"#));
        }
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                r#"<Default Extension="xml" ContentType="application/xml"/>{}"#,
                r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
                r#"</Types>"#
            ),
            defaults
        )
    }

    fn document_rels(&self) -> String {
        let mut rels = String::new();
        for (i, media) in self.media.iter().enumerate() {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="{IMAGE_REL}" Target="media/image{n}.{ext}"/>"#,
                n = i + 1,
                ext = media.extension
            ));
        }
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}</Relationships>"#
            ),
            rels
        )
    }

    fn document_xml(&self) -> String {
        let mut body = String::new();
        for block in &self.blocks {
            match block {
                Block::Paragraph(runs) => body.push_str(&paragraph_xml(runs)),
                Block::Table(rows) => body.push_str(&table_xml(rows)),
                Block::Image { name, index } => body.push_str(&drawing_xml(name, *index)),
            }
        }
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                "\n",
                r#"<w:document {}><w:body>{}"#,
                r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#
            ),
            NS_DECLS, body
        )
    }
}

const PACKAGE_RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#
);

fn paragraph_xml(runs: &[String]) -> String {
    let runs: String = runs
        .iter()
        .filter(|r| !r.is_empty())
        .map(|r| format!(r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#, escape(r.as_str())))
        .collect();
    if runs.is_empty() {
        "<w:p/>".to_string()
    } else {
        format!("<w:p>{runs}</w:p>")
    }
}

fn table_xml(rows: &[Vec<String>]) -> String {
    let columns = rows.first().map_or(0, |r| r.len());
    let grid: String = (0..columns)
        .map(|_| r#"<w:gridCol w:w="2000"/>"#)
        .collect();
    let body: String = rows
        .iter()
        .map(|row| {
            let cells: String = row
                .iter()
                .map(|text| {
                    format!(
                        r#"<w:tc><w:tcPr><w:tcW w:w="2000" w:type="dxa"/></w:tcPr>{}</w:tc>"#,
                        paragraph_xml(std::slice::from_ref(text))
                    )
                })
                .collect();
            format!("<w:tr>{cells}</w:tr>")
        })
        .collect();
    format!(
        r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/></w:tblPr><w:tblGrid>{grid}</w:tblGrid>{body}</w:tbl>"#
    )
}

fn drawing_xml(name: &str, index: usize) -> String {
    let name = escape(name);
    format!(
        concat!(
            r#"<w:p><w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="952500" cy="952500"/><wp:docPr id="{n}" name="{name}"/>"#,
            r#"<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic><pic:nvPicPr><pic:cNvPr id="{n}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="rId{n}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="952500" cy="952500"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic>"#,
            r#"</a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
        ),
        n = index,
        name = name
    )
}

/// Invoice-style Word template with body, table and image placeholders.
pub fn invoice_docx() -> Result<Vec<u8>> {
    WordTemplateBuilder::new()
        .paragraph("Invoice {InvoiceNumber}")
        .runs(&["Billed to: ", "{Customer", "Name}"])
        .image("CompanyLogo", "png", PIXEL_PNG)
        .table(&[&["Item", "Qty", "Price"]])
        .paragraph("Totals")
        .table(&[&["Label", "Amount"], &["Total", "{Total}"]])
        .build()
}

// ---------------------------------------------------------------------------
// Sample set
// ---------------------------------------------------------------------------

/// Write every sample template into `dir`, together with a ready-to-run
/// request for each. Returns the written paths.
pub fn write_samples(dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    let mut write = |name: &str, bytes: &[u8]| -> Result<()> {
        let path = dir.join(name);
        std::fs::write(&path, bytes)?;
        written.push(path);
        Ok(())
    };

    write("invoice.html", invoice_html().as_bytes())?;
    write("letter.html", letter_html().as_bytes())?;
    write("report.ejs", report_ejs().as_bytes())?;
    write("invoice.docx", &invoice_docx()?)?;

    let pdf = PdfRequest {
        template: dir.join("invoice.html"),
        template_kind: TemplateKind::Html,
        template_data: None,
        placeholders: vec![
            ContentEntry::text("InvoiceNumber", "INV-0042"),
            ContentEntry::text("CustomerName", "Acme Corp"),
            ContentEntry::text("InvoiceDate", "2024-03-01"),
            ContentEntry::text("Total", "$6,000.00"),
        ],
    };
    write("invoice-pdf.json", &to_json(&pdf)?)?;

    let report = PdfRequest {
        template: dir.join("report.ejs"),
        template_kind: TemplateKind::TemplateLanguage,
        template_data: Some(r#"{"title":"Quarterly report","items":["Revenue","Costs"]}"#.to_string()),
        placeholders: vec![ContentEntry::text("Signature", "The Board")],
    };
    write("report-pdf.json", &to_json(&report)?)?;

    let row = |item: &str, qty: &str, price: &str| -> HashMap<String, String> {
        [("Item", item), ("Qty", qty), ("Price", price)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    };
    let word = DocumentRequest {
        template: dir.join("invoice.docx"),
        placeholders: vec![
            ContentEntry::text("InvoiceNumber", "INV-0042"),
            ContentEntry::text("CustomerName", "Acme Corp"),
            ContentEntry::table_text("Total", "$6,150.00"),
        ],
        tables_data: vec![TableData {
            table_pos: 1,
            data: vec![
                row("Web Development", "40", "$150.00"),
                row("Hosting", "1", "$150.00"),
            ],
        }],
        images: vec![ImageData::base64("CompanyLogo", PIXEL_PNG_BASE64, "png")],
    };
    write("invoice-word.json", &to_json(&word)?)?;

    Ok(written)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value).map_err(std::io::Error::from)?)
}
