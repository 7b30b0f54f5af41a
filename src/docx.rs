//! Word package model – two independent views of the same `.docx` file.
//!
//! - [`WordDocument`] parses the main document part into an editable tree and
//!   exposes the body as paragraphs and tables for text substitution and row
//!   population.
//! - [`WordPackage`] works at the part/relationship level: it finds drawings,
//!   resolves their embedded image parts and swaps the binary content.
//!
//! The views never share in-memory state. A caller saves one before opening
//! the other on the saved file.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ForgeError, Result};
use crate::placeholders::{word_token_regex, PlaceholderMap};
use crate::xml::{self, XmlDocument, XmlElement, XmlNode};

/// Main document part used when the package relationships do not name one.
const DEFAULT_MAIN_PART: &str = "word/document.xml";
const PACKAGE_RELS: &str = "_rels/.rels";
const OFFICE_DOCUMENT_REL: &str = "/officeDocument";
/// Largest uncompressed part size accepted from a package.
const MAX_PART_SIZE: u64 = 256 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Package (zip) layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Vec<u8>,
    stored: bool,
}

/// All parts of an OOXML package, in archive order.
#[derive(Debug, Clone)]
struct Package {
    parts: Vec<Part>,
}

impl Package {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            if file.size() > MAX_PART_SIZE {
                return Err(ForgeError::Package(format!(
                    "part {} declares {} bytes, limit is {MAX_PART_SIZE}",
                    file.name(),
                    file.size()
                )));
            }
            let mut data = Vec::new();
            (&mut file).take(MAX_PART_SIZE + 1).read_to_end(&mut data)?;
            if data.len() as u64 > MAX_PART_SIZE {
                return Err(ForgeError::Package(format!(
                    "part {} exceeds {MAX_PART_SIZE} bytes",
                    file.name()
                )));
            }
            parts.push(Part {
                name: file.name().to_string(),
                stored: file.compression() == CompressionMethod::Stored,
                data,
            });
        }
        Ok(Self { parts })
    }

    async fn open(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_bytes(&bytes)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for part in &self.parts {
            let method = if part.stored {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            let options = SimpleFileOptions::default().compression_method(method);
            writer.start_file(part.name.as_str(), options)?;
            writer.write_all(&part.data)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    async fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.data.as_slice())
    }

    fn part_mut(&mut self, name: &str) -> Option<&mut Vec<u8>> {
        self.parts
            .iter_mut()
            .find(|p| p.name == name)
            .map(|p| &mut p.data)
    }

    fn part_str(&self, name: &str) -> Result<&str> {
        let data = self
            .part(name)
            .ok_or_else(|| ForgeError::Package(format!("missing part {name}")))?;
        std::str::from_utf8(data)
            .map_err(|e| ForgeError::Package(format!("part {name} is not UTF-8: {e}")))
    }

    /// Name of the main document part.
    fn main_part_name(&self) -> Result<String> {
        if self.part(PACKAGE_RELS).is_some() {
            let rels = parse_relationships(self.part_str(PACKAGE_RELS)?, "")?;
            if let Some(rel) = rels.values().find(|r| r.kind.ends_with(OFFICE_DOCUMENT_REL)) {
                if !rel.external {
                    return Ok(rel.target.clone());
                }
            }
        }
        if self.part(DEFAULT_MAIN_PART).is_some() {
            return Ok(DEFAULT_MAIN_PART.to_string());
        }
        Err(ForgeError::Package(
            "no main document part found".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Relationship {
    kind: String,
    /// Part name resolved against the source part's directory.
    target: String,
    external: bool,
}

/// Relationships part that belongs to `part` (`word/document.xml` →
/// `word/_rels/document.xml.rels`).
fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

fn parse_relationships(xml: &str, base_dir: &str) -> Result<HashMap<String, Relationship>> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if local_name(&e) == b"Relationship" => {
                let (mut id, mut kind, mut target, mut mode) =
                    (None, String::new(), String::new(), String::new());
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.as_ref() {
                        b"Id" => id = Some(value),
                        b"Type" => kind = value,
                        b"Target" => target = value,
                        b"TargetMode" => mode = value,
                        _ => {}
                    }
                }
                if let Some(id) = id {
                    let external = mode.eq_ignore_ascii_case("External");
                    let target = if external {
                        target
                    } else {
                        resolve_target(base_dir, &target)
                    };
                    rels.insert(id, Relationship { kind, target, external });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// Resolve a relationship target relative to `base_dir`, normalising `..`.
fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None if base_dir.is_empty() => target.to_string(),
        None => format!("{base_dir}/{target}"),
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn local_name<'a>(e: &'a BytesStart<'_>) -> &'a [u8] {
    let name = e.name().into_inner();
    match name.iter().position(|&b| b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

// ---------------------------------------------------------------------------
// Paragraph / table view
// ---------------------------------------------------------------------------

const W_BODY: &str = "w:body";
const W_P: &str = "w:p";
const W_R: &str = "w:r";
const W_T: &str = "w:t";
const W_TBL: &str = "w:tbl";
const W_TR: &str = "w:tr";
const W_TC: &str = "w:tc";
const W_TC_PR: &str = "w:tcPr";
const W_TXBX_CONTENT: &str = "w:txbxContent";

/// The main document part as an editable tree of paragraphs and tables.
#[derive(Debug, Clone)]
pub struct WordDocument {
    package: Package,
    main_part: String,
    tree: XmlDocument,
}

/// A block-level element of the document body.
pub enum BodyBlock<'a> {
    Paragraph(Paragraph<'a>),
    Table(Table<'a>),
}

impl WordDocument {
    /// Load a package from disk.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::from_package(Package::open(path).await?)
    }

    /// Load a package from memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    fn from_package(package: Package) -> Result<Self> {
        let main_part = package.main_part_name()?;
        let tree = xml::parse(package.part_str(&main_part)?)?;
        let document = Self {
            package,
            main_part,
            tree,
        };
        document.body()?;
        Ok(document)
    }

    fn body(&self) -> Result<&XmlElement> {
        self.tree
            .root()
            .and_then(|root| root.child(W_BODY))
            .ok_or_else(|| ForgeError::Package("document has no body".to_string()))
    }

    fn body_mut(&mut self) -> Result<&mut XmlElement> {
        self.tree
            .root_mut()
            .and_then(|root| root.child_mut(W_BODY))
            .ok_or_else(|| ForgeError::Package("document has no body".to_string()))
    }

    /// Body paragraphs and tables in document order. Other block-level
    /// elements (section properties, content controls) are skipped.
    pub fn blocks_mut(&mut self) -> Result<Vec<BodyBlock<'_>>> {
        let body = self.body_mut()?;
        Ok(body
            .elements_mut()
            .filter_map(|e| match e.name.as_str() {
                W_P => Some(BodyBlock::Paragraph(Paragraph(e))),
                W_TBL => Some(BodyBlock::Table(Table(e))),
                _ => None,
            })
            .collect())
    }

    /// Text of every body paragraph, tables excluded.
    pub fn paragraph_texts(&self) -> Result<Vec<String>> {
        Ok(self
            .body()?
            .children_named(W_P)
            .map(paragraph_text)
            .collect())
    }

    /// Cell text of every body table as rows of strings.
    pub fn table_texts(&self) -> Result<Vec<Vec<Vec<String>>>> {
        Ok(self
            .body()?
            .children_named(W_TBL)
            .map(|table| {
                table
                    .children_named(W_TR)
                    .map(|row| row.children_named(W_TC).map(cell_text).collect())
                    .collect()
            })
            .collect())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut package = self.package.clone();
        self.write_tree(&mut package)?;
        package.to_bytes()
    }

    /// Write the package, with the edited main part, to `path`.
    pub async fn save(mut self, path: &Path) -> Result<()> {
        let mut package = std::mem::replace(&mut self.package, Package { parts: Vec::new() });
        self.write_tree(&mut package)?;
        package.save(path).await
    }

    fn write_tree(&self, package: &mut Package) -> Result<()> {
        let bytes = xml::write(&self.tree)?;
        let slot = package
            .part_mut(&self.main_part)
            .ok_or_else(|| ForgeError::Package(format!("missing part {}", self.main_part)))?;
        *slot = bytes;
        Ok(())
    }
}

/// A body paragraph.
pub struct Paragraph<'a>(&'a mut XmlElement);

impl Paragraph<'_> {
    pub fn text(&self) -> String {
        paragraph_text(self.0)
    }

    /// Replace tokens found in this paragraph that `tokens` knows about.
    /// Returns the number of token occurrences replaced.
    pub fn substitute(&mut self, tokens: &PlaceholderMap) -> usize {
        substitute_paragraph(self.0, tokens)
    }
}

/// A body table.
pub struct Table<'a>(&'a mut XmlElement);

impl Table<'_> {
    pub fn row_count(&self) -> usize {
        self.0.children_named(W_TR).count()
    }

    /// Header texts from the first row, one per cell.
    pub fn headers(&self) -> Vec<String> {
        self.0
            .child(W_TR)
            .map(|row| row.children_named(W_TC).map(cell_text).collect())
            .unwrap_or_default()
    }

    /// Substitute tokens in every paragraph of every cell.
    pub fn substitute(&mut self, tokens: &PlaceholderMap) -> usize {
        let mut replaced = 0;
        for row in self.0.elements_mut().filter(|e| e.name == W_TR) {
            for cell in row.elements_mut().filter(|e| e.name == W_TC) {
                for paragraph in cell.elements_mut().filter(|e| e.name == W_P) {
                    replaced += substitute_paragraph(paragraph, tokens);
                }
            }
        }
        replaced
    }

    /// Append one row per mapping. Cells are matched to mapping keys by the
    /// header row's text; headers without a key get an empty cell. Does
    /// nothing when the table has no header cells.
    pub fn append_rows(&mut self, rows: &[HashMap<String, String>]) -> usize {
        let Some(header) = self.0.child(W_TR) else {
            return 0;
        };
        let columns: Vec<(String, Option<XmlElement>)> = header
            .children_named(W_TC)
            .map(|cell| (cell_text(cell), cell.child(W_TC_PR).cloned()))
            .collect();
        if columns.is_empty() {
            return 0;
        }

        for values in rows {
            let mut row = XmlElement::new(W_TR);
            for (header_text, properties) in &columns {
                row = row.with_child(new_cell(properties.clone(), values.get(header_text)));
            }
            self.0.children.push(XmlNode::Element(row));
        }
        rows.len()
    }
}

fn new_cell(properties: Option<XmlElement>, value: Option<&String>) -> XmlElement {
    let mut cell = XmlElement::new(W_TC);
    if let Some(properties) = properties {
        cell = cell.with_child(properties);
    }
    let mut paragraph = XmlElement::new(W_P);
    if let Some(value) = value {
        paragraph = paragraph.with_child(
            XmlElement::new(W_R).with_child(
                XmlElement::new(W_T)
                    .with_attr("xml:space", "preserve")
                    .with_text(value),
            ),
        );
    }
    cell.with_child(paragraph)
}

/// Cell text: its paragraphs joined by newlines.
fn cell_text(cell: &XmlElement) -> String {
    cell.children_named(W_P)
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph_text(paragraph: &XmlElement) -> String {
    let mut text = String::new();
    collect_text(paragraph, &mut text);
    text
}

fn collect_text(element: &XmlElement, out: &mut String) {
    for child in element.elements() {
        match child.name.as_str() {
            W_T => out.push_str(&child.text()),
            W_TXBX_CONTENT => {}
            _ => collect_text(child, out),
        }
    }
}

fn collect_text_nodes<'a>(element: &'a mut XmlElement, out: &mut Vec<&'a mut XmlElement>) {
    for child in element.elements_mut() {
        if child.name == W_T {
            out.push(child);
        } else if child.name != W_TXBX_CONTENT {
            collect_text_nodes(child, out);
        }
    }
}

fn substitute_paragraph(paragraph: &mut XmlElement, tokens: &PlaceholderMap) -> usize {
    if tokens.is_empty() {
        return 0;
    }
    let text = paragraph_text(paragraph);
    if text.is_empty() {
        return 0;
    }

    let mut found: Vec<String> = Vec::new();
    for m in word_token_regex().find_iter(&text) {
        if tokens.contains(m.as_str()) && !found.iter().any(|f| f == m.as_str()) {
            found.push(m.as_str().to_string());
        }
    }
    if found.is_empty() {
        return 0;
    }

    let mut runs = Vec::new();
    collect_text_nodes(paragraph, &mut runs);

    let mut replaced = 0;
    for token in &found {
        let Some(value) = tokens.get(token) else {
            continue;
        };
        replaced += replace_across_runs(&mut runs, token, value);
    }
    replaced
}

/// Replace every occurrence of `token` in the concatenated text of `runs`.
///
/// The value is written into the run where the token starts; the rest of the
/// token is cut out of the following runs so their formatting is untouched.
fn replace_across_runs(runs: &mut [&mut XmlElement], token: &str, value: &str) -> usize {
    let mut replaced = 0;
    let mut search_from = 0;
    loop {
        let full: String = runs.iter().map(|r| r.text()).collect();
        let Some(pos) = full.get(search_from..).and_then(|rest| rest.find(token)) else {
            break;
        };
        let start = search_from + pos;
        let end = start + token.len();

        let mut offset = 0;
        let mut inserted = false;
        for run in runs.iter_mut() {
            let text = run.text();
            let (run_start, run_end) = (offset, offset + text.len());
            offset = run_end;
            if run_end <= start || run_start >= end {
                continue;
            }
            let cut_from = start.saturating_sub(run_start);
            let cut_to = end.min(run_end) - run_start;

            let mut updated = String::with_capacity(text.len() + value.len());
            updated.push_str(&text[..cut_from]);
            if !inserted {
                updated.push_str(value);
                inserted = true;
            }
            updated.push_str(&text[cut_to..]);
            run.set_text(&updated);
            run.set_attr("xml:space", "preserve");
        }

        replaced += 1;
        search_from = start + value.len();
    }
    replaced
}

// ---------------------------------------------------------------------------
// Part view
// ---------------------------------------------------------------------------

/// A drawing in the main document part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drawing {
    /// `name` property of the drawing's `wp:docPr`.
    pub name: Option<String>,
    /// Relationship ids of the images the drawing embeds.
    pub embeds: Vec<String>,
}

/// The package at part level, for replacing embedded image binaries.
#[derive(Debug, Clone)]
pub struct WordPackage {
    package: Package,
    main_part: String,
    relationships: HashMap<String, Relationship>,
}

impl WordPackage {
    pub async fn open(path: &Path) -> Result<Self> {
        Self::from_package(Package::open(path).await?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    fn from_package(package: Package) -> Result<Self> {
        let main_part = package.main_part_name()?;
        let rels_name = rels_part_for(&main_part);
        let relationships = match package.part(&rels_name) {
            Some(_) => parse_relationships(package.part_str(&rels_name)?, part_dir(&main_part))?,
            None => HashMap::new(),
        };
        Ok(Self {
            package,
            main_part,
            relationships,
        })
    }

    /// Every drawing in the main document part, in document order.
    pub fn drawings(&self) -> Result<Vec<Drawing>> {
        let mut reader = Reader::from_str(self.package.part_str(&self.main_part)?);
        let mut drawings = Vec::new();
        let mut current: Option<Drawing> = None;
        let mut depth = 0usize;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if current.is_none() && e.name().as_ref() == b"w:drawing" {
                        current = Some(Drawing {
                            name: None,
                            embeds: Vec::new(),
                        });
                        depth = 0;
                    } else if let Some(drawing) = current.as_mut() {
                        depth += 1;
                        inspect_drawing_element(&e, drawing)?;
                    }
                }
                Event::Empty(e) => {
                    if let Some(drawing) = current.as_mut() {
                        inspect_drawing_element(&e, drawing)?;
                    }
                }
                Event::End(_) => {
                    if current.is_some() {
                        if depth == 0 {
                            drawings.extend(current.take());
                        } else {
                            depth -= 1;
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(drawings)
    }

    /// Package part an embedded relationship id points at.
    pub fn image_part(&self, relationship_id: &str) -> Option<&str> {
        self.relationships
            .get(relationship_id)
            .filter(|r| !r.external)
            .map(|r| r.target.as_str())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.package.part(name)
    }

    /// Overwrite an existing part's bytes. Returns `false` if it is absent.
    pub fn replace_part(&mut self, name: &str, data: Vec<u8>) -> bool {
        match self.package.part_mut(name) {
            Some(slot) => {
                *slot = data;
                true
            }
            None => false,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.package.to_bytes()
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.package.save(path).await
    }
}

fn inspect_drawing_element(e: &BytesStart<'_>, drawing: &mut Drawing) -> Result<()> {
    match e.name().as_ref() {
        b"wp:docPr" if drawing.name.is_none() => {
            drawing.name = attribute_value(e, b"name")?;
        }
        b"a:blip" => {
            drawing.embeds.extend(attribute_value(e, b"r:embed")?);
        }
        _ => {}
    }
    Ok(())
}

fn attribute_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
