//! Source templates with regions for generated code.
//!
//! A template is an ordinary source file containing placeholder lines:
//!
//! ```text
//!     // GENERATED CODE: dispatch
//! ```
//!
//! Inserting code replaces the placeholder with a filled region, indented to
//! the placeholder's indentation:
//!
//! ```text
//!     // BEGIN GENERATED CODE: dispatch
//!     match self.opcode {
//!     ...
//!     // END GENERATED CODE: dispatch
//! ```
//!
//! Extraction is the inverse and turns filled regions back into
//! placeholders. The region name (`: dispatch`) is optional. Inserting code
//! into a freshly extracted template reproduces the generated file exactly.

use std::{error, fmt};

pub const PLACEHOLDER: &str = "// GENERATED CODE";
pub const BEGIN: &str = "// BEGIN GENERATED CODE";
pub const END: &str = "// END GENERATED CODE";

/// A named slot for generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    name: String,
    /// Everything on the marker line before the marker.
    indent: String,
    /// Everything on the opening marker line after the marker.
    tail: String,
    /// Everything on the closing marker line after the marker.
    end_tail: String,
    /// Lines between the markers, `None` for a placeholder.
    body: Option<Vec<String>>,
}

impl Region {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_filled(&self) -> bool {
        self.body.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Region(Region),
}

enum Marker<'a> {
    Placeholder { indent: &'a str, tail: &'a str },
    Begin { indent: &'a str, tail: &'a str },
    End { tail: &'a str },
}

impl<'a> Marker<'a> {
    fn find(line: &'a str) -> Option<Self> {
        // BEGIN/END don't contain the placeholder text, but check them first
        // anyways
        if let Some(pos) = line.find(BEGIN) {
            Some(Marker::Begin {
                indent: &line[..pos],
                tail: &line[pos + BEGIN.len()..],
            })
        } else if let Some(pos) = line.find(END) {
            Some(Marker::End {
                tail: &line[pos + END.len()..],
            })
        } else if let Some(pos) = line.find(PLACEHOLDER) {
            Some(Marker::Placeholder {
                indent: &line[..pos],
                tail: &line[pos + PLACEHOLDER.len()..],
            })
        } else {
            None
        }
    }
}

/// Extracts the region name from the text following a marker.
fn region_name(tail: &str) -> String {
    let tail = tail.trim();
    if tail.starts_with(':') {
        tail[1..].trim().to_string()
    } else {
        tail.to_string()
    }
}

/// A parsed template or generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    parts: Vec<Part>,
}

impl Document {
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        // Open region and the line it was opened on
        let mut open: Option<(Region, usize)> = None;

        for (i, line) in text.split('\n').enumerate() {
            let line_no = i + 1;

            match (Marker::find(line), open.take()) {
                (None, None) => parts.push(Part::Literal(line.to_string())),
                (None, Some((mut region, start))) => {
                    if let Some(body) = region.body.as_mut() {
                        body.push(line.to_string());
                    }
                    open = Some((region, start));
                }
                (Some(Marker::Placeholder { indent, tail }), None) => {
                    parts.push(Part::Region(Region {
                        name: region_name(tail),
                        indent: indent.to_string(),
                        tail: tail.to_string(),
                        end_tail: tail.to_string(),
                        body: None,
                    }));
                }
                (Some(Marker::Begin { indent, tail }), None) => {
                    let region = Region {
                        name: region_name(tail),
                        indent: indent.to_string(),
                        tail: tail.to_string(),
                        end_tail: String::new(),
                        body: Some(Vec::new()),
                    };
                    open = Some((region, line_no));
                }
                (Some(Marker::End { .. }), None) => {
                    return Err(TemplateError::Unbalanced { line: line_no });
                }
                (Some(Marker::End { tail }), Some((mut region, _))) => {
                    let found = region_name(tail);
                    if found != region.name {
                        return Err(TemplateError::MismatchedEnd {
                            line: line_no,
                            expected: region.name,
                            found,
                        });
                    }
                    region.end_tail = tail.to_string();
                    parts.push(Part::Region(region));
                }
                (Some(Marker::Placeholder { .. }), Some((region, _)))
                | (Some(Marker::Begin { .. }), Some((region, _))) => {
                    return Err(TemplateError::Nested {
                        line: line_no,
                        outer: region.name,
                    });
                }
            }
        }

        if let Some((_, start)) = open {
            return Err(TemplateError::Unterminated { line: start });
        }

        Ok(Document { parts })
    }

    /// Iterates over all regions in document order.
    pub fn regions<'a>(&'a self) -> impl Iterator<Item = &'a Region> + 'a {
        self.parts.iter().filter_map(|part| match part {
            Part::Region(r) => Some(r),
            Part::Literal(_) => None,
        })
    }

    /// Fills every region named `name` with `code`, replacing previous
    /// contents.
    ///
    /// Every non-empty line of `code` is prefixed with the indentation of the
    /// region's marker.
    pub fn insert(&mut self, name: &str, code: &str) -> Result<(), TemplateError> {
        let mut found = false;

        for part in &mut self.parts {
            if let Part::Region(region) = part {
                if region.name != name {
                    continue;
                }

                let body = if code.is_empty() {
                    Vec::new()
                } else {
                    code.split('\n')
                        .map(|line| {
                            if line.is_empty() {
                                String::new()
                            } else {
                                format!("{}{}", region.indent, line)
                            }
                        })
                        .collect()
                };
                region.body = Some(body);
                region.end_tail = region.tail.clone();
                found = true;
            }
        }

        if found {
            Ok(())
        } else {
            Err(TemplateError::UnknownRegion(name.to_string()))
        }
    }

    /// Turns every filled region back into a placeholder.
    pub fn extract(&mut self) {
        for part in &mut self.parts {
            if let Part::Region(region) = part {
                region.body = None;
            }
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut lines = Vec::new();

        for part in &self.parts {
            match part {
                Part::Literal(text) => lines.push(text.clone()),
                Part::Region(r) => match &r.body {
                    None => lines.push(format!("{}{}{}", r.indent, PLACEHOLDER, r.tail)),
                    Some(body) => {
                        lines.push(format!("{}{}{}", r.indent, BEGIN, r.tail));
                        lines.extend(body.iter().cloned());
                        lines.push(format!("{}{}{}", r.indent, END, r.end_tail));
                    }
                },
            }
        }

        f.write_str(&lines.join("\n"))
    }
}

/// Inserts `code` into the regions called `name` of `template`.
pub fn insert_code(template: &str, name: &str, code: &str) -> Result<String, TemplateError> {
    let mut doc = Document::parse(template)?;
    doc.insert(name, code)?;
    Ok(doc.to_string())
}

/// Recovers the template a generated file was created from.
pub fn extract_template(generated: &str) -> Result<String, TemplateError> {
    let mut doc = Document::parse(generated)?;
    doc.extract();
    Ok(doc.to_string())
}

/// Malformed template or failed insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// End marker without a matching begin marker.
    Unbalanced { line: usize },
    /// A marker inside an open region.
    Nested { line: usize, outer: String },
    /// Begin marker without an end marker.
    Unterminated { line: usize },
    MismatchedEnd { line: usize, expected: String, found: String },
    UnknownRegion(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TemplateError::Unbalanced { line } => {
                write!(f, "line {}: end marker without begin marker", line)
            }
            TemplateError::Nested { line, outer } => {
                write!(f, "line {}: marker inside region '{}'", line, outer)
            }
            TemplateError::Unterminated { line } => {
                write!(f, "line {}: region is never closed", line)
            }
            TemplateError::MismatchedEnd { line, expected, found } => write!(
                f,
                "line {}: end marker for region '{}' closes region '{}'",
                line, found, expected
            ),
            TemplateError::UnknownRegion(name) => write!(f, "no region named '{}'", name),
        }
    }
}

impl error::Error for TemplateError {}
