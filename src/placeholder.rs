//! Placeholder discovery and deferred substitution.
//!
//! Raw SQL fragments are scanned for `:name` markers. Each marker becomes a
//! [`Segment::Slot`] pointing into a shared [`ParameterOrder`], so the template
//! never carries caller values; they are quoted and spliced in by
//! [`ClauseTemplate::render`] at call time.

use std::fmt;

use crate::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// Index into the finder's [`ParameterOrder`].
    Slot(usize),
}

/// Immutable SQL text with slot references where placeholders used to be.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClauseTemplate {
    segments: Vec<Segment>,
}

impl ClauseTemplate {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Slot indices in order of appearance, repeats included.
    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Slot(slot) => Some(*slot),
            Segment::Text(_) => None,
        })
    }

    /// Builds the final SQL, asking `value_for` for the text of every slot
    /// occurrence.
    pub fn render<F>(&self, mut value_for: F) -> Result<String>
    where
        F: FnMut(usize) -> Result<String>,
    {
        let mut sql = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => sql.push_str(text),
                Segment::Slot(slot) => sql.push_str(&value_for(*slot)?),
            }
        }
        Ok(sql)
    }

    /// Renders slots back as `:name` markers.
    pub fn with_markers(&self, order: &ParameterOrder) -> String {
        let mut sql = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => sql.push_str(text),
                Segment::Slot(slot) => {
                    sql.push(':');
                    sql.push_str(order.name(*slot).unwrap_or("?"));
                }
            }
        }
        sql
    }
}

impl fmt::Display for ClauseTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => f.write_str(text)?,
                Segment::Slot(slot) => write!(f, "${}", slot + 1)?,
            }
        }
        Ok(())
    }
}

/// Accumulates clause fragments into one [`ClauseTemplate`].
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    segments: Vec<Segment>,
}

impl TemplateBuilder {
    pub fn new(initial: &str) -> Self {
        let mut builder = Self::default();
        builder.push(initial);
        builder
    }

    pub fn push(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        if let Some(Segment::Text(last)) = self.segments.last_mut() {
            last.push_str(text);
        } else {
            self.segments.push(Segment::Text(text.to_string()));
        }
        self
    }

    pub fn push_template(&mut self, template: &ClauseTemplate) -> &mut Self {
        for segment in &template.segments {
            match segment {
                Segment::Text(text) => {
                    self.push(text);
                }
                Segment::Slot(slot) => self.segments.push(Segment::Slot(*slot)),
            }
        }
        self
    }

    pub fn build(self) -> ClauseTemplate {
        ClauseTemplate {
            segments: self.segments,
        }
    }
}

/// Distinct placeholder names in first-occurrence order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParameterOrder(Vec<String>);

impl ParameterOrder {
    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn name(&self, slot: usize) -> Option<&str> {
        self.0.get(slot).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|existing| existing == name)
    }

    fn slot_for(&mut self, name: &str) -> usize {
        match self.slot_of(name) {
            Some(slot) => slot,
            None => {
                self.0.push(name.to_string());
                self.0.len() - 1
            }
        }
    }
}

/// Scans fragments for placeholders, sharing one [`ParameterOrder`] across
/// every fragment of a finder.
#[derive(Debug, Default)]
pub struct PlaceholderBinder {
    order: ParameterOrder,
}

impl PlaceholderBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites `fragment`, replacing each `:name` with a slot. `::` casts and
    /// colons not followed by an identifier are kept as text.
    pub fn bind(&mut self, fragment: &str) -> ClauseTemplate {
        let mut builder = TemplateBuilder::default();
        let mut text = String::new();
        let mut chars = fragment.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch != ':' {
                text.push(ch);
                continue;
            }
            match chars.peek().copied() {
                Some(':') => {
                    text.push_str("::");
                    chars.next();
                }
                Some(next) if next.is_ascii_alphabetic() || next == '_' => {
                    let mut name = String::new();
                    while let Some(c) = chars.peek().copied() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    builder.push(&std::mem::take(&mut text));
                    let slot = self.order.slot_for(&name);
                    builder.segments.push(Segment::Slot(slot));
                }
                _ => text.push(':'),
            }
        }

        builder.push(&text);
        builder.build()
    }

    pub fn order(&self) -> &ParameterOrder {
        &self.order
    }

    pub fn finish(self) -> ParameterOrder {
        self.order
    }
}
