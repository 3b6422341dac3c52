//! Partwise score model: a score owns parts, a part owns measures, a measure owns its items.
//!
//! Measures point back at their part by id and are looked up by ordinal, so trimming only ever
//! edits a measure's own item list.

use crate::xml::XmlElement;
use crate::SnippetError;

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    /// Attributes of the `score-partwise` root, e.g. `version`.
    pub attributes: Vec<(String, String)>,
    /// Everything before the parts: work, identification, defaults, credits, part-list.
    pub header: Vec<XmlElement>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub id: String,
    pub attributes: Vec<(String, String)>,
    pub measures: Vec<Measure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub part_id: String,
    /// 1-based position within the part, independent of the printed measure number.
    pub ordinal: usize,
    pub attributes: Vec<(String, String)>,
    /// Attributes in force when the measure opens.
    pub context: AttributeContext,
    pub meter: Meter,
    pub items: Vec<MeasureItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureItem {
    /// Position within the measure, in divisions.
    pub offset: u32,
    pub kind: ItemKind,
    pub element: XmlElement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Note { duration: u32, rest: bool, chord: bool },
    Other,
}

/// Divisions per quarter note and the time signature governing a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meter {
    pub divisions: u32,
    pub beats: u32,
    pub beat_type: u32,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            divisions: 1,
            beats: 4,
            beat_type: 4,
        }
    }
}

impl Meter {
    fn is_compound(&self) -> bool {
        self.beats > 3 && self.beats % 3 == 0 && self.beat_type >= 8
    }

    /// Length of one beat in divisions as an exact fraction `(numerator, denominator)`.
    fn beat_fraction(&self) -> (u64, u64) {
        let grouping = if self.is_compound() { 3 } else { 1 };
        (
            self.divisions as u64 * 4 * grouping,
            self.beat_type.max(1) as u64,
        )
    }

    pub fn beats_to_divisions(&self, beats: u32) -> u32 {
        let (num, den) = self.beat_fraction();
        (beats as u64 * num / den) as u32
    }

    /// Whether `offset` lies strictly before `beats` whole beats into the measure.
    pub fn is_before(&self, offset: u32, beats: u32) -> bool {
        let (num, den) = self.beat_fraction();
        (offset as u64) * den < beats as u64 * num
    }

    /// Whether `offset` lies strictly after `beats` whole beats into the measure.
    pub fn is_after(&self, offset: u32, beats: u32) -> bool {
        let (num, den) = self.beat_fraction();
        (offset as u64) * den > beats as u64 * num
    }

    /// Nominal bar length in divisions.
    pub fn bar_divisions(&self) -> u32 {
        (self.beats as u64 * self.divisions as u64 * 4 / self.beat_type.max(1) as u64) as u32
    }
}

/// The running `<attributes>` state of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeContext {
    pub divisions: u32,
    pub key: Option<XmlElement>,
    pub time: Option<XmlElement>,
    pub staves: Option<XmlElement>,
    pub clefs: Vec<XmlElement>,
    pub transpose: Option<XmlElement>,
}

impl Default for AttributeContext {
    fn default() -> Self {
        Self {
            divisions: 1,
            key: None,
            time: None,
            staves: None,
            clefs: Vec::new(),
            transpose: None,
        }
    }
}

impl AttributeContext {
    pub fn absorb(&mut self, attributes: &XmlElement) {
        for child in attributes.elements() {
            match child.name.as_str() {
                "divisions" => {
                    if let Ok(divisions) = child.text().parse::<u32>() {
                        if divisions > 0 {
                            self.divisions = divisions;
                        }
                    }
                }
                "key" => self.key = Some(child.clone()),
                "time" => self.time = Some(child.clone()),
                "staves" => self.staves = Some(child.clone()),
                "transpose" => self.transpose = Some(child.clone()),
                "clef" => {
                    let number = child.attribute("number").unwrap_or("1");
                    self.clefs
                        .retain(|clef| clef.attribute("number").unwrap_or("1") != number);
                    self.clefs.push(child.clone());
                }
                _ => {}
            }
        }
    }

    pub fn staff_count(&self) -> u32 {
        self.staves
            .as_ref()
            .and_then(|staves| staves.text().parse().ok())
            .unwrap_or(1)
    }

    pub fn meter(&self) -> Meter {
        let mut meter = Meter {
            divisions: self.divisions,
            ..Meter::default()
        };
        if let Some(time) = &self.time {
            // composite signatures such as 3+2 add up
            let beats = time.child_text("beats").and_then(|beats| {
                beats
                    .split('+')
                    .map(|part| part.trim().parse::<u32>())
                    .sum::<Result<u32, _>>()
                    .ok()
            });
            let beat_type = time
                .child_text("beat-type")
                .and_then(|beat_type| beat_type.parse::<u32>().ok());
            if let (Some(beats), Some(beat_type)) = (beats, beat_type) {
                if beats > 0 && beat_type > 0 {
                    meter.beats = beats;
                    meter.beat_type = beat_type;
                }
            }
        }
        meter
    }

    /// Rebuilds an `<attributes>` element in schema order.
    pub fn to_element(&self) -> XmlElement {
        let mut attributes = XmlElement::new("attributes");
        attributes.push(XmlElement::with_text(
            "divisions",
            self.divisions.to_string(),
        ));
        for child in [&self.key, &self.time, &self.staves].into_iter().flatten() {
            attributes.push(child.clone());
        }
        for clef in &self.clefs {
            attributes.push(clef.clone());
        }
        if let Some(transpose) = &self.transpose {
            attributes.push(transpose.clone());
        }
        attributes
    }
}

impl MeasureItem {
    pub fn is_note(&self) -> bool {
        matches!(self.kind, ItemKind::Note { .. })
    }

    fn rest(offset: u32, duration: u32, meter: &Meter, staff: bool) -> Self {
        let mut note = XmlElement::new("note");
        note.push(XmlElement::new("rest"));
        note.push(XmlElement::with_text("duration", duration.to_string()));
        note.push(XmlElement::with_text("voice", "1"));
        if let Some((name, dotted)) = note_type(duration, meter.divisions) {
            note.push(XmlElement::with_text("type", name));
            if dotted {
                note.push(XmlElement::new("dot"));
            }
        }
        if staff {
            note.push(XmlElement::with_text("staff", "1"));
        }

        Self {
            offset,
            kind: ItemKind::Note {
                duration,
                rest: true,
                chord: false,
            },
            element: note,
        }
    }
}

/// Graphic type for a duration, if it is a plain or single-dotted standard value.
fn note_type(duration: u32, divisions: u32) -> Option<(&'static str, bool)> {
    // (name, quarter notes as num/den)
    const TYPES: [(&str, u64, u64); 6] = [
        ("whole", 4, 1),
        ("half", 2, 1),
        ("quarter", 1, 1),
        ("eighth", 1, 2),
        ("16th", 1, 4),
        ("32nd", 1, 8),
    ];
    let (duration, divisions) = (duration as u64, divisions as u64);
    TYPES.iter().find_map(|&(name, num, den)| {
        if duration * den == divisions * num {
            Some((name, false))
        } else if duration * den * 2 == divisions * num * 3 {
            Some((name, true))
        } else {
            None
        }
    })
}

impl Measure {
    fn has_multiple_staves(&self) -> bool {
        self.context.staff_count() > 1
    }

    /// Replaces every note and rest starting before `beats` beats with one rest at offset 0.
    pub fn clear_before(&mut self, beats: u32) {
        let meter = self.meter;
        self.items
            .retain(|item| !(item.is_note() && meter.is_before(item.offset, beats)));

        let duration = meter.beats_to_divisions(beats);
        if duration == 0 {
            return;
        }
        let position = self
            .items
            .iter()
            .take_while(|item| !item.is_note() && item.offset == 0)
            .count();
        let rest = MeasureItem::rest(0, duration, &meter, self.has_multiple_staves());
        self.items.insert(position, rest);
    }

    /// Drops every note and rest starting after `beat - 1` beats and rests from `beat` beats
    /// (or from where the kept notes stop sounding, if later) to the end of the bar.
    pub fn clear_after(&mut self, beat: u32) {
        let meter = self.meter;
        self.items.retain(|item| {
            !(item.is_note() && meter.is_after(item.offset, beat.saturating_sub(1)))
        });

        let sounding = self
            .items
            .iter()
            .filter_map(|item| match item.kind {
                ItemKind::Note { duration, chord: false, .. } => Some(item.offset + duration),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let offset = meter.beats_to_divisions(beat).max(sounding);
        let bar = meter.bar_divisions();
        if bar <= offset {
            return;
        }
        let position = self
            .items
            .iter()
            .rposition(MeasureItem::is_note)
            .map_or(self.items.len(), |index| index + 1);
        let rest = MeasureItem::rest(offset, bar - offset, &meter, self.has_multiple_staves());
        self.items.insert(position, rest);
    }
}

impl Part {
    pub fn measure_mut(&mut self, ordinal: usize) -> Option<&mut Measure> {
        self.measures
            .iter_mut()
            .find(|measure| measure.ordinal == ordinal)
    }
}

impl Score {
    pub fn measure_count(&self) -> usize {
        self.parts
            .iter()
            .map(|part| part.measures.len())
            .max()
            .unwrap_or(0)
    }

    /// Copies the header and measures `start..=end` (ordinals) of every part.
    ///
    /// `end` is clamped to the last measure. When the range does not begin at the first measure,
    /// each part's first copied measure is prefixed with the attributes in force at that point.
    pub fn measures(&self, start: usize, end: usize) -> Result<Score, SnippetError> {
        let available = self.measure_count();
        if start == 0 || start > available {
            return Err(SnippetError::MeasureOutOfRange {
                measure: start,
                available,
            });
        }
        let end = end.clamp(start, available);

        let parts = self
            .parts
            .iter()
            .map(|part| {
                let mut measures: Vec<Measure> = part
                    .measures
                    .iter()
                    .filter(|measure| (start..=end).contains(&measure.ordinal))
                    .cloned()
                    .collect();
                if start > 1 {
                    if let Some(first) = measures.first_mut() {
                        let attributes = first.context.to_element();
                        first.items.insert(
                            0,
                            MeasureItem {
                                offset: 0,
                                kind: ItemKind::Other,
                                element: attributes,
                            },
                        );
                    }
                }
                Part {
                    id: part.id.clone(),
                    attributes: part.attributes.clone(),
                    measures,
                }
            })
            .collect();

        Ok(Score {
            attributes: self.attributes.clone(),
            header: self.header.clone(),
            parts,
        })
    }

    pub fn clear_before(&mut self, ordinal: usize, beats: u32) {
        for part in &mut self.parts {
            if let Some(measure) = part.measure_mut(ordinal) {
                measure.clear_before(beats);
            }
        }
    }

    pub fn clear_after(&mut self, ordinal: usize, beat: u32) {
        for part in &mut self.parts {
            if let Some(measure) = part.measure_mut(ordinal) {
                measure.clear_after(beat);
            }
        }
    }
}
