//! Reading and writing `score-partwise` MusicXML.

use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::{debug, instrument};

use crate::score::{AttributeContext, ItemKind, Measure, MeasureItem, Part, Score};
use crate::xml::{attributes_of, XmlElement};
use crate::SnippetError;

#[instrument(level = "debug")]
pub fn read_score(path: &Path) -> Result<Score, SnippetError> {
    let text = std::fs::read_to_string(path)?;
    let score = parse_score(&text)?;
    debug!(
        n_parts = score.parts.len(),
        n_measures = score.measure_count(),
        "read score"
    );
    Ok(score)
}

pub fn parse_score(text: &str) -> Result<Score, SnippetError> {
    let mut options = roxmltree::ParsingOptions::default();
    options.allow_dtd = true;
    let doc = roxmltree::Document::parse_with_options(text, options)?;
    let root = doc.root_element();

    match root.tag_name().name() {
        "score-partwise" => {}
        "score-timewise" => {
            return Err(SnippetError::UnsupportedScore(
                "timewise scores are not supported".to_string(),
            ))
        }
        other => {
            return Err(SnippetError::UnsupportedScore(format!(
                "expected score-partwise, found {other}"
            )))
        }
    }

    let mut score = Score {
        attributes: attributes_of(root),
        header: Vec::new(),
        parts: Vec::new(),
    };
    for node in root.children().filter(roxmltree::Node::is_element) {
        if node.tag_name().name() == "part" {
            score.parts.push(parse_part(node)?);
        } else {
            score.header.push(XmlElement::from_node(node));
        }
    }

    Ok(score)
}

fn parse_part(node: roxmltree::Node<'_, '_>) -> Result<Part, SnippetError> {
    let id = node.attribute("id").unwrap_or_default().to_string();
    let attributes = attributes_of(node);

    let mut context = AttributeContext::default();
    let measures = node
        .children()
        .filter(|child| child.is_element() && child.tag_name().name() == "measure")
        .enumerate()
        .map(|(index, measure)| parse_measure(measure, &id, index + 1, &mut context))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Part {
        id,
        attributes,
        measures,
    })
}

fn parse_measure(
    node: roxmltree::Node<'_, '_>,
    part_id: &str,
    ordinal: usize,
    context: &mut AttributeContext,
) -> Result<Measure, SnippetError> {
    let opening = context.clone();
    let mut items = Vec::new();
    let mut cursor: u32 = 0;
    let mut chord_offset: u32 = 0;

    for child in node.children().filter(roxmltree::Node::is_element) {
        let element = XmlElement::from_node(child);
        // grace notes carry no duration
        let duration = match element.child_text("duration") {
            Some(text) => text.parse::<u32>().map_err(|_| {
                SnippetError::UnsupportedScore(format!(
                    "part {part_id} measure {ordinal}: bad duration {text:?}"
                ))
            })?,
            None => 0,
        };

        match child.tag_name().name() {
            "backup" => cursor = cursor.saturating_sub(duration),
            "forward" => cursor += duration,
            "note" => {
                let chord = element.has_child("chord");
                let offset = if chord { chord_offset } else { cursor };
                items.push(MeasureItem {
                    offset,
                    kind: ItemKind::Note {
                        duration,
                        rest: element.has_child("rest"),
                        chord,
                    },
                    element,
                });
                if !chord {
                    chord_offset = cursor;
                    cursor += duration;
                }
            }
            _ => {
                if element.name == "attributes" {
                    context.absorb(&element);
                }
                items.push(MeasureItem {
                    offset: cursor,
                    kind: ItemKind::Other,
                    element,
                });
            }
        }
    }

    Ok(Measure {
        part_id: part_id.to_string(),
        ordinal,
        attributes: attributes_of(node),
        context: opening,
        meter: context.meter(),
        items,
    })
}

#[instrument(skip(score), level = "debug")]
pub fn write_score(score: &Score, path: &Path) -> Result<(), SnippetError> {
    let xml = to_musicxml(score)?;
    std::fs::write(path, xml)?;
    Ok(())
}

pub fn to_musicxml(score: &Score) -> Result<String, SnippetError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    let version = score
        .attributes
        .iter()
        .find(|(key, _)| key == "version")
        .map_or("4.0", |(_, value)| value.as_str());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))?;
    writer.write_event(Event::DocType(BytesText::from_escaped(format!(
        r#"score-partwise PUBLIC "-//Recordare//DTD MusicXML {version} Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd""#
    ))))?;

    writer.write_event(Event::Start(start_tag("score-partwise", &score.attributes)))?;
    for element in &score.header {
        element.write(&mut writer)?;
    }
    for part in &score.parts {
        writer.write_event(Event::Start(start_tag("part", &part.attributes)))?;
        for measure in &part.measures {
            write_measure(measure, &mut writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new("part")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("score-partwise")))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn start_tag<'a>(name: &'a str, attributes: &'a [(String, String)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for (key, value) in attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    start
}

/// Writes items in order, regenerating `<backup>`/`<forward>` wherever an item's offset is not
/// where the previous one left the cursor. Chord members share their head's position.
fn write_measure(
    measure: &Measure,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(start_tag("measure", &measure.attributes)))?;

    let mut cursor: u32 = 0;
    for item in &measure.items {
        if let ItemKind::Note { chord: true, .. } = item.kind {
            item.element.write(writer)?;
            continue;
        }

        if item.offset > cursor {
            cursor_move("forward", item.offset - cursor).write(writer)?;
        } else if item.offset < cursor {
            cursor_move("backup", cursor - item.offset).write(writer)?;
        }
        cursor = item.offset;
        item.element.write(writer)?;
        if let ItemKind::Note { duration, .. } = item.kind {
            cursor += duration;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("measure")))
}

fn cursor_move(name: &str, duration: u32) -> XmlElement {
    let mut element = XmlElement::new(name);
    element.push(XmlElement::with_text("duration", duration.to_string()));
    element
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_VOICES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">
<score-partwise version="3.1">
  <work><work-title>Etude</work-title></work>
  <part-list>
    <score-part id="P1"><part-name>Piano</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>2</divisions>
        <key><fifths>0</fifths></key>
        <time><beats>2</beats><beat-type>4</beat-type></time>
        <clef><sign>G</sign><line>2</line></clef>
      </attributes>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><chord/><pitch><step>E</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><pitch><step>D</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <backup><duration>4</duration></backup>
      <note><rest/><duration>1</duration><voice>2</voice></note>
      <forward><duration>1</duration></forward>
      <note><pitch><step>G</step><octave>3</octave></pitch><duration>2</duration><voice>2</voice></note>
    </measure>
    <measure number="2">
      <note><pitch><step>F</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice></note>
      <barline location="right"><bar-style>light-heavy</bar-style></barline>
    </measure>
  </part>
</score-partwise>
"#;

    fn note_offsets(measure: &Measure) -> Vec<u32> {
        measure
            .items
            .iter()
            .filter(|item| item.is_note())
            .map(|item| item.offset)
            .collect()
    }

    #[test]
    fn parses_offsets_through_chords_backup_and_forward() {
        let score = parse_score(TWO_VOICES).unwrap();
        assert_eq!(score.parts.len(), 1);
        assert_eq!(score.header.len(), 2);

        let measures = &score.parts[0].measures;
        assert_eq!(measures.len(), 2);
        assert_eq!(note_offsets(&measures[0]), vec![0, 0, 2, 0, 2]);
        assert_eq!(measures[0].meter.divisions, 2);
        assert_eq!(measures[0].meter.beats, 2);
        assert_eq!(measures[1].ordinal, 2);
        assert_eq!(measures[1].part_id, "P1");
        assert_eq!(measures[1].context.divisions, 2);
        assert_eq!(measures[1].items[1].offset, 4);
    }

    #[test]
    fn round_trip_preserves_structure() {
        let score = parse_score(TWO_VOICES).unwrap();
        let xml = to_musicxml(&score).unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("DTD MusicXML 3.1 Partwise"));
        assert!(xml.contains("<work-title>Etude</work-title>"));
        assert!(xml.contains("<chord/>"));

        let reparsed = parse_score(&xml).unwrap();
        assert_eq!(reparsed, score);
    }

    #[test]
    fn cut_through_a_long_note_needs_no_backup() {
        let xml = r#"<score-partwise version="4.0"><part-list><score-part id="P1"/></part-list><part id="P1">
  <measure number="1">
    <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
    <note><pitch><step>C</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
    <note><pitch><step>D</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
  </measure>
</part></score-partwise>"#;
        let mut score = parse_score(xml).unwrap();
        score.clear_after(1, 1);

        let out = to_musicxml(&score).unwrap();
        assert!(!out.contains("<backup>"));
        assert!(!out.contains("<step>D</step>"));
        assert!(out.contains("<rest/>"));
    }

    #[test]
    fn unreadable_duration_fails_instead_of_shifting_offsets() {
        let xml = TWO_VOICES.replace("<backup><duration>4</duration>", "<backup><duration>4.0</duration>");
        match parse_score(&xml) {
            Err(SnippetError::UnsupportedScore(reason)) => {
                assert!(reason.contains("measure 1"), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_other_documents() {
        assert!(matches!(
            parse_score("<score-timewise/>"),
            Err(SnippetError::UnsupportedScore(_))
        ));
        assert!(matches!(
            parse_score("<html/>"),
            Err(SnippetError::UnsupportedScore(_))
        ));
        assert!(matches!(parse_score("<score-partwise>"), Err(SnippetError::Xml(_))));
    }

    #[test]
    fn writes_and_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("score.musicxml");

        let score = parse_score(TWO_VOICES).unwrap();
        write_score(&score, &path).unwrap();
        assert_eq!(read_score(&path).unwrap(), score);
    }
}
