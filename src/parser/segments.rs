use std::sync::LazyLock;

use regex::{Match, Regex};

use super::labels::LABEL_SHAPE;

static VEHICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bVehicle\s*(\d+)\b").unwrap());
static INJURY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bInjury\s*(\d+)\b").unwrap());
static CARRIER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Motor Carrier Info").unwrap());
static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Summary:").unwrap());
static OFFICER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Officer Name:").unwrap());
static LABEL_AHEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^[ \t]*{LABEL_SHAPE}")).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Vehicle,
    Injury,
    MotorCarrier,
}

/// Something in the text that opens or closes a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Vehicle,
    Injury,
    CarrierHeading,
    Summary,
    OfficerName,
}

impl Marker {
    fn regex(self) -> &'static Regex {
        match self {
            Marker::Vehicle => &*VEHICLE_RE,
            Marker::Injury => &*INJURY_RE,
            Marker::CarrierHeading => &*CARRIER_RE,
            Marker::Summary => &*SUMMARY_RE,
            Marker::OfficerName => &*OFFICER_RE,
        }
    }

    /// Numbered markers only count in heading position, so "Vehicle 2" in
    /// the middle of a narrative does not open a block.
    fn is_numbered(self) -> bool {
        matches!(self, Marker::Vehicle | Marker::Injury)
    }

    /// First occurrence at or after `from`.
    fn find_from(self, text: &str, from: usize) -> Option<Match<'_>> {
        let mut pos = from;
        while let Some(m) = self.regex().find_at(text, pos) {
            if !self.is_numbered() || is_heading(text, &m) {
                return Some(m);
            }
            pos = m.end();
        }
        None
    }
}

impl RecordKind {
    fn opener(self) -> Marker {
        match self {
            RecordKind::Vehicle => Marker::Vehicle,
            RecordKind::Injury => Marker::Injury,
            RecordKind::MotorCarrier => Marker::CarrierHeading,
        }
    }

    /// Markers that close a block of this kind. The kind's own opener is
    /// always among them.
    fn terminators(self) -> &'static [Marker] {
        match self {
            RecordKind::Vehicle => &[
                Marker::Vehicle,
                Marker::Injury,
                Marker::CarrierHeading,
                Marker::Summary,
            ],
            RecordKind::Injury => &[
                Marker::Injury,
                Marker::CarrierHeading,
                Marker::Summary,
                Marker::OfficerName,
            ],
            RecordKind::MotorCarrier => &[Marker::CarrierHeading, Marker::Summary],
        }
    }
}

/// One sub-record's slice of the report text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    /// The number from the block's own marker. `None` for motor-carrier
    /// blocks, which are not numbered.
    pub index: Option<u32>,
    pub text: &'a str,
}

/// Split `text` into the blocks of one record kind, in source order.
///
/// A numbered block starts at its `Vehicle N` / `Injury N` marker and runs
/// to the nearest terminator for that kind, or the end of the text. A
/// motor-carrier block starts after its `Motor Carrier Info` heading.
///
/// Numbered blocks keep their indices unique: a marker repeating the
/// index of the block right before it (`Injury 2` then `Injury 2 Type:`)
/// extends that block, and any other repeat is dropped. Numbered markers
/// at or after `Summary:` belong to the narrative and are ignored, as are
/// markers whose number does not fit a `u32`.
pub fn segment(text: &str, kind: RecordKind) -> Vec<Segment<'_>> {
    let opener = kind.opener();
    let narrative_start = if opener.is_numbered() {
        SUMMARY_RE.find(text).map_or(text.len(), |m| m.start())
    } else {
        text.len()
    };
    // (index, start, end) byte spans, trimmed into segments at the end.
    let mut spans: Vec<(Option<u32>, usize, usize)> = Vec::new();

    for caps in opener.regex().captures_iter(text) {
        let Some(marker) = caps.get(0) else { continue };
        if marker.start() >= narrative_start {
            break;
        }

        let (index, start) = if opener.is_numbered() {
            if !is_heading(text, &marker) {
                continue;
            }
            match caps.get(1).and_then(|n| n.as_str().parse::<u32>().ok()) {
                Some(n) => (Some(n), marker.start()),
                None => continue,
            }
        } else {
            (None, marker.end())
        };

        let end = block_end(text, marker.end(), kind);

        if index.is_some() {
            if let Some(last) = spans.last_mut() {
                if last.0 == index && last.2 == marker.start() {
                    last.2 = end;
                    continue;
                }
            }
            if spans.iter().any(|s| s.0 == index) {
                continue;
            }
        }
        spans.push((index, start, end));
    }

    spans
        .into_iter()
        .map(|(index, start, end)| Segment {
            index,
            text: text[start..end].trim(),
        })
        .collect()
}

/// Offset of the first terminator at or after `from`.
fn block_end(text: &str, from: usize, kind: RecordKind) -> usize {
    kind.terminators()
        .iter()
        .filter_map(|t| t.find_from(text, from).map(|m| m.start()))
        .min()
        .unwrap_or(text.len())
}

/// A marker is in heading position when it starts a line (or follows a
/// double-space field break) and is followed by a line end, another
/// double-space break, or a label.
fn is_heading(text: &str, m: &Match<'_>) -> bool {
    let before = &text[..m.start()];
    let opens = before.trim_end_matches([' ', '\t']).is_empty()
        || before.trim_end_matches([' ', '\t']).ends_with('\n')
        || before.ends_with("  ");

    let after = &text[m.end()..];
    let line_rest = after.split('\n').next().unwrap_or("");
    let closes = line_rest.trim().is_empty()
        || after.starts_with("  ")
        || LABEL_AHEAD_RE.is_match(after);

    opens && closes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(segments: &[Segment]) -> Vec<Option<u32>> {
        segments.iter().map(|s| s.index).collect()
    }

    #[test]
    fn vehicles_in_source_order() {
        let text = "Vehicle 1\nYear: 2019\nVehicle 3\nYear: 2008\nVehicle 2\nYear: 2015";
        let segs = segment(text, RecordKind::Vehicle);
        assert_eq!(indices(&segs), vec![Some(1), Some(3), Some(2)]);
        assert_eq!(segs[1].text, "Vehicle 3\nYear: 2008");
    }

    #[test]
    fn vehicle_block_stops_at_injury_section() {
        let text = "Vehicle 1  Make: Ford  Injury 1  Type: Injured";
        let segs = segment(text, RecordKind::Vehicle);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "Vehicle 1  Make: Ford");
    }

    #[test]
    fn vehicle_block_stops_at_carrier_and_summary() {
        let text = "Vehicle 1 Make: Volvo\nMotor Carrier Info\nName of Carrier: ACME";
        assert_eq!(segment(text, RecordKind::Vehicle)[0].text, "Vehicle 1 Make: Volvo");

        let text = "Vehicle 1 Make: Volvo\nSummary: jackknifed";
        assert_eq!(segment(text, RecordKind::Vehicle)[0].text, "Vehicle 1 Make: Volvo");
    }

    #[test]
    fn injury_block_stops_at_officer_name() {
        let text = "Injury 1 Type: Injured\nOfficer Name: Smith";
        let segs = segment(text, RecordKind::Injury);
        assert_eq!(segs[0].text, "Injury 1 Type: Injured");
    }

    #[test]
    fn injury_block_keeps_own_type_label() {
        let text = "Injury 2 Type: Fatality  Name: John Roe\nInjury 3 Type: Injured";
        let segs = segment(text, RecordKind::Injury);
        assert_eq!(indices(&segs), vec![Some(2), Some(3)]);
        assert_eq!(segs[0].text, "Injury 2 Type: Fatality  Name: John Roe");
    }

    #[test]
    fn marker_without_space() {
        let segs = segment("Vehicle2 Make: Kia", RecordKind::Vehicle);
        assert_eq!(indices(&segs), vec![Some(2)]);
    }

    #[test]
    fn carrier_block_after_heading() {
        let text = "Vehicle 1\nMotor Carrier Info\nName of Carrier: ACME\nSummary: hit";
        let segs = segment(text, RecordKind::MotorCarrier);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].index, None);
        assert_eq!(segs[0].text, "Name of Carrier: ACME");
    }

    #[test]
    fn repeated_carrier_headings_split() {
        let text = "Motor Carrier Info\nName of Carrier: ACME\nMotor Carrier Info\nName of Carrier: ACME";
        let segs = segment(text, RecordKind::MotorCarrier);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].text, segs[1].text);
    }

    #[test]
    fn no_markers() {
        assert!(segment("County: Polk", RecordKind::Vehicle).is_empty());
        assert!(segment("", RecordKind::MotorCarrier).is_empty());
    }

    #[test]
    fn narrative_mentions_are_not_markers() {
        let text = "Vehicle 1\nMake: Ford\nSummary:\nVehicle 1 was northbound when it struck Vehicle 2 from behind";
        let segs = segment(text, RecordKind::Vehicle);
        assert_eq!(indices(&segs), vec![Some(1)]);
        assert_eq!(segs[0].text, "Vehicle 1\nMake: Ford");
    }

    #[test]
    fn repeated_index_extends_block() {
        let text = "Injury 1\nInjury 1 Type: Injured\nName: Jane Doe\nInjury 2\nInjury 2 Type: Fatality";
        let segs = segment(text, RecordKind::Injury);
        assert_eq!(indices(&segs), vec![Some(1), Some(2)]);
        assert_eq!(segs[0].text, "Injury 1\nInjury 1 Type: Injured\nName: Jane Doe");
        assert_eq!(segs[1].text, "Injury 2\nInjury 2 Type: Fatality");
    }

    #[test]
    fn later_duplicate_index_dropped() {
        let text = "Vehicle 1\nMake: Ford\nVehicle 2\nMake: Kia\nVehicle 1\nMake: Audi";
        let segs = segment(text, RecordKind::Vehicle);
        assert_eq!(indices(&segs), vec![Some(1), Some(2)]);
        assert_eq!(segs[0].text, "Vehicle 1\nMake: Ford");
    }

    #[test]
    fn markers_inside_summary_ignored() {
        let text = "Vehicle 1\nYear: 2019\nMake: Ford\nCase Number: 9\nSummary:\nVehicle 1 driver stated: the light was green\nInjury 1 Type: Injured";
        let segs = segment(text, RecordKind::Vehicle);
        assert_eq!(indices(&segs), vec![Some(1)]);
        assert_eq!(segs[0].text, "Vehicle 1\nYear: 2019\nMake: Ford\nCase Number: 9");
        assert!(segment(text, RecordKind::Injury).is_empty());
    }

    #[test]
    fn heading_position() {
        let text = "Year: 2019  Vehicle 2  Make: Kia";
        let m = VEHICLE_RE.find(text).unwrap();
        assert!(is_heading(text, &m));

        let text = "struck Vehicle 2 from behind";
        let m = VEHICLE_RE.find(text).unwrap();
        assert!(!is_heading(text, &m));

        let text = "Injury 3 Type: Injured";
        let m = INJURY_RE.find(text).unwrap();
        assert!(is_heading(text, &m));
    }

    #[test]
    fn oversized_marker_number_skipped() {
        let segs = segment("Vehicle 99999999999 Make: Kia", RecordKind::Vehicle);
        assert!(segs.is_empty());
    }
}
