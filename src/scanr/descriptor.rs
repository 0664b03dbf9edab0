//! Experiment descriptor parsing.
//!
//! The ScanR descriptor is a flat list of `<Name>key</Name>` / `<Val>value</Val>`
//! pairs nested in arbitrary container elements. Parsing happens in two steps:
//!
//! 1. [`tokenize`] flattens the document into [`DescriptorEvent`]s.
//! 2. [`DescriptorParser`] folds those events into a [`DescriptorAccumulator`].
//!
//! The fold is a two-state machine (awaiting key / awaiting value) driven by
//! the most recent tag name, so it can be tested without any XML at all.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::error::FormatError;

/// Encoding declaration prepended to every descriptor before parsing.
///
/// Some ScanR versions write Latin-1 text without declaring it.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>";

// Recognized keys
const KEY_FIELD_COLUMNS: &str = "columns/well";
const KEY_FIELD_ROWS: &str = "rows/well";
const KEY_SLICES: &str = "# slices";
const KEY_TIMEPOINTS: &str = "timeloop real";
const KEY_CHANNEL_NAME: &str = "name";
const KEY_PLATE_NAME: &str = "plate name";
const KEY_IDLE: &str = "idle";
const KEY_WELL_SELECTION: &str = "well selection table + cDNA";

/// Channel name ScanR records for its autofocus pass
const AUTOFOCUS_CHANNEL: &str = "Autofocus";

const TAG_NAME: &str = "Name";
const TAG_VALUE: &str = "Val";

// =============================================================================
// Events
// =============================================================================

/// One flattened descriptor event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorEvent {
    /// An element started (or an empty element was seen)
    Tag(String),
    /// Non-empty text inside the current element, trimmed
    Text(String),
}

/// Decode descriptor bytes and normalize the XML prolog.
///
/// Valid UTF-8 is kept as is; anything else is read as Latin-1. Any existing
/// `<?...?>` prolog is replaced by [`XML_DECLARATION`].
pub fn prepare_document(raw: &[u8]) -> String {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => raw.iter().map(|&b| char::from(b)).collect(),
    };

    let trimmed = text.trim();
    let body = match trimmed.strip_prefix("<?") {
        Some(rest) => rest.find("?>").map_or(trimmed, |end| &rest[end + 2..]),
        None => trimmed,
    };
    format!("{}{}", XML_DECLARATION, body)
}

/// Flatten an XML document into tag and text events.
pub fn tokenize(xml: &str) -> Result<Vec<DescriptorEvent>, FormatError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut events = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                events.push(DescriptorEvent::Tag(name));
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| FormatError::Xml(err.to_string()))?;
                let text = text.trim();
                if !text.is_empty() {
                    events.push(DescriptorEvent::Text(text.to_string()));
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).trim().to_string();
                if !text.is_empty() {
                    events.push(DescriptorEvent::Text(text));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FormatError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(events)
}

// =============================================================================
// WellLabels
// =============================================================================

/// Well label to well index table, in first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WellLabels {
    entries: Vec<(String, u32)>,
}

impl WellLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `label`. A replaced label keeps its position.
    pub fn insert(&mut self, label: impl Into<String>, index: u32) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = index,
            None => self.entries.push((label, index)),
        }
    }

    pub fn remove(&mut self, label: &str) -> Option<u32> {
        let pos = self.entries.iter().position(|(l, _)| l == label)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn get(&self, label: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, index)| *index)
    }

    /// Entry at insertion position `slot`.
    pub fn get_slot(&self, slot: usize) -> Option<(&str, u32)> {
        self.entries
            .get(slot)
            .map(|(label, index)| (label.as_str(), *index))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.iter().any(|(l, _)| l == label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(label, index)| (label.as_str(), *index))
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for WellLabels {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        let mut labels = WellLabels::new();
        for (label, index) in iter {
            labels.insert(label, index);
        }
        labels
    }
}

// =============================================================================
// DescriptorAccumulator
// =============================================================================

/// Everything the descriptor says about the dataset.
///
/// Counts left at 0 were not stated and get defaulted later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorAccumulator {
    /// Field grid within one well
    pub field_rows: u32,
    pub field_columns: u32,
    pub size_z: u32,
    pub size_t: u32,
    /// Number of active (non-idle) channels
    pub size_c: u32,
    pub channel_names: Vec<String>,
    pub well_labels: WellLabels,
    /// Number of numeric well selections seen
    pub well_count: u32,
    pub plate_name: Option<String>,
    /// Every key/value pair in document order
    pub pairs: Vec<(String, String)>,
}

// =============================================================================
// DescriptorParser
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum FoldState {
    AwaitingKey,
    /// A key was read; every following `Val` text applies to it
    AwaitingValue(String),
}

/// Folds descriptor events into a [`DescriptorAccumulator`].
#[derive(Debug)]
pub struct DescriptorParser {
    acc: DescriptorAccumulator,
    current_tag: Option<String>,
    state: FoldState,
    /// Last numeric well selection, waiting for its label
    pending_well_index: Option<String>,
}

impl Default for DescriptorParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorParser {
    pub fn new() -> Self {
        Self {
            acc: DescriptorAccumulator::default(),
            current_tag: None,
            state: FoldState::AwaitingKey,
            pending_well_index: None,
        }
    }

    /// Feed one event.
    pub fn feed(&mut self, event: DescriptorEvent) -> Result<(), FormatError> {
        match event {
            DescriptorEvent::Tag(name) => {
                self.current_tag = Some(name);
                Ok(())
            }
            DescriptorEvent::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(());
                }
                let tag = self.current_tag.as_deref();
                if tag == Some(TAG_NAME) {
                    self.state = FoldState::AwaitingValue(text.to_string());
                    return Ok(());
                }
                if tag != Some(TAG_VALUE) {
                    return Ok(());
                }

                let key = match &self.state {
                    FoldState::AwaitingValue(key) => key.clone(),
                    FoldState::AwaitingKey => {
                        debug!(value = text, "Descriptor value without a key");
                        return Ok(());
                    }
                };
                self.apply(&key, text)
            }
        }
    }

    /// Apply one key/value pair to the accumulator.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), FormatError> {
        let acc = &mut self.acc;
        acc.pairs.push((key.to_string(), value.to_string()));

        match key {
            KEY_FIELD_COLUMNS => acc.field_columns = parse_count(key, value)?,
            KEY_FIELD_ROWS => acc.field_rows = parse_count(key, value)?,
            KEY_SLICES => acc.size_z = parse_count(key, value)?,
            KEY_TIMEPOINTS => acc.size_t = parse_count(key, value)?,
            KEY_CHANNEL_NAME => acc.channel_names.push(value.to_string()),
            KEY_PLATE_NAME => acc.plate_name = Some(value.to_string()),
            KEY_IDLE => {
                let active = acc
                    .channel_names
                    .last()
                    .map(|last| value == "0" && last != AUTOFOCUS_CHANNEL);
                match active {
                    Some(true) => acc.size_c += 1,
                    Some(false) => {
                        acc.channel_names.pop();
                    }
                    None => warn!(value, "Idle flag with no channel recorded, ignoring"),
                }
            }
            KEY_WELL_SELECTION => {
                if value.starts_with(|c: char| c.is_ascii_digit()) {
                    self.pending_well_index = Some(value.to_string());
                    acc.well_count += 1;
                } else {
                    match self.pending_well_index.as_deref() {
                        Some(index) => {
                            let index = parse_count(key, index)?;
                            acc.well_labels.insert(value, index);
                        }
                        None => warn!(label = value, "Well label with no preceding index, ignoring"),
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Finish folding and return the accumulator.
    pub fn finish(self) -> DescriptorAccumulator {
        let acc = self.acc;
        debug!(
            pairs = acc.pairs.len(),
            channels = acc.channel_names.len(),
            size_c = acc.size_c,
            wells = acc.well_count,
            labels = acc.well_labels.len(),
            field_rows = acc.field_rows,
            field_columns = acc.field_columns,
            "Folded experiment descriptor"
        );
        acc
    }
}

fn parse_count(key: &str, value: &str) -> Result<u32, FormatError> {
    value.trim().parse().map_err(|_| FormatError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Fold an event sequence.
pub fn parse_events<I>(events: I) -> Result<DescriptorAccumulator, FormatError>
where
    I: IntoIterator<Item = DescriptorEvent>,
{
    let mut parser = DescriptorParser::new();
    for event in events {
        parser.feed(event)?;
    }
    Ok(parser.finish())
}

/// Parse raw descriptor bytes.
pub fn parse_document(raw: &[u8]) -> Result<DescriptorAccumulator, FormatError> {
    let xml = prepare_document(raw);
    parse_events(tokenize(&xml)?)
}

// =============================================================================
// Tests
// =============================================================================
