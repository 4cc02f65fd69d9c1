// Selection criteria and their fixed-layout request encoding.
use crate::core::error::{Error, ErrorKind};
use crate::core::layout::{self, BLANK};
use crate::core::record::field_id;
use crate::core::token::MessageKey;

pub const SELECTION_HEADER_LEN: usize = 44;
pub const KEYWORD_LEN: usize = 10;
pub const MAX_SEVERITY: i32 = 99;

const DIRECTION: usize = 0;
const SEVERITY: usize = 12;
const MAX_MESSAGE_LEN: usize = 16;
const MAX_HELP_LEN: usize = 20;
const FILTER_OFFSET: usize = 24;
const FILTER_COUNT: usize = 28;
const START_KEYS_OFFSET: usize = 32;
const FIELDS_OFFSET: usize = 36;
const FIELDS_COUNT: usize = 40;

const NO_CEILING: i32 = -1;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ListDirection {
    OldestFirst,
    NewestFirst,
}

impl ListDirection {
    pub fn marker(self) -> &'static str {
        match self {
            ListDirection::OldestFirst => "*NEXT",
            ListDirection::NewestFirst => "*PRV",
        }
    }

    pub fn parse_marker(marker: &str) -> Result<Self, Error> {
        match marker {
            "*NEXT" => Ok(ListDirection::OldestFirst),
            "*PRV" => Ok(ListDirection::NewestFirst),
            other => Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("unknown list direction {other:?}"))),
        }
    }

    /// Starting key used when the caller did not pick one.
    pub fn default_start(self) -> MessageKey {
        match self {
            ListDirection::OldestFirst => MessageKey::OLDEST,
            ListDirection::NewestFirst => MessageKey::NEWEST,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HelpFormatting {
    None,
    ReturnFormattingCharacters,
    SubstituteFormattingCharacters,
}

impl HelpFormatting {
    pub fn help_field(self) -> u32 {
        match self {
            HelpFormatting::None => field_id::MESSAGE_HELP,
            HelpFormatting::ReturnFormattingCharacters
            | HelpFormatting::SubstituteFormattingCharacters => field_id::MESSAGE_HELP_FORMATTED,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FilterKeyword {
    All,
    NeedsReply,
    NoReplyNeeded,
    SendersCopyNeedsReply,
}

impl FilterKeyword {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKeyword::All => "*ALL",
            FilterKeyword::NeedsReply => "*MNR",
            FilterKeyword::NoReplyNeeded => "*MNNR",
            FilterKeyword::SendersCopyNeedsReply => "*SCNR",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, Error> {
        match raw {
            "*ALL" => Ok(FilterKeyword::All),
            "*MNR" => Ok(FilterKeyword::NeedsReply),
            "*MNNR" => Ok(FilterKeyword::NoReplyNeeded),
            "*SCNR" => Ok(FilterKeyword::SendersCopyNeedsReply),
            other => Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("unknown selection keyword {other:?}"))),
        }
    }
}

/// What a list of messages should contain and how it should be returned.
///
/// Values are compared as a whole: a session only rebuilds its server-side
/// list when the criteria it is handed actually differ from the current ones.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SelectionCriteria {
    pub severity: i32,
    pub help_formatting: HelpFormatting,
    pub direction: ListDirection,
    pub user_start: Option<MessageKey>,
    pub workstation_start: Option<MessageKey>,
    pub needs_reply: bool,
    pub no_reply_needed: bool,
    pub senders_copy_needs_reply: bool,
    pub max_message_len: Option<u32>,
    pub max_help_len: Option<u32>,
}

impl SelectionCriteria {
    pub fn new() -> Self {
        Self {
            severity: 0,
            help_formatting: HelpFormatting::None,
            direction: ListDirection::OldestFirst,
            user_start: None,
            workstation_start: None,
            needs_reply: true,
            no_reply_needed: true,
            senders_copy_needs_reply: true,
            max_message_len: None,
            max_help_len: None,
        }
    }

    pub fn with_severity(mut self, severity: i32) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_direction(mut self, direction: ListDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_help_formatting(mut self, help_formatting: HelpFormatting) -> Self {
        self.help_formatting = help_formatting;
        self
    }

    pub fn with_inclusion(
        mut self,
        needs_reply: bool,
        no_reply_needed: bool,
        senders_copy_needs_reply: bool,
    ) -> Self {
        self.needs_reply = needs_reply;
        self.no_reply_needed = no_reply_needed;
        self.senders_copy_needs_reply = senders_copy_needs_reply;
        self
    }

    pub fn with_start(mut self, user: Option<MessageKey>, workstation: Option<MessageKey>) -> Self {
        self.user_start = user;
        self.workstation_start = workstation;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(0..=MAX_SEVERITY).contains(&self.severity) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("severity {} is out of range", self.severity))
                .with_hint("Use a severity between 0 and 99."));
        }
        for (name, ceiling) in [
            ("message", self.max_message_len),
            ("help", self.max_help_len),
        ] {
            if ceiling.is_some_and(|value| value > i32::MAX as u32) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("max {name} length does not fit the request field")));
            }
        }
        Ok(())
    }

    /// Composed filter: all or none of the flags means everything.
    pub fn filter(&self) -> Vec<FilterKeyword> {
        let flags = [
            (self.needs_reply, FilterKeyword::NeedsReply),
            (self.no_reply_needed, FilterKeyword::NoReplyNeeded),
            (self.senders_copy_needs_reply, FilterKeyword::SendersCopyNeedsReply),
        ];
        let selected: Vec<_> = flags
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, keyword)| *keyword)
            .collect();
        if selected.is_empty() || selected.len() == flags.len() {
            vec![FilterKeyword::All]
        } else {
            selected
        }
    }

    pub fn requested_fields(&self) -> Vec<u32> {
        vec![
            field_id::REPLACEMENT_DATA,
            field_id::MESSAGE_TEXT,
            self.help_formatting.help_field(),
            field_id::DEFAULT_REPLY,
            field_id::SENDER_JOB,
            field_id::REPLY_STATUS,
        ]
    }
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the host reads back out of an encoded selection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedSelection {
    pub direction: ListDirection,
    pub severity: i32,
    pub max_message_len: Option<u32>,
    pub max_help_len: Option<u32>,
    pub filter: Vec<FilterKeyword>,
    pub user_start: MessageKey,
    pub workstation_start: MessageKey,
    pub field_ids: Vec<u32>,
}

pub fn encode_selection(criteria: &SelectionCriteria) -> Result<Vec<u8>, Error> {
    criteria.validate()?;
    let filter = criteria.filter();
    let fields = criteria.requested_fields();

    let filter_offset = SELECTION_HEADER_LEN;
    let keys_offset = filter_offset + filter.len() * KEYWORD_LEN;
    let fields_offset = keys_offset + 8;
    let total = fields_offset + fields.len() * 4;

    let mut buf = vec![0u8; total];
    layout::write_text(&mut buf, DIRECTION, 10, criteria.direction.marker());
    buf[10] = BLANK;
    buf[11] = BLANK;
    layout::write_i32(&mut buf, SEVERITY, criteria.severity);
    layout::write_i32(&mut buf, MAX_MESSAGE_LEN, ceiling_to_wire(criteria.max_message_len));
    layout::write_i32(&mut buf, MAX_HELP_LEN, ceiling_to_wire(criteria.max_help_len));
    layout::write_u32(&mut buf, FILTER_OFFSET, layout::to_u32(filter_offset)?);
    layout::write_u32(&mut buf, FILTER_COUNT, layout::to_u32(filter.len())?);
    layout::write_u32(&mut buf, START_KEYS_OFFSET, layout::to_u32(keys_offset)?);
    layout::write_u32(&mut buf, FIELDS_OFFSET, layout::to_u32(fields_offset)?);
    layout::write_u32(&mut buf, FIELDS_COUNT, layout::to_u32(fields.len())?);

    for (i, keyword) in filter.iter().enumerate() {
        layout::write_text(&mut buf, filter_offset + i * KEYWORD_LEN, KEYWORD_LEN, keyword.as_str());
    }

    let default_start = criteria.direction.default_start();
    let user = criteria.user_start.unwrap_or(default_start);
    let workstation = criteria.workstation_start.unwrap_or(default_start);
    buf[keys_offset..keys_offset + 4].copy_from_slice(&user.0);
    buf[keys_offset + 4..keys_offset + 8].copy_from_slice(&workstation.0);

    for (i, id) in fields.iter().enumerate() {
        layout::write_u32(&mut buf, fields_offset + i * 4, *id);
    }
    Ok(buf)
}

pub fn decode_filter(buf: &[u8]) -> Result<Vec<FilterKeyword>, Error> {
    let offset = layout::read_offset(buf, FILTER_OFFSET)?;
    let count = layout::read_offset(buf, FILTER_COUNT)?;
    let mut filter = Vec::with_capacity(count.min(4));
    for i in 0..count {
        let at = i
            .checked_mul(KEYWORD_LEN)
            .and_then(|rel| rel.checked_add(offset))
            .ok_or_else(|| Error::new(ErrorKind::Corrupt).with_message("keyword table overflows"))?;
        filter.push(FilterKeyword::parse(&layout::read_text(buf, at, KEYWORD_LEN)?)?);
    }
    Ok(filter)
}

pub fn decode_selection(buf: &[u8]) -> Result<DecodedSelection, Error> {
    if buf.len() < SELECTION_HEADER_LEN {
        return Err(Error::new(ErrorKind::Corrupt).with_message("selection header too small"));
    }
    let direction = ListDirection::parse_marker(&layout::read_text(buf, DIRECTION, 10)?)?;
    let keys_offset = layout::read_offset(buf, START_KEYS_OFFSET)?;
    let fields_offset = layout::read_offset(buf, FIELDS_OFFSET)?;
    let fields_count = layout::read_offset(buf, FIELDS_COUNT)?;
    let mut field_ids = Vec::with_capacity(fields_count.min(64));
    for i in 0..fields_count {
        let at = fields_offset.saturating_add(i.saturating_mul(4));
        field_ids.push(layout::read_u32(buf, at)?);
    }
    Ok(DecodedSelection {
        direction,
        severity: layout::read_i32(buf, SEVERITY)?,
        max_message_len: ceiling_from_wire(layout::read_i32(buf, MAX_MESSAGE_LEN)?),
        max_help_len: ceiling_from_wire(layout::read_i32(buf, MAX_HELP_LEN)?),
        filter: decode_filter(buf)?,
        user_start: MessageKey(layout::read_4(buf, keys_offset)?),
        workstation_start: MessageKey(layout::read_4(buf, keys_offset.saturating_add(4))?),
        field_ids,
    })
}

fn ceiling_to_wire(ceiling: Option<u32>) -> i32 {
    ceiling.map_or(NO_CEILING, |value| value as i32)
}

fn ceiling_from_wire(value: i32) -> Option<u32> {
    u32::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::{
        decode_filter, decode_selection, encode_selection, FilterKeyword, HelpFormatting,
        ListDirection, SelectionCriteria, SELECTION_HEADER_LEN,
    };
    use crate::core::error::ErrorKind;
    use crate::core::record::field_id;
    use crate::core::token::MessageKey;
    use proptest::prelude::*;

    #[test]
    fn all_flags_encode_padded_all_keyword() {
        let criteria = SelectionCriteria::new().with_direction(ListDirection::OldestFirst);
        let buf = encode_selection(&criteria).expect("encode");
        assert_eq!(&buf[0..10], b"*NEXT     ");
        assert_eq!(&buf[SELECTION_HEADER_LEN..SELECTION_HEADER_LEN + 10], b"*ALL      ");
        assert_eq!(decode_filter(&buf).expect("filter"), vec![FilterKeyword::All]);
    }

    #[test]
    fn unset_start_keys_follow_direction() {
        let oldest = decode_selection(&encode_selection(&SelectionCriteria::new()).expect("encode"))
            .expect("decode");
        assert_eq!(oldest.user_start, MessageKey::OLDEST);
        assert_eq!(oldest.workstation_start, MessageKey::OLDEST);

        let criteria = SelectionCriteria::new()
            .with_direction(ListDirection::NewestFirst)
            .with_start(Some(MessageKey::from_u32(9)), None);
        let newest = decode_selection(&encode_selection(&criteria).expect("encode")).expect("decode");
        assert_eq!(newest.direction, ListDirection::NewestFirst);
        assert_eq!(newest.user_start, MessageKey::from_u32(9));
        assert_eq!(newest.workstation_start, MessageKey::NEWEST);
    }

    #[test]
    fn two_flags_enumerate_in_fixed_order() {
        let criteria = SelectionCriteria::new().with_inclusion(false, true, true);
        assert_eq!(
            criteria.filter(),
            vec![FilterKeyword::NoReplyNeeded, FilterKeyword::SendersCopyNeedsReply]
        );
        let buf = encode_selection(&criteria).expect("encode");
        assert_eq!(&buf[SELECTION_HEADER_LEN + 10..SELECTION_HEADER_LEN + 20], b"*SCNR     ");
    }

    #[test]
    fn help_formatting_selects_help_field() {
        let plain = SelectionCriteria::new();
        assert!(plain.requested_fields().contains(&field_id::MESSAGE_HELP));
        let formatted =
            SelectionCriteria::new().with_help_formatting(HelpFormatting::SubstituteFormattingCharacters);
        let decoded = decode_selection(&encode_selection(&formatted).expect("encode")).expect("decode");
        assert!(decoded.field_ids.contains(&field_id::MESSAGE_HELP_FORMATTED));
        assert!(!decoded.field_ids.contains(&field_id::MESSAGE_HELP));
    }

    #[test]
    fn ceilings_default_to_none() {
        let mut criteria = SelectionCriteria::new();
        let decoded = decode_selection(&encode_selection(&criteria).expect("encode")).expect("decode");
        assert_eq!(decoded.max_message_len, None);

        criteria.max_help_len = Some(3000);
        let decoded = decode_selection(&encode_selection(&criteria).expect("encode")).expect("decode");
        assert_eq!(decoded.max_help_len, Some(3000));
    }

    #[test]
    fn out_of_range_severity_is_rejected_before_encoding() {
        for severity in [-1, 100] {
            let err = encode_selection(&SelectionCriteria::new().with_severity(severity))
                .expect_err("range");
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
    }

    #[test]
    fn truncated_selection_is_corrupt() {
        let buf = encode_selection(&SelectionCriteria::new()).expect("encode");
        let err = decode_selection(&buf[..SELECTION_HEADER_LEN + 4]).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    fn criteria_strategy() -> impl Strategy<Value = SelectionCriteria> {
        (
            0i32..=99,
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            proptest::option::of(any::<[u8; 4]>()),
        )
            .prop_map(|(severity, newest, a, b, c, start)| {
                SelectionCriteria::new()
                    .with_severity(severity)
                    .with_direction(if newest {
                        ListDirection::NewestFirst
                    } else {
                        ListDirection::OldestFirst
                    })
                    .with_inclusion(a, b, c)
                    .with_start(start.map(MessageKey), None)
            })
    }

    proptest! {
        #[test]
        fn filter_semantics_survive_encoding(criteria in criteria_strategy()) {
            let buf = encode_selection(&criteria).expect("encode");
            let filter = decode_filter(&buf).expect("filter");
            let flags = [
                criteria.needs_reply,
                criteria.no_reply_needed,
                criteria.senders_copy_needs_reply,
            ];
            let on = flags.iter().filter(|flag| **flag).count();
            if on == 0 || on == 3 {
                prop_assert_eq!(filter, vec![FilterKeyword::All]);
            } else {
                prop_assert_eq!(filter.len(), on);
                prop_assert!(!filter.contains(&FilterKeyword::All));
                prop_assert_eq!(filter.contains(&FilterKeyword::NeedsReply), criteria.needs_reply);
            }
        }

        #[test]
        fn encoding_is_deterministic(criteria in criteria_strategy()) {
            let first = encode_selection(&criteria).expect("encode");
            let second = encode_selection(&criteria.clone()).expect("encode");
            prop_assert_eq!(first, second);
        }

        #[test]
        fn decoded_severity_matches(criteria in criteria_strategy()) {
            let decoded = decode_selection(&encode_selection(&criteria).expect("encode")).expect("decode");
            prop_assert_eq!(decoded.severity, criteria.severity);
            prop_assert_eq!(decoded.direction, criteria.direction);
        }
    }
}
