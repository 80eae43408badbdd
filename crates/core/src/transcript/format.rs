//! The plain-text transcript format.
//!
//! A transcript is a sequence of blocks, each laid out as
//!
//! ```text
//! ================================================================================
//! <title>
//! ================================================================================
//! <body>
//!
//! ```
//!
//! The first block is the conversation header, turns follow, and a
//! compressed or terminated footer may close the file.
//!
//! Body lines never start with `=`: a body line starting with `=` or with
//! the escape character `\` is written with one extra leading `\`, which
//! the parser strips. Agent text can therefore never forge a block.

use chrono::{DateTime, SecondsFormat, Utc};
use dk_protocol::conversation_models::{
    Conversation, ConversationStatus, StopReason, Turn, TurnOrigin,
};
use thiserror::Error;
use uuid::Uuid;

/// Fixed-width rule line framing every block title.
pub const RULE: &str =
    "================================================================================";

/// Speaker id recorded for operator feedback.
pub const USER_SPEAKER: &str = "user";

/// Label user turns are written under.
pub const FEEDBACK_LABEL: &str = "User Feedback";

const ESCAPE: char = '\\';

const SUMMARY_SUFFIX: &str = " (Compressed Summary)";

const HEADER_TITLE: &str = "Conversation ";
const ROUND_TITLE: &str = "Round ";
const COMPRESSED_TITLE: &str = "Conversation Compressed";
const TERMINATED_TITLE: &str = "Conversation Terminated";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("transcript does not start with a conversation header")]
    MissingHeader,

    #[error("unrecognized block title '{0}'")]
    UnknownTitle(String),

    #[error("invalid {field} value '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("block '{0}' follows a closing footer")]
    BlockAfterFooter(String),

    #[error("invalid UTF-8 at byte {0}")]
    InvalidUtf8(usize),
}

/// One block of a transcript file.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Header {
        id: Uuid,
        parent: Option<Uuid>,
        started: DateTime<Utc>,
        topic: String,
    },
    Turn {
        round: u32,
        label: String,
        content: String,
    },
    Compressed {
        child: Uuid,
        at: DateTime<Utc>,
    },
    Terminated {
        reason: StopReason,
        rounds: u32,
        at: DateTime<Utc>,
    },
}

impl Block {
    pub fn header(conversation: &Conversation) -> Self {
        Self::Header {
            id: conversation.id,
            parent: conversation.parent_id,
            started: conversation.started_at,
            topic: conversation.topic.clone(),
        }
    }

    pub fn turn(turn: &Turn) -> Self {
        Self::Turn {
            round: turn.round,
            label: turn_label(turn),
            content: turn.content.clone(),
        }
    }

    fn title(&self) -> String {
        match self {
            Self::Header { id, .. } => format!("{HEADER_TITLE}{id}"),
            Self::Turn { round, label, .. } => format!("{ROUND_TITLE}{round} - {label}"),
            Self::Compressed { .. } => COMPRESSED_TITLE.to_string(),
            Self::Terminated { .. } => TERMINATED_TITLE.to_string(),
        }
    }

    fn body(&self) -> String {
        match self {
            Self::Header {
                parent,
                started,
                topic,
                ..
            } => format!(
                "Parent: {}\nStarted: {}\nTopic: {}",
                parent.map_or_else(|| "none".to_string(), |p| p.to_string()),
                timestamp(started),
                topic
            ),
            Self::Turn { content, .. } => content.clone(),
            Self::Compressed { child, at } => {
                format!("Continued In: {}\nAt: {}", child, timestamp(at))
            }
            Self::Terminated { reason, rounds, at } => format!(
                "Stop Reason: {}\nRounds: {}\nAt: {}",
                reason,
                rounds,
                timestamp(at)
            ),
        }
    }

    /// The exact bytes written for this block.
    pub fn render(&self) -> String {
        format!(
            "{RULE}\n{}\n{RULE}\n{}\n\n",
            self.title(),
            escape_body(&self.body())
        )
    }
}

fn escape_body(body: &str) -> String {
    body.split('\n')
        .map(|line| {
            if line.starts_with('=') || line.starts_with(ESCAPE) {
                format!("{ESCAPE}{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_body(body: &str) -> String {
    body.split('\n')
        .map(|line| line.strip_prefix(ESCAPE).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The title label a turn is written under.
pub fn turn_label(turn: &Turn) -> String {
    match turn.origin {
        TurnOrigin::Agent => turn.speaker.clone(),
        TurnOrigin::User => FEEDBACK_LABEL.to_string(),
        TurnOrigin::Compression => format!("{}{SUMMARY_SUFFIX}", turn.speaker),
    }
}

/// Recover speaker id and origin from a title label.
pub fn parse_label(label: &str) -> (String, TurnOrigin) {
    if label == FEEDBACK_LABEL {
        return (USER_SPEAKER.to_string(), TurnOrigin::User);
    }
    match label.strip_suffix(SUMMARY_SUFFIX) {
        Some(speaker) => (speaker.to_string(), TurnOrigin::Compression),
        None => (label.to_string(), TurnOrigin::Agent),
    }
}

/// A transcript read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTranscript {
    pub conversation: Conversation,
    /// Rounds recorded in a terminated footer.
    pub recorded_rounds: Option<u32>,
    /// Byte length of the well-formed prefix.
    pub valid_len: usize,
    /// A partially written final block was dropped.
    pub torn_tail: bool,
    /// Incomplete blocks found before later complete ones and skipped.
    pub skipped_blocks: usize,
}

fn is_title(title: &str) -> bool {
    title == COMPRESSED_TITLE
        || title == TERMINATED_TITLE
        || title.strip_prefix(HEADER_TITLE).is_some_and(|id| Uuid::parse_str(id).is_ok())
        || parse_round_title(title).is_some()
}

fn parse_round_title(title: &str) -> Option<(u32, &str)> {
    let rest = title.strip_prefix(ROUND_TITLE)?;
    let (round, label) = rest.split_once(" - ")?;
    Some((round.parse().ok()?, label))
}

/// If a block starts at `pos`, return its title and where its body begins.
fn block_start(text: &str, pos: usize) -> Option<(&str, usize)> {
    let rest = text.get(pos..)?;
    let after_rule = rest.strip_prefix(RULE)?.strip_prefix('\n')?;
    let (title, after_title) = after_rule.split_once('\n')?;
    let body = after_title.strip_prefix(RULE)?.strip_prefix('\n')?;
    if !is_title(title) {
        return None;
    }
    Some((title, text.len() - body.len()))
}

struct RawBlock<'a> {
    title: &'a str,
    body: &'a str,
}

struct Split<'a> {
    blocks: Vec<RawBlock<'a>>,
    valid_len: usize,
    torn: bool,
    skipped: usize,
}

/// Split `text` into complete blocks.
///
/// `truncated` means `text` is known to stop inside a character, so the
/// final block is incomplete even if it happens to end in a blank line.
fn split_blocks(text: &str, truncated: bool) -> Result<Split<'_>, FormatError> {
    if block_start(text, 0).is_none() {
        return Err(FormatError::MissingHeader);
    }

    // Escaped bodies never hold a rule at line start, so every complete
    // rule-title-rule triple is a real block, even one glued onto the end
    // of a write that was cut short.
    let rule_line = format!("{RULE}\n");
    let starts: Vec<(usize, &str, usize)> = text
        .match_indices(&rule_line)
        .filter_map(|(i, _)| block_start(text, i).map(|(title, body)| (i, title, body)))
        .collect();

    let mut split = Split {
        blocks: Vec::new(),
        valid_len: 0,
        torn: false,
        skipped: 0,
    };

    for (n, &(_, title, body_start)) in starts.iter().enumerate() {
        if let Some(&(end, _, _)) = starts.get(n + 1) {
            match text[body_start..end].strip_suffix("\n\n") {
                Some(body) => {
                    split.blocks.push(RawBlock { title, body });
                    split.valid_len = end;
                }
                None => split.skipped += 1,
            }
            continue;
        }

        let region = &text[body_start..];
        if !truncated {
            if let Some(body) = region.strip_suffix("\n\n") {
                split.blocks.push(RawBlock { title, body });
                split.valid_len = text.len();
                continue;
            }
        }

        // Only the final block can be incomplete. A torn write may also have
        // cut into the next block's rule line.
        split.torn = true;
        if let Some(idx) = region.rfind("\n\n") {
            let tail = &region[idx + 2..];
            if !tail.is_empty() && RULE.starts_with(tail.split('\n').next().unwrap_or("")) {
                split.blocks.push(RawBlock {
                    title,
                    body: &region[..idx],
                });
                split.valid_len = body_start + idx + 2;
            }
        }
    }

    Ok(split)
}

/// The longest UTF-8 prefix of `bytes`, and whether a character was cut
/// off after it. Invalid bytes anywhere else are an error.
fn utf8_prefix(bytes: &[u8]) -> Result<(&str, bool), FormatError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok((text, false)),
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            std::str::from_utf8(&bytes[..valid])
                .map(|text| (text, true))
                .map_err(|_| FormatError::InvalidUtf8(valid))
        }
        Err(e) => Err(FormatError::InvalidUtf8(e.valid_up_to())),
    }
}

fn field<'a>(body: &'a str, name: &'static str) -> Result<&'a str, FormatError> {
    body.lines()
        .find_map(|line| line.strip_prefix(name).and_then(|v| v.strip_prefix(": ")))
        .ok_or(FormatError::MissingField(name))
}

fn parse_time(value: &str, name: &'static str) -> Result<DateTime<Utc>, FormatError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| FormatError::InvalidField {
            field: name,
            value: value.to_string(),
        })
}

fn parse_uuid(value: &str, name: &'static str) -> Result<Uuid, FormatError> {
    Uuid::parse_str(value).map_err(|_| FormatError::InvalidField {
        field: name,
        value: value.to_string(),
    })
}

/// Parse the header block only; used to index transcripts cheaply.
pub fn parse_header(text: &str) -> Result<Block, FormatError> {
    let split = split_blocks(text, false)?;
    let first = split.blocks.first().ok_or(FormatError::MissingHeader)?;
    header_from_raw(first)
}

/// [`parse_header`] over raw file bytes, tolerating a torn final character.
pub fn parse_header_bytes(bytes: &[u8]) -> Result<Block, FormatError> {
    let (text, truncated) = utf8_prefix(bytes)?;
    let split = split_blocks(text, truncated)?;
    let first = split.blocks.first().ok_or(FormatError::MissingHeader)?;
    header_from_raw(first)
}

fn header_from_raw(raw: &RawBlock<'_>) -> Result<Block, FormatError> {
    let id = raw
        .title
        .strip_prefix(HEADER_TITLE)
        .ok_or(FormatError::MissingHeader)?;
    let id = parse_uuid(id, "Conversation")?;

    let parent = match field(raw.body, "Parent")? {
        "none" => None,
        value => Some(parse_uuid(value, "Parent")?),
    };
    let started = parse_time(field(raw.body, "Started")?, "Started")?;

    // the topic runs to the end of the body and may span lines
    let topic = raw
        .body
        .split_once("\nTopic: ")
        .map(|(_, topic)| unescape_body(topic))
        .ok_or(FormatError::MissingField("Topic"))?;

    Ok(Block::Header {
        id,
        parent,
        started,
        topic,
    })
}

/// Parse a whole transcript.
pub fn parse(text: &str) -> Result<ParsedTranscript, FormatError> {
    parse_split(split_blocks(text, false)?)
}

/// Parse raw file bytes. A write cut inside a multi-byte character is
/// treated as a torn final block; `valid_len` never includes the cut bytes.
pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedTranscript, FormatError> {
    let (text, truncated) = utf8_prefix(bytes)?;
    parse_split(split_blocks(text, truncated)?)
}

fn parse_split(split: Split<'_>) -> Result<ParsedTranscript, FormatError> {
    let Split {
        blocks,
        valid_len,
        torn,
        skipped,
    } = split;
    let mut blocks = blocks.into_iter();

    let header = blocks.next().ok_or(FormatError::MissingHeader)?;
    let Block::Header {
        id,
        parent,
        started,
        topic,
    } = header_from_raw(&header)?
    else {
        return Err(FormatError::MissingHeader);
    };

    let mut conversation = Conversation::new(id, topic, parent);
    conversation.started_at = started;
    let mut recorded_rounds = None;

    for raw in blocks {
        if conversation.status != ConversationStatus::Active {
            return Err(FormatError::BlockAfterFooter(raw.title.to_string()));
        }

        if let Some((round, label)) = parse_round_title(raw.title) {
            let (speaker, origin) = parse_label(label);
            conversation.turns.push(Turn {
                index: conversation.next_index(),
                speaker,
                persona: String::new(),
                stance: String::new(),
                content: unescape_body(raw.body),
                round,
                origin,
                timestamp: started,
            });
        } else if raw.title == COMPRESSED_TITLE {
            conversation.child_id = Some(parse_uuid(
                field(raw.body, "Continued In")?,
                "Continued In",
            )?);
            conversation.status = ConversationStatus::Compressed;
        } else if raw.title == TERMINATED_TITLE {
            let label = field(raw.body, "Stop Reason")?;
            let reason = StopReason::parse(label).ok_or_else(|| FormatError::InvalidField {
                field: "Stop Reason",
                value: label.to_string(),
            })?;
            let rounds = field(raw.body, "Rounds")?;
            recorded_rounds = Some(rounds.parse().map_err(|_| FormatError::InvalidField {
                field: "Rounds",
                value: rounds.to_string(),
            })?);
            conversation.stop_reason = Some(reason);
            conversation.status = ConversationStatus::Terminated;
        } else {
            return Err(FormatError::UnknownTitle(raw.title.to_string()));
        }
    }

    Ok(ParsedTranscript {
        conversation,
        recorded_rounds,
        valid_len,
        torn_tail: torn,
        skipped_blocks: skipped,
    })
}
