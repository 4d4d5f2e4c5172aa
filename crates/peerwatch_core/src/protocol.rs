use crate::Message;
use tracing::debug;

/// The node relays transfer progress as ordinary chat messages whose content
/// is `FILE_PROGRESS:<file name>:<percent>`. Everything else is chat.
pub const PROGRESS_TAG: &str = "FILE_PROGRESS:";

/// A progress report before its direction is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub key: String,
    pub percent: f64,
    pub peer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Chat(Message),
    Progress(ProgressUpdate),
    Malformed(Message),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split {
    pub chat: Vec<Message>,
    pub progress: Vec<ProgressUpdate>,
}

pub fn classify(record: Message) -> Inbound {
    let Some(body) = record.content.strip_prefix(PROGRESS_TAG) else {
        return Inbound::Chat(record);
    };

    match parse_progress_body(body) {
        Some((key, percent)) => Inbound::Progress(ProgressUpdate {
            key: key.to_string(),
            percent,
            peer: record.from,
        }),
        None => Inbound::Malformed(record),
    }
}

// The name runs up to the last colon so names containing ':' survive.
fn parse_progress_body(body: &str) -> Option<(&str, f64)> {
    let (key, percent) = body.rsplit_once(':')?;
    if key.is_empty() {
        return None;
    }
    let percent: f64 = percent.trim().parse().ok()?;
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return None;
    }
    Some((key, percent))
}

/// Partition raw records into chat lines and progress reports, preserving
/// order within each. Malformed progress records are dropped.
pub fn split(raw: Vec<Message>) -> Split {
    let mut out = Split::default();
    for record in raw {
        match classify(record) {
            Inbound::Chat(message) => out.chat.push(message),
            Inbound::Progress(update) => out.progress.push(update),
            Inbound::Malformed(record) => {
                debug!(
                    "Dropping malformed progress record from {}: {:?}",
                    record.from, record.content
                );
            }
        }
    }
    out
}

pub fn encode_progress(file_name: &str, percent: f64) -> String {
    format!("{}{}:{}", PROGRESS_TAG, file_name, percent)
}
