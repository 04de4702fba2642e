//! Event types crossing the workbench's two boundaries
//!
//! `TranslationStreamEvent` is the tagged union the translation backend pushes
//! over the event stream. `JobUpdate` is what the workbench emits to whatever
//! renders progress (terminal printer, status bar, ...).

use serde::{Deserialize, Serialize};

use super::job::{TranslationProgress, TranslationResult};

/// One server-pushed event on the translation stream.
///
/// Tags and payload fields follow the backend's wire contract; unrecognized
/// tags are skipped by the decoder for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranslationStreamEvent {
    /// First event of a job, announces the total block count
    Start { total: u32 },
    /// One translated block, delivered in reassembly order
    Progress { block: String, current: u32 },
    /// All blocks sent; the syntax check result follows on the same stream
    Complete,
    /// Syntax check finished, the job is done
    Syntax { message: String },
}

/// Update pushed to progress observers over the broadcast channel
#[derive(Debug, Clone, Serialize)]
pub enum JobUpdate {
    /// Human-readable status line, one per transition
    Log(String),
    /// State snapshot for progress rendering
    Progress(TranslationProgress),
    /// Final assembled text plus the derived result file name
    Completed(TranslationResult),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_events_deserialize_from_tagged_json() {
        let start: TranslationStreamEvent =
            serde_json::from_str(r#"{"type":"start","total":3}"#).unwrap();
        assert_eq!(start, TranslationStreamEvent::Start { total: 3 });

        let progress: TranslationStreamEvent =
            serde_json::from_str(r#"{"type":"progress","block":"print(1)","current":1}"#).unwrap();
        assert_eq!(
            progress,
            TranslationStreamEvent::Progress { block: "print(1)".to_string(), current: 1 }
        );

        let complete: TranslationStreamEvent =
            serde_json::from_str(r#"{"type":"complete"}"#).unwrap();
        assert_eq!(complete, TranslationStreamEvent::Complete);

        let syntax: TranslationStreamEvent =
            serde_json::from_str(r#"{"type":"syntax","message":"ok"}"#).unwrap();
        assert_eq!(syntax, TranslationStreamEvent::Syntax { message: "ok".to_string() });
    }

    #[test]
    fn unknown_tag_is_a_deserialize_error() {
        let parsed = serde_json::from_str::<TranslationStreamEvent>(r#"{"type":"heartbeat"}"#);
        assert!(parsed.is_err());
    }
}
