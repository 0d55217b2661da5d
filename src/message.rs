// src/message.rs
//
// Control messages from the outer context to the processor.
//
// Messages are the ONLY way the outer context can mutate engine state.
// They are queued and handled on the audio side, fire-and-forget.

use serde_json::Value;

/// A control message for the processor.
///
/// Messages are:
/// - Immutable once created
/// - Handled asynchronously, one engine call or state change each
/// - Fire-and-forget (no result travels back to the sender)
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Compile a project archive; the resulting status is retained.
    CompileArchive(String),

    /// Compile orchestra source.
    CompileSource(String),

    /// Incrementally evaluate an orchestra snippet.
    Evaluate(String),

    /// Feed text to the score reader.
    ReadScore(String),

    /// Write a numeric control channel.
    SetChannel { name: String, value: f64 },

    /// Write a text control channel.
    SetTextChannel { name: String, value: String },

    /// Prepare the engine on first use and mark playback running.
    Start,

    /// Mark playback stopped. Engine state and buffers are retained.
    Stop,

    /// Alias of `Start`.
    Resume,

    /// Forward a raw option string to the engine.
    SetOption(String),

    /// Reset the engine and discard all derived playback state.
    Reset,

    /// Materialize a byte payload in the engine's virtual filesystem.
    WriteFile { path: String, data: Vec<u8> },
}

/// Error decoding a positional control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The message had no tag element.
    Empty,

    /// The tag names no known message kind.
    UnknownTag(String),

    /// The tag is known but an argument is missing or has the wrong shape.
    BadArgument(&'static str),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Empty => write!(f, "empty control message"),
            ProtocolError::UnknownTag(tag) => write!(f, "unknown control message \"{}\"", tag),
            ProtocolError::BadArgument(tag) => {
                write!(f, "bad arguments for control message \"{}\"", tag)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

fn text_arg(values: &[Value], index: usize, tag: &'static str) -> Result<String, ProtocolError> {
    values
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProtocolError::BadArgument(tag))
}

fn number_arg(values: &[Value], index: usize, tag: &'static str) -> Result<f64, ProtocolError> {
    values
        .get(index)
        .and_then(Value::as_f64)
        .ok_or(ProtocolError::BadArgument(tag))
}

fn bytes_arg(values: &[Value], index: usize, tag: &'static str) -> Result<Vec<u8>, ProtocolError> {
    let array = values
        .get(index)
        .and_then(Value::as_array)
        .ok_or(ProtocolError::BadArgument(tag))?;
    array
        .iter()
        .map(|v| {
            v.as_u64()
                .filter(|&b| b <= u8::MAX as u64)
                .map(|b| b as u8)
                .ok_or(ProtocolError::BadArgument(tag))
        })
        .collect()
}

impl Message {
    /// Decode one positional tagged message: `[tag, arg, ...]`.
    ///
    /// Unknown tags come back as [`ProtocolError::UnknownTag`]; the caller
    /// logs and discards them. Decoding never fails the sender.
    pub fn from_values(values: &[Value]) -> Result<Message, ProtocolError> {
        let tag = values
            .first()
            .and_then(Value::as_str)
            .ok_or(ProtocolError::Empty)?;

        match tag {
            "compile-archive" => Ok(Message::CompileArchive(text_arg(values, 1, "compile-archive")?)),
            "compile-source" => Ok(Message::CompileSource(text_arg(values, 1, "compile-source")?)),
            "evaluate-snippet" => Ok(Message::Evaluate(text_arg(values, 1, "evaluate-snippet")?)),
            "read-score" => Ok(Message::ReadScore(text_arg(values, 1, "read-score")?)),
            "set-numeric-channel" => Ok(Message::SetChannel {
                name: text_arg(values, 1, "set-numeric-channel")?,
                value: number_arg(values, 2, "set-numeric-channel")?,
            }),
            "set-text-channel" => Ok(Message::SetTextChannel {
                name: text_arg(values, 1, "set-text-channel")?,
                value: text_arg(values, 2, "set-text-channel")?,
            }),
            "start" => Ok(Message::Start),
            "stop" => Ok(Message::Stop),
            "resume" => Ok(Message::Resume),
            "set-option" => Ok(Message::SetOption(text_arg(values, 1, "set-option")?)),
            "reset" => Ok(Message::Reset),
            "write-file" => Ok(Message::WriteFile {
                path: text_arg(values, 1, "write-file")?,
                data: bytes_arg(values, 2, "write-file")?,
            }),
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(raw: Value) -> Result<Message, ProtocolError> {
        Message::from_values(raw.as_array().expect("test payload is an array"))
    }

    #[test]
    fn test_decode_text_messages() {
        assert_eq!(
            decode(json!(["compile-archive", "<project/>"])),
            Ok(Message::CompileArchive("<project/>".into()))
        );
        assert_eq!(
            decode(json!(["compile-source", "instr 1"])),
            Ok(Message::CompileSource("instr 1".into()))
        );
        assert_eq!(
            decode(json!(["evaluate-snippet", "a = 1"])),
            Ok(Message::Evaluate("a = 1".into()))
        );
        assert_eq!(
            decode(json!(["read-score", "i1 0 1"])),
            Ok(Message::ReadScore("i1 0 1".into()))
        );
        assert_eq!(
            decode(json!(["set-option", "-m0"])),
            Ok(Message::SetOption("-m0".into()))
        );
    }

    #[test]
    fn test_decode_channel_messages() {
        assert_eq!(
            decode(json!(["set-numeric-channel", "gain", 0.5])),
            Ok(Message::SetChannel {
                name: "gain".into(),
                value: 0.5
            })
        );
        assert_eq!(
            decode(json!(["set-text-channel", "mode", "arp"])),
            Ok(Message::SetTextChannel {
                name: "mode".into(),
                value: "arp".into()
            })
        );
    }

    #[test]
    fn test_decode_transport_messages() {
        assert_eq!(decode(json!(["start"])), Ok(Message::Start));
        assert_eq!(decode(json!(["stop"])), Ok(Message::Stop));
        assert_eq!(decode(json!(["resume"])), Ok(Message::Resume));
        assert_eq!(decode(json!(["reset"])), Ok(Message::Reset));
    }

    #[test]
    fn test_decode_write_file() {
        assert_eq!(
            decode(json!(["write-file", "samples/kick.wav", [82, 73, 70, 70]])),
            Ok(Message::WriteFile {
                path: "samples/kick.wav".into(),
                data: vec![82, 73, 70, 70]
            })
        );
    }

    #[test]
    fn test_unknown_tag_is_reported_not_fatal() {
        assert_eq!(
            decode(json!(["frobnicate", 1, 2])),
            Err(ProtocolError::UnknownTag("frobnicate".into()))
        );
    }

    #[test]
    fn test_missing_and_malformed_arguments() {
        assert_eq!(
            decode(json!(["compile-source"])),
            Err(ProtocolError::BadArgument("compile-source"))
        );
        assert_eq!(
            decode(json!(["set-numeric-channel", "gain", "loud"])),
            Err(ProtocolError::BadArgument("set-numeric-channel"))
        );
        assert_eq!(
            decode(json!(["write-file", "f", [1, 256]])),
            Err(ProtocolError::BadArgument("write-file"))
        );
        assert_eq!(decode(json!([])), Err(ProtocolError::Empty));
        assert_eq!(decode(json!([42])), Err(ProtocolError::Empty));
    }
}
