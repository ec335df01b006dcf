//! Normalization and parsing of DSML batch responses

use crate::attributes::RawRecord;
use crate::error::HpdError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const BATCH_OPEN: &str = "<batchResponse";
const BATCH_CLOSE: &str = "</batchResponse>";

/// Entries returned by one search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub records: Vec<RawRecord>,
}

/// Rewrite vendor variations into the canonical form the parser expects.
///
/// Each step is idempotent, so normalizing twice yields the same text.
pub fn normalize(raw: &str) -> String {
    // Attribute element spellings.
    let text = raw
        .replace("<dsml:attribute", "<attr")
        .replace("</dsml:attribute", "</attr")
        .replace("<attribute", "<attr")
        .replace("</attribute", "</attr");

    // Namespace prefix.
    let text = text.replace("<dsml:", "<").replace("</dsml:", "</");

    // Outer SOAP envelope.
    let lower = text.to_ascii_lowercase();
    let wrapped = lower.contains("<soap-env") || lower.contains("soap-envelope") || lower.contains(":envelope");
    if wrapped {
        if let (Some(start), Some(end)) = (text.find(BATCH_OPEN), text.rfind(BATCH_CLOSE)) {
            if start > 0 && end > start {
                return text[start..end + BATCH_CLOSE.len()].to_string();
            }
        }
    }
    text
}

fn parse_error(err: impl std::fmt::Display) -> HpdError {
    HpdError::ResponseParse(err.to_string())
}

fn attribute(element: &BytesStart, key: &[u8]) -> Result<Option<String>, HpdError> {
    for attr in element.attributes() {
        let attr = attr.map_err(parse_error)?;
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(parse_error)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn error_for_type(error_type: &str) -> HpdError {
    if error_type.eq_ignore_ascii_case("malformedRequest") {
        HpdError::MalformedRequest
    } else {
        HpdError::UnexpectedErrorType(error_type.to_string())
    }
}

/// Parse normalized response text
pub fn parse_batch_response(text: &str) -> Result<BatchResponse, HpdError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<RawRecord> = None;
    let mut attr_name: Option<String> = None;
    let mut values: Vec<String> = Vec::new();
    let mut value: Option<String> = None;
    let mut error_type: Option<String> = None;
    let mut saw_batch = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"batchResponse" => saw_batch = true,
                b"searchResultEntry" => {
                    let dn = attribute(&e, b"dn")?.unwrap_or_default();
                    current = Some(RawRecord::new(dn));
                }
                b"attr" | b"attribute" => {
                    attr_name = attribute(&e, b"name")?;
                    values.clear();
                }
                b"value" => value = Some(String::new()),
                b"errorResponse" => {
                    error_type.get_or_insert(attribute(&e, b"type")?.unwrap_or_default());
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"batchResponse" => saw_batch = true,
                b"searchResultEntry" => {
                    let dn = attribute(&e, b"dn")?.unwrap_or_default();
                    records.push(RawRecord::new(dn));
                }
                b"errorResponse" => {
                    error_type.get_or_insert(attribute(&e, b"type")?.unwrap_or_default());
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some(buf) = value.as_mut() {
                    buf.push_str(&t.unescape().map_err(parse_error)?);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(buf) = value.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"value" => {
                    if let Some(v) = value.take() {
                        values.push(v);
                    }
                }
                b"attr" | b"attribute" => {
                    if let (Some(record), Some(name)) = (current.as_mut(), attr_name.take()) {
                        record.attributes.insert(&name, values.drain(..));
                    }
                }
                b"searchResultEntry" => {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(HpdError::ResponseParse(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    if let Some(error_type) = error_type {
        return Err(error_for_type(&error_type));
    }
    if !saw_batch {
        return Err(HpdError::ResponseParse("response has no batchResponse element".to_string()));
    }

    Ok(BatchResponse { records })
}

/// Normalize then parse a raw response body
pub fn decode(raw: &str) -> Result<BatchResponse, HpdError> {
    parse_batch_response(&normalize(raw))
}
