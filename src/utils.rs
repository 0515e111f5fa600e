//! Internal module providing handy function

use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::BytesRef;

use crate::XlsxError;

macro_rules! from_err {
    ($from:ty, $to:tt, $var:tt) => {
        impl From<$from> for $to {
            fn from(e: $from) -> $to {
                $to::$var(e)
            }
        }
    };
}

/// Appends the text an entity or character reference stands for.
///
/// Unknown named entities are kept verbatim (`&name;`) rather than dropped.
pub(crate) fn unescape_entity_to_buffer(
    entity: &BytesRef<'_>,
    buf: &mut String,
) -> Result<(), XlsxError> {
    if let Some(c) = entity.resolve_char_ref()? {
        buf.push(c);
        return Ok(());
    }
    let name = entity.decode()?;
    match resolve_xml_entity(&name) {
        Some(s) => buf.push_str(s),
        None => {
            buf.push('&');
            buf.push_str(&name);
            buf.push(';');
        }
    }
    Ok(())
}
