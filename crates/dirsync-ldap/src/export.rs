//! Export adapter: the attribute/value view of a record used for text serialization.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::Write;

use crate::record::Record;
use crate::value::{AttributeMap, AttributeValue};
use crate::Result;

/// Comment attached to a record described by its staged additions.
pub const NEW_ITEMS_COMMENT: &str = "All items in this file are new.";

/// Flattened attribute/value pairs describing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportView<'a> {
    /// Set when the pairs come from staged additions rather than the current view.
    pub comment: Option<&'static str>,
    /// Pairs grouped by attribute, attributes in name order, values in insertion order.
    pub pairs: Vec<(&'a str, &'a AttributeValue)>,
}

/// Selects what to export for `record`.
///
/// Normally the current attribute values; a record whose current view is empty but that has
/// staged additions is described by those additions instead, flagged with
/// [`NEW_ITEMS_COMMENT`].
#[must_use]
pub fn export_view(record: &Record) -> ExportView<'_> {
    let staged = record.pending().to_add();
    if record.attributes().is_empty() && !staged.is_empty() {
        ExportView {
            comment: Some(NEW_ITEMS_COMMENT),
            pairs: flatten(staged),
        }
    } else {
        ExportView {
            comment: None,
            pairs: flatten(record.attributes()),
        }
    }
}

/// Writes `record` as an LDIF-style block: the `dn:` line, an optional comment, then one line
/// per value. Unsafe values are base64 encoded with the `::` separator. Lines are not folded.
///
/// # Errors
///
/// Returns [`dirsync_core::Error::Io`] if the writer fails.
pub fn write_ldif<W: Write>(record: &Record, mut out: W) -> Result<()> {
    write_line(&mut out, "dn", record.dn().as_str().as_bytes())?;

    let view = export_view(record);
    if let Some(comment) = view.comment {
        writeln!(out, "# {comment}")?;
    }
    for (attribute, value) in view.pairs {
        write_line(&mut out, attribute, value.as_bytes())?;
    }
    Ok(())
}

/// Renders `record` to a string with [`write_ldif`].
///
/// # Errors
///
/// Never fails in practice; kept fallible to share the writer path.
pub fn to_ldif(record: &Record) -> Result<String> {
    let mut buffer = Vec::new();
    write_ldif(record, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn flatten(map: &AttributeMap) -> Vec<(&str, &AttributeValue)> {
    map.iter()
        .flat_map(|(attribute, values)| values.iter().map(move |value| (attribute.as_str(), value)))
        .collect()
}

fn write_line<W: Write>(out: &mut W, attribute: &str, value: &[u8]) -> Result<()> {
    match std::str::from_utf8(value) {
        Ok(text) if is_safe(text) => writeln!(out, "{attribute}: {text}")?,
        _ => writeln!(out, "{attribute}:: {}", STANDARD.encode(value))?,
    }
    Ok(())
}

/// RFC 2849 SAFE-STRING, relaxed to allow non-ASCII UTF-8.
fn is_safe(text: &str) -> bool {
    let starts_ok = !matches!(text.chars().next(), Some(' ' | ':' | '<'));
    starts_ok && !text.ends_with(' ') && !text.contains(['\r', '\n', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::DistinguishedName;
    use crate::record::RawEntry;

    fn new_record() -> Record {
        Record::new(DistinguishedName::parse("uid=bob,ou=people").unwrap())
    }

    #[test]
    fn current_view_is_exported() {
        let mut attributes = AttributeMap::new();
        attributes.insert(
            "mail".to_string(),
            vec![AttributeValue::from("a@x.com"), AttributeValue::from("a2@x.com")],
        );
        attributes.insert("cn".to_string(), vec![AttributeValue::from("alice")]);
        let record = Record::from_raw(RawEntry {
            dn: "uid=alice,ou=people".to_string(),
            attributes,
        })
        .unwrap();

        let view = export_view(&record);
        assert_eq!(view.comment, None);
        let names: Vec<&str> = view.pairs.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["cn", "mail", "mail"]);

        assert_eq!(
            to_ldif(&record).unwrap(),
            "dn: uid=alice,ou=people\ncn: alice\nmail: a@x.com\nmail: a2@x.com\n"
        );
    }

    #[test]
    fn staged_additions_used_when_current_is_empty() {
        let mut record = new_record();
        record.add_value("cn", "Bob");
        record.remove_value("cn", &AttributeValue::from("Bob"));
        assert!(record.attributes().is_empty());

        let view = export_view(&record);
        assert_eq!(view.comment, Some(NEW_ITEMS_COMMENT));
        assert_eq!(view.pairs, vec![("cn", &AttributeValue::from("Bob"))]);

        assert_eq!(
            to_ldif(&record).unwrap(),
            "dn: uid=bob,ou=people\n# All items in this file are new.\ncn: Bob\n"
        );
    }

    #[test]
    fn empty_record_exports_dn_only() {
        let record = new_record();
        let view = export_view(&record);
        assert!(view.comment.is_none());
        assert!(view.pairs.is_empty());
        assert_eq!(to_ldif(&record).unwrap(), "dn: uid=bob,ou=people\n");
    }

    #[test]
    fn unsafe_values_are_base64() {
        let mut record = new_record();
        record.add_value("description", " leading space");
        record.add_value("jpegPhoto", vec![0xff_u8, 0xd8]);

        let ldif = to_ldif(&record).unwrap();
        assert!(ldif.contains("description:: IGxlYWRpbmcgc3BhY2U=\n"));
        assert!(ldif.contains("jpegPhoto:: /9g=\n"));
    }

    #[test]
    fn safe_string_rules() {
        assert!(is_safe("plain value"));
        assert!(is_safe("Zoë"));
        assert!(is_safe(""));
        assert!(!is_safe(":colon"));
        assert!(!is_safe("<url"));
        assert!(!is_safe("trailing "));
        assert!(!is_safe("two\nlines"));
    }
}
