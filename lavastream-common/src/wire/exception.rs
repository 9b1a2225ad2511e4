//! Wire encoding of [`FriendlyError`]
//!
//! Causes are written deepest first, each prefixed with `true`; a `false`
//! closes the chain, followed by the friendly message and severity ordinal.
//! Every entry carries a stack element list. Nothing here has JVM-style stack
//! elements to offer, so the writer emits empty lists and the reader discards
//! whatever it finds.

use crate::error::{Error, Result};
use crate::friendly::{DecodedError, FriendlyError, Severity};
use crate::wire::data::{DataRead, DataWrite};
use std::io::{Read, Write};

/// Upper bound for a stack element count, guards against garbage input
const MAX_STACK_ELEMENTS: i32 = 4096;

pub fn write_friendly_error<W: Write + ?Sized>(output: &mut W, error: &FriendlyError) -> Result<()> {
    let causes: Vec<&DecodedError> = error.cause.iter().flat_map(|c| c.chain()).collect();

    for cause in causes.iter().rev() {
        output.write_bool(true)?;
        output.write_nullable_utf(cause.class_name.as_deref())?;
        output.write_nullable_utf(cause.original_message.as_deref())?;
        output.write_i32_be(0)?;
    }

    output.write_bool(false)?;
    output.write_nullable_utf(error.message.as_deref())?;
    output.write_i32_be(error.severity.ordinal())?;
    output.write_i32_be(0)?;
    Ok(())
}

pub fn read_friendly_error<R: Read + ?Sized>(input: &mut R) -> Result<FriendlyError> {
    let mut cause: Option<DecodedError> = None;

    while input.read_bool()? {
        let class_name = input.read_nullable_utf()?;
        let original_message = input.read_nullable_utf()?;
        skip_stack_trace(input)?;

        cause = Some(DecodedError {
            class_name,
            original_message,
            cause: cause.map(Box::new),
        });
    }

    let message = input.read_nullable_utf()?;
    let ordinal = input.read_i32_be()?;
    let severity = Severity::from_ordinal(ordinal)
        .ok_or_else(|| Error::WireFormat(format!("unknown severity ordinal {}", ordinal)))?;
    skip_stack_trace(input)?;

    Ok(FriendlyError {
        message,
        severity,
        cause,
    })
}

fn skip_stack_trace<R: Read + ?Sized>(input: &mut R) -> Result<()> {
    let count = input.read_i32_be()?;
    if !(0..=MAX_STACK_ELEMENTS).contains(&count) {
        return Err(Error::WireFormat(format!("invalid stack element count {}", count)));
    }

    for _ in 0..count {
        input.read_utf()?;
        input.read_utf()?;
        input.read_nullable_utf()?;
        input.read_i32_be()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_cause_chain_survives_round_trip() {
        let root = DecodedError::new("io", "connection reset", None);
        let middle = DecodedError::new("MatroskaError", "cluster truncated", Some(root));
        let error = FriendlyError::new("Something broke when playing the track.", Severity::Fault)
            .with_cause(middle);

        let mut bytes = Vec::new();
        write_friendly_error(&mut bytes, &error).unwrap();
        let decoded = read_friendly_error(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(decoded, error);
        assert_eq!(decoded.cause_depth(), 2);
    }

    #[test]
    fn test_reader_discards_stack_elements() {
        let mut bytes = Vec::new();
        bytes.write_bool(true).unwrap();
        bytes.write_nullable_utf(Some("java.io.IOException")).unwrap();
        bytes.write_nullable_utf(None).unwrap();
        bytes.write_i32_be(1).unwrap();
        bytes.write_utf("Foo").unwrap();
        bytes.write_utf("bar").unwrap();
        bytes.write_nullable_utf(Some("Foo.java")).unwrap();
        bytes.write_i32_be(12).unwrap();
        bytes.write_bool(false).unwrap();
        bytes.write_nullable_utf(Some("failed")).unwrap();
        bytes.write_i32_be(1).unwrap();
        bytes.write_i32_be(0).unwrap();

        let decoded = read_friendly_error(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded.severity, Severity::Suspicious);
        let cause = decoded.cause.unwrap();
        assert_eq!(cause.class_name.as_deref(), Some("java.io.IOException"));
        assert_eq!(cause.original_message, None);
    }
}
