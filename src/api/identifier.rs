//! Translation between the identifier path segment of a IIIF URI and the
//! identifier of a source image.

use nom::{
    Finish, Parser, character::complete::char, combinator::all_consuming,
    sequence::separated_pair,
};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::api::image::parse_unsigned;
use crate::error::IiifError;
use crate::geometry::ScaleConstraint;

/// Characters escaped when an identifier is written into a URI path.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn encode_identifier(identifier: &str) -> String {
    utf8_percent_encode(identifier, PATH_SEGMENT).to_string()
}

pub fn decode_identifier(segment: &str) -> Result<String, IiifError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| IiifError::invalid("Identifier is not valid UTF-8"))
}

/// Replaces every occurrence of the configured slash substitute with `/`.
pub fn apply_slash_substitute(identifier: &str, substitute: Option<&str>) -> String {
    match substitute {
        Some(sub) if !sub.is_empty() => identifier.replace(sub, "/"),
        _ => identifier.to_owned(),
    }
}

/// Splits a trailing `<delimiter>n:d` scale constraint off an identifier.
///
/// A suffix that does not look like `n:d` is part of the identifier; one that
/// does but is out of range is an error.
pub fn split_scale_constraint<'a>(
    identifier: &'a str,
    delimiter: &str,
) -> Result<(&'a str, Option<ScaleConstraint>), IiifError> {
    let Some((base, suffix)) = identifier.rsplit_once(delimiter) else {
        return Ok((identifier, None));
    };
    if base.is_empty() {
        return Ok((identifier, None));
    }
    let parsed = all_consuming(separated_pair(
        parse_unsigned::<u64>,
        char(':'),
        parse_unsigned::<u64>,
    ))
    .parse(suffix)
    .finish();
    match parsed {
        Ok((_, (n, d))) => Ok((base, Some(ScaleConstraint::new(n, d)?))),
        Err(_) => Ok((identifier, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_identifier() {
        assert_eq!(encode_identifier("a/b c.jpg"), "a%2Fb%20c.jpg");
        assert_eq!(decode_identifier("a%2Fb%20c.jpg").unwrap(), "a/b c.jpg");
    }

    #[test]
    fn test_slash_substitute() {
        assert_eq!(apply_slash_substitute("a$b$c", Some("$")), "a/b/c");
        assert_eq!(apply_slash_substitute("a$b", None), "a$b");
        assert_eq!(apply_slash_substitute("a$b", Some("")), "a$b");
    }

    #[test]
    fn test_split_scale_constraint() {
        assert_eq!(
            split_scale_constraint("cats-1:2", "-").unwrap(),
            ("cats", Some(ScaleConstraint::new(1, 2).unwrap()))
        );
        assert_eq!(
            split_scale_constraint("my-cats.jpg", "-").unwrap(),
            ("my-cats.jpg", None)
        );
        assert_eq!(split_scale_constraint("cats", "-").unwrap(), ("cats", None));
        assert_eq!(
            split_scale_constraint("cats;2:4", ";").unwrap(),
            ("cats", Some(ScaleConstraint::new(2, 4).unwrap()))
        );
        assert!(split_scale_constraint("cats-3:2", "-").is_err());
    }
}
