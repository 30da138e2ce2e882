//! Distinguished names.
//!
//! Names are kept in their decoded, structured form. Attribute types are
//! carried as dotted OID strings or short descriptors exactly as the peer
//! supplied them; this module does not resolve descriptors against a schema.
//!
//! The string form follows the familiar LDAP-like rendering, most
//! significant RDN last: `cn=Alice+sn=Liddell,o=Wonderland,c=GB`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of RDNs accepted when parsing a name from a string.
pub const MAX_NAME_DEPTH: usize = 64;

/// Error returned when a string cannot be parsed as a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameParseError {
    /// An RDN component had no `=` separator.
    #[error("missing '=' in attribute value assertion: {component}")]
    MissingEquals {
        /// The offending component.
        component: String,
    },

    /// An attribute type was empty.
    #[error("empty attribute type in: {component}")]
    EmptyType {
        /// The offending component.
        component: String,
    },

    /// The name nests deeper than [`MAX_NAME_DEPTH`].
    #[error("name too deep: {depth} RDNs exceeds maximum {max}")]
    TooDeep {
        /// Number of RDNs found.
        depth: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A trailing backslash escaped nothing.
    #[error("dangling escape at end of name")]
    DanglingEscape,
}

/// A single attribute type and value pair within an RDN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeTypeAndValue {
    /// Attribute type, as an OID or descriptor.
    pub attribute_type: String,
    /// Attribute value in its string form.
    pub value: String,
}

impl AttributeTypeAndValue {
    /// Creates a new attribute type and value pair.
    #[must_use]
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_type: attribute_type.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for AttributeTypeAndValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", self.attribute_type)?;
        for c in self.value.chars() {
            if matches!(c, ',' | '+' | '=' | '\\') {
                write!(f, "\\")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// A relative distinguished name: one or more type/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelativeDistinguishedName(pub Vec<AttributeTypeAndValue>);

impl fmt::Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, atav) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{atav}")?;
        }
        Ok(())
    }
}

/// A distinguished name, stored root-first as on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistinguishedName(pub Vec<RelativeDistinguishedName>);

impl DistinguishedName {
    /// The empty name, which denotes the root of the DIT.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Number of RDNs in the name.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the root name.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends an RDN below this name.
    #[must_use]
    pub fn child(mut self, rdn: RelativeDistinguishedName) -> Self {
        self.0.push(rdn);
        self
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.0.iter().rev().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for DistinguishedName {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::root());
        }
        let mut rdns = Vec::new();
        for rdn_str in split_unescaped(s, ',')? {
            let mut atavs = Vec::new();
            for atav_str in split_unescaped(&rdn_str, '+')? {
                atavs.push(parse_atav(&atav_str)?);
            }
            rdns.push(RelativeDistinguishedName(atavs));
            if rdns.len() > MAX_NAME_DEPTH {
                return Err(NameParseError::TooDeep {
                    depth: rdns.len(),
                    max: MAX_NAME_DEPTH,
                });
            }
        }
        // String form is leaf-first.
        rdns.reverse();
        Ok(Self(rdns))
    }
}

/// Splits on `sep` while keeping escapes intact for the next stage.
fn split_unescaped(s: &str, sep: char) -> Result<Vec<String>, NameParseError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let escaped = chars.next().ok_or(NameParseError::DanglingEscape)?;
            current.push('\\');
            current.push(escaped);
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    Ok(parts)
}

fn parse_atav(s: &str) -> Result<AttributeTypeAndValue, NameParseError> {
    let (attribute_type, raw_value) =
        s.split_once('=')
            .ok_or_else(|| NameParseError::MissingEquals {
                component: s.to_string(),
            })?;
    let attribute_type = attribute_type.trim();
    if attribute_type.is_empty() {
        return Err(NameParseError::EmptyType {
            component: s.to_string(),
        });
    }
    let mut value = String::with_capacity(raw_value.len());
    let mut chars = raw_value.trim().chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            value.push(chars.next().ok_or(NameParseError::DanglingEscape)?);
        } else {
            value.push(c);
        }
    }
    Ok(AttributeTypeAndValue::new(attribute_type, value))
}

/// A unique identifier (BIT STRING) that disambiguates reused names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueIdentifier {
    /// Packed bits, most significant bit first.
    pub bytes: Vec<u8>,
    /// Number of unused bits in the final byte.
    pub unused_bits: u8,
}

impl UniqueIdentifier {
    /// Creates a byte-aligned unique identifier.
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            unused_bits: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render_round_trip_is_leaf_first() {
        let dn: DistinguishedName = "cn=Alice+sn=Liddell,o=Wonderland,c=GB".parse().unwrap();
        assert_eq!(dn.len(), 3);
        assert_eq!(dn.0[0].0[0], AttributeTypeAndValue::new("c", "GB"));
        assert_eq!(dn.0[2].0.len(), 2);
        assert_eq!(dn.to_string(), "cn=Alice+sn=Liddell,o=Wonderland,c=GB");
    }

    #[test]
    fn escaped_separators_stay_in_value() {
        let dn: DistinguishedName = r"cn=Smith\, John,o=Acme".parse().unwrap();
        assert_eq!(dn.len(), 2);
        assert_eq!(dn.0[1].0[0].value, "Smith, John");
        assert_eq!(dn.to_string(), r"cn=Smith\, John,o=Acme");
    }

    #[test]
    fn empty_string_is_root() {
        let dn: DistinguishedName = "".parse().unwrap();
        assert!(dn.is_empty());
        assert_eq!(dn.to_string(), "");
    }

    #[test]
    fn rejects_malformed_components() {
        assert!(matches!(
            "cn".parse::<DistinguishedName>(),
            Err(NameParseError::MissingEquals { .. })
        ));
        assert!(matches!(
            "=x".parse::<DistinguishedName>(),
            Err(NameParseError::EmptyType { .. })
        ));
        assert!(matches!(
            r"cn=x\".parse::<DistinguishedName>(),
            Err(NameParseError::DanglingEscape)
        ));
    }

    #[test]
    fn rejects_excessive_depth() {
        let deep = vec!["o=x"; MAX_NAME_DEPTH + 1].join(",");
        assert!(matches!(
            deep.parse::<DistinguishedName>(),
            Err(NameParseError::TooDeep { .. })
        ));
    }
}
