/*!
# Strongly-typed prefixes and local names

Namespace prefixes and local names must conform to the `NCName` production
of Namespaces in XML 1.0. This module provides an owned/borrowed type pair
([`NCName`] / [`NCNameStr`]) which carries that guarantee in the type, so
that the binding engine never has to re-validate a name it is handed.

An `NCName` can never be empty. The empty prefix (default namespace,
unnamespaced attribute) is therefore represented as `Option<NCName>`
throughout the crate, with `None` meaning "no prefix".
*/
use std::borrow::{Borrow, ToOwned};
use std::convert::{TryFrom, TryInto};
use std::fmt;
use std::ops::Deref;

use smartstring::alias::String as SmartString;

use crate::error::Error;

// edge points which are not valid Rust chars are clamped to the nearest
// valid neighbour; see XML 1.0 § 2.3 productions [4] and [4a]
static NAMESTART_RANGES: &'static [(char, char)] = &[
	('A', 'Z'),
	('_', '_'),
	('a', 'z'),
	('\u{c0}', '\u{d6}'),
	('\u{d8}', '\u{f6}'),
	('\u{f8}', '\u{2ff}'),
	('\u{370}', '\u{37d}'),
	('\u{37f}', '\u{1fff}'),
	('\u{200c}', '\u{200d}'),
	('\u{2070}', '\u{218f}'),
	('\u{2c00}', '\u{2fef}'),
	('\u{3001}', '\u{d7ff}'),
	('\u{f900}', '\u{fdcf}'),
	('\u{fdf0}', '\u{fffd}'),
	('\u{10000}', '\u{effff}'),
];

static NAME_EXTRA_RANGES: &'static [(char, char)] = &[
	('-', '-'),
	('.', '.'),
	('0', '9'),
	('\u{b7}', '\u{b7}'),
	('\u{300}', '\u{36f}'),
	('\u{203f}', '\u{2040}'),
];

fn in_ranges(c: char, rs: &[(char, char)]) -> bool {
	rs.iter().any(|&(lo, hi)| lo <= c && c <= hi)
}

fn is_namestart(c: char) -> bool {
	in_ranges(c, NAMESTART_RANGES)
}

fn is_namechar(c: char) -> bool {
	is_namestart(c) || in_ranges(c, NAME_EXTRA_RANGES)
}

/// Error condition from validating a prefix or local name.
#[derive(Debug, Clone, PartialEq)]
pub enum NameError {
	/// The name was empty.
	Empty,
	/// The name contained a colon; NCNames must not.
	Colon,
	/// A character which is not allowed in an NCName at that position.
	InvalidChar(char),
}

impl fmt::Display for NameError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Empty => f.write_str("NCName must not be empty"),
			Self::Colon => f.write_str("NCName must not contain a colon"),
			Self::InvalidChar(c) => write!(f, "character U+{:04x} is not allowed", *c as u32),
		}
	}
}

impl std::error::Error for NameError {}

/**
Check whether a str is a valid NCName (Namespaces in XML 1.0 § 3).

# Example

```rust
use xmlout::strings::{validate_ncname, NameError};

assert!(validate_ncname("foobar").is_ok());
assert!(matches!(validate_ncname("foo:bar"), Err(NameError::Colon)));
assert!(matches!(validate_ncname(""), Err(NameError::Empty)));
```
*/
pub fn validate_ncname(s: &str) -> Result<(), NameError> {
	let mut chars = s.chars();
	match chars.next() {
		None => return Err(NameError::Empty),
		Some(':') => return Err(NameError::Colon),
		Some(c) if !is_namestart(c) => return Err(NameError::InvalidChar(c)),
		Some(_) => (),
	}
	for c in chars {
		if c == ':' {
			return Err(NameError::Colon);
		}
		if !is_namechar(c) {
			return Err(NameError::InvalidChar(c));
		}
	}
	Ok(())
}

/// String which conforms to the NCName production of Namespaces in XML 1.0.
///
/// Since [`NCName`] (indirectly) derefs to [`str`], all (non-mutable)
/// methods from [`str`] are available.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NCName(SmartString);

impl NCName {
	/// Obtain a reference to the inner string slice.
	pub fn as_str(&self) -> &str {
		self.0.as_str()
	}

	/// Construct an `NCName` without validation.
	///
	/// # Safety
	///
	/// The caller is responsible for ensuring that the passed string is in
	/// fact a valid NCName.
	pub unsafe fn from_str_unchecked<T: AsRef<str>>(s: T) -> Self {
		Self(s.as_ref().into())
	}
}

impl Deref for NCName {
	type Target = NCNameStr;

	fn deref(&self) -> &Self::Target {
		// SAFETY: both types enforce the same check on construction.
		unsafe { NCNameStr::from_str_unchecked(&self.0) }
	}
}

impl Borrow<NCNameStr> for NCName {
	fn borrow(&self) -> &NCNameStr {
		self
	}
}

impl Borrow<str> for NCName {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl AsRef<str> for NCName {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl AsRef<NCNameStr> for NCName {
	fn as_ref(&self) -> &NCNameStr {
		self
	}
}

impl PartialEq<str> for NCName {
	fn eq(&self, other: &str) -> bool {
		&self.0 == other
	}
}

impl PartialEq<&str> for NCName {
	fn eq(&self, other: &&str) -> bool {
		&self.0 == *other
	}
}

impl PartialEq<NCName> for str {
	fn eq(&self, other: &NCName) -> bool {
		other.0 == self
	}
}

impl TryFrom<&str> for NCName {
	type Error = Error;

	fn try_from(other: &str) -> Result<Self, Self::Error> {
		validate_ncname(other)?;
		Ok(Self(other.into()))
	}
}

impl TryFrom<String> for NCName {
	type Error = Error;

	fn try_from(other: String) -> Result<Self, Self::Error> {
		validate_ncname(&other)?;
		Ok(Self(other.into()))
	}
}

impl From<NCName> for String {
	fn from(other: NCName) -> Self {
		other.0.into()
	}
}

impl fmt::Display for NCName {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// str which conforms to the NCName production of Namespaces in XML 1.0.
///
/// This is the borrowed counterpart of [`NCName`].
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NCNameStr(str);

impl NCNameStr {
	/// Validate a str and reinterpret it as NCNameStr.
	pub fn from_str<'x>(s: &'x str) -> Result<&'x Self, Error> {
		s.try_into()
	}

	/// Reinterpret a str as NCNameStr without validation.
	///
	/// # Safety
	///
	/// The caller is responsible for ensuring that the passed str is in
	/// fact a valid NCName.
	pub unsafe fn from_str_unchecked<'x>(s: &'x str) -> &'x Self {
		std::mem::transmute(s)
	}

	/// Create an owned copy of the string as [`NCName`].
	pub fn to_ncname(&self) -> NCName {
		// SAFETY: the slice was validated on construction.
		unsafe { NCName::from_str_unchecked(&self.0) }
	}
}

impl Deref for NCNameStr {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl AsRef<str> for NCNameStr {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl ToOwned for NCNameStr {
	type Owned = NCName;

	fn to_owned(&self) -> Self::Owned {
		self.to_ncname()
	}
}

impl PartialEq<str> for NCNameStr {
	fn eq(&self, other: &str) -> bool {
		&self.0 == other
	}
}

impl PartialEq<NCNameStr> for str {
	fn eq(&self, other: &NCNameStr) -> bool {
		self == &other.0
	}
}

impl PartialEq<NCName> for NCNameStr {
	fn eq(&self, other: &NCName) -> bool {
		self.0 == *other.0
	}
}

impl PartialEq<NCNameStr> for NCName {
	fn eq(&self, other: &NCNameStr) -> bool {
		*self.0 == other.0
	}
}

impl<'x> TryFrom<&'x str> for &'x NCNameStr {
	type Error = Error;

	fn try_from(other: &'x str) -> Result<Self, Self::Error> {
		validate_ncname(other)?;
		// SAFETY: the content check is executed right above and we are
		// transmuting &str into a repr(transparent) wrapper of str.
		Ok(unsafe { NCNameStr::from_str_unchecked(other) })
	}
}

impl fmt::Display for NCNameStr {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(&self.0)
	}
}
