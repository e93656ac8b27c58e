//! Conversion of the modified UTF-8 format of `CONSTANT_Utf8_info` entries.
//!
//! The format stores `\0` using two bytes and supplementary characters as two 3-byte encoded surrogates.
//! See <https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html#jvms-4.4.7>.

use anyhow::{anyhow, Context, Result};
use java_string::{JavaStr, JavaString};

/// Takes in a vec of data, tries to read it into a [`JavaString`].
pub(crate) fn from_vec_to_string(vec: Vec<u8>) -> Result<JavaString> {
	JavaString::from_modified_utf8(vec)
		.with_context(|| anyhow!("invalid java utf8 contents"))
}

/// Converts a [`JavaStr`] that is used as a name or descriptor to a rust [`String`].
///
/// Names can't contain unpaired surrogates, string constants however can, so these are kept as [`JavaString`].
pub(crate) fn to_name(string: &JavaStr) -> Result<String> {
	string.as_str()
		.map(str::to_owned)
		.map_err(|_| anyhow!("name or descriptor {string:?} contains unpaired surrogates"))
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::jstring::{from_vec_to_string, to_name};

	#[test]
	fn null_uses_two_bytes() -> Result<()> {
		let string = from_vec_to_string(vec![b'a', 0xc0, 0x80, b'b'])?;
		assert_eq!(string, JavaStr::from_str("a\0b"));
		assert!(from_vec_to_string(vec![b'a', 0x00]).is_err());
		Ok(())
	}

	#[test]
	fn supplementary_characters_are_surrogate_pairs() -> Result<()> {
		// U+1F600 as the surrogate pair D83D DE00, each encoded with 3 bytes
		let raw = vec![0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80];
		let string = from_vec_to_string(raw)?;
		assert_eq!(to_name(&string)?, "\u{1F600}");
		Ok(())
	}

	#[test]
	fn lone_surrogate_is_no_name() -> Result<()> {
		let string = from_vec_to_string(vec![0xed, 0xa0, 0xbd])?;
		assert!(to_name(&string).is_err());
		Ok(())
	}
}
