use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Represents a class file version.
///
/// Take a look at [the list of class file versions](https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.1-200-B.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
	pub major: u16,
	pub minor: u16,
}

impl Version {
	pub const V1_1: Version = Version::new(45, 3);
	pub const V1_6: Version = Version::new(50, 0);
	pub const V1_7: Version = Version::new(51, 0);
	pub const V1_8: Version = Version::new(52, 0);
	pub const V11: Version = Version::new(55, 0);
	pub const V17: Version = Version::new(61, 0);
	pub const V21: Version = Version::new(65, 0);

	pub const fn new(major: u16, minor: u16) -> Version {
		Version { major, minor }
	}

	/// Method handles, and with them signature polymorphic methods, exist starting with Java 7.
	pub fn supports_polymorphic_signatures(self) -> bool {
		self >= Version::V1_7
	}

	/// Starting with Java 8, `invokestatic` and `invokespecial` (and the matching method handles)
	/// may refer to an `InterfaceMethodref`.
	pub fn supports_interface_method_refs_for_static_and_special(self) -> bool {
		self >= Version::V1_8
	}
}

impl PartialOrd for Version {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Version {
	fn cmp(&self, other: &Self) -> Ordering {
		self.major.cmp(&other.major)
			.then_with(|| self.minor.cmp(&other.minor))
	}
}

impl Display for Version {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}", self.major, self.minor)
	}
}

#[cfg(test)]
mod testing {
	use crate::tree::version::Version;

	#[test]
	fn test_cmp() {
		assert!(Version::V1_8 < Version::V11);
		assert!(Version::V1_1 < Version::V1_6);
		assert!(Version::V21 >= Version::V21);
		assert!(Version::V1_8 < Version::new(52, 1));
		assert!(Version::V11 > Version::new(52, 65535));
	}

	#[test]
	fn feature_gates() {
		assert!(!Version::V1_6.supports_polymorphic_signatures());
		assert!(Version::V1_7.supports_polymorphic_signatures());
		assert!(!Version::V1_7.supports_interface_method_refs_for_static_and_special());
		assert!(Version::V17.supports_interface_method_refs_for_static_and_special());
	}
}
