/// An attribute this crate doesn't know, kept as its name and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
	pub name: String,
	pub info: Vec<u8>,
}

/// The raw bytes of the annotation attributes of a class, field, method or record component.
///
/// These are only decoded when asked for, see [`crate::tree::annotation::parse_annotations`]. Each blob starts
/// with the `num_annotations` (respectively `num_annotations` of the type annotation) count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAnnotations {
	pub runtime_visible: Option<Vec<u8>>,
	pub runtime_invisible: Option<Vec<u8>>,
	pub runtime_visible_type: Option<Vec<u8>>,
	pub runtime_invisible_type: Option<Vec<u8>>,
}

impl RawAnnotations {
	pub fn is_empty(&self) -> bool {
		self.runtime_visible.is_none() && self.runtime_invisible.is_none() &&
			self.runtime_visible_type.is_none() && self.runtime_invisible_type.is_none()
	}
}
