//! The arithmetic of the guest, where it differs from plain Rust operators.
//!
//! Integer operations wrap around. Division and remainder give [`None`] for a divisor of zero, which the interpreter
//! turns into a `java/lang/ArithmeticException`.

pub(crate) fn idiv(a: i32, b: i32) -> Option<i32> {
	(b != 0).then(|| a.wrapping_div(b))
}

pub(crate) fn irem(a: i32, b: i32) -> Option<i32> {
	(b != 0).then(|| a.wrapping_rem(b))
}

pub(crate) fn ldiv(a: i64, b: i64) -> Option<i64> {
	(b != 0).then(|| a.wrapping_div(b))
}

pub(crate) fn lrem(a: i64, b: i64) -> Option<i64> {
	(b != 0).then(|| a.wrapping_rem(b))
}

// only the low 5 bits of the shift distance count for int, the low 6 bits for long

pub(crate) fn ishl(a: i32, b: i32) -> i32 {
	a << (b & 0x1f)
}

pub(crate) fn ishr(a: i32, b: i32) -> i32 {
	a >> (b & 0x1f)
}

pub(crate) fn iushr(a: i32, b: i32) -> i32 {
	((a as u32) >> (b & 0x1f)) as i32
}

pub(crate) fn lshl(a: i64, b: i32) -> i64 {
	a << (b & 0x3f)
}

pub(crate) fn lshr(a: i64, b: i32) -> i64 {
	a >> (b & 0x3f)
}

pub(crate) fn lushr(a: i64, b: i32) -> i64 {
	((a as u64) >> (b & 0x3f)) as i64
}

pub(crate) fn lcmp(a: i64, b: i64) -> i32 {
	a.cmp(&b) as i32
}

/// Compares two floats. If one is NaN, the result is `nan`: `-1` for `fcmpl`, `1` for `fcmpg`.
pub(crate) fn fcmp(a: f32, b: f32, nan: i32) -> i32 {
	a.partial_cmp(&b).map_or(nan, |ordering| ordering as i32)
}

/// Compares two doubles, like [`fcmp`].
pub(crate) fn dcmp(a: f64, b: f64, nan: i32) -> i32 {
	a.partial_cmp(&b).map_or(nan, |ordering| ordering as i32)
}

// `as` casts from floating point saturate, with NaN becoming zero, just as needed

pub(crate) fn f2i(value: f32) -> i32 {
	value as i32
}

pub(crate) fn f2l(value: f32) -> i64 {
	value as i64
}

pub(crate) fn d2i(value: f64) -> i32 {
	value as i32
}

pub(crate) fn d2l(value: f64) -> i64 {
	value as i64
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::interpreter::math::*;

	#[test]
	fn division() {
		assert_eq!(idiv(7, 2), Some(3));
		assert_eq!(idiv(-7, 2), Some(-3));
		assert_eq!(irem(-7, 2), Some(-1));
		assert_eq!(idiv(1, 0), None);
		assert_eq!(irem(1, 0), None);
		assert_eq!(ldiv(1, 0), None);
		assert_eq!(lrem(1, 0), None);

		assert_eq!(idiv(i32::MIN, -1), Some(i32::MIN));
		assert_eq!(irem(i32::MIN, -1), Some(0));
		assert_eq!(ldiv(i64::MIN, -1), Some(i64::MIN));
	}

	#[test]
	fn floating_division() {
		assert_eq!(1.0f32 / 0.0, f32::INFINITY);
		assert_eq!(-1.0f64 / 0.0, f64::NEG_INFINITY);
		assert!((5.5f64 % 0.0).is_nan());
		assert_eq!(-5.5f32 % 2.0, -1.5);
	}

	#[test]
	fn shifts() {
		assert_eq!(ishl(1, 33), ishl(1, 1));
		assert_eq!(ishl(1, 33), 2);
		assert_eq!(ishr(-8, 1), -4);
		assert_eq!(iushr(-8, 28), 0xf);
		assert_eq!(iushr(-1, 32), -1);
		assert_eq!(lshl(1, 65), 2);
		assert_eq!(lshr(-16, 2), -4);
		assert_eq!(lushr(-1, 60), 0xf);
	}

	#[test]
	fn comparisons() {
		assert_eq!(lcmp(1, 2), -1);
		assert_eq!(lcmp(2, 2), 0);
		assert_eq!(fcmp(f32::NAN, 1.0, -1), -1);
		assert_eq!(fcmp(f32::NAN, 1.0, 1), 1);
		assert_eq!(fcmp(0.0, -0.0, 1), 0);
		assert_eq!(dcmp(2.0, 1.0, -1), 1);
		assert_eq!(dcmp(1.0, f64::NAN, 1), 1);
	}

	#[test]
	fn conversions() {
		assert_eq!(f2i(f32::NAN), 0);
		assert_eq!(f2i(1e20), i32::MAX);
		assert_eq!(f2i(-1e20), i32::MIN);
		assert_eq!(f2i(-2.7), -2);
		assert_eq!(d2l(f64::INFINITY), i64::MAX);
		assert_eq!(d2i(f64::NAN), 0);
		assert_eq!(f2l(f32::NEG_INFINITY), i64::MIN);
	}
}
