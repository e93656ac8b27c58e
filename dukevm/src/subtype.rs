//! Subtype checks, for `checkcast`, `instanceof`, `aastore` and exception handler matching.
//!
//! Classes (and arrays of classes or primitives) are *primary* types: each one knows the chain of its superclasses,
//! so checking against one is a single indexed comparison. Interfaces (and arrays of interfaces) are *secondary*
//! types, checked by looking into the flattened set of all superinterfaces.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use crate::class::Class;

const ARRAY_SUPERTYPES: [&str; 3] = ["java/lang/Object", "java/lang/Cloneable", "java/io/Serializable"];

/// Checks whether a value of class `sub` can be used where `sup` is expected.
pub fn is_assignable_from(sup: &Arc<Class>, sub: &Arc<Class>) -> bool {
	if Arc::ptr_eq(sup, sub) {
		return true;
	}
	if sub.last_assignable.load(Ordering::Relaxed) == sup.id().0 + 1 {
		return true;
	}

	let result = check(sup, sub);
	if result {
		sub.last_assignable.store(sup.id().0 + 1, Ordering::Relaxed);
	}
	result
}

fn check(sup: &Arc<Class>, sub: &Arc<Class>) -> bool {
	if sup.is_primitive() || sub.is_primitive() {
		return false;
	}

	match (sup.component(), sub.component()) {
		(Some(sup_component), Some(sub_component)) => {
			// primitive components need identity, which the recursion checks
			return is_assignable_from(sup_component, sub_component);
		},
		(None, Some(_)) => return ARRAY_SUPERTYPES.contains(&sup.name()),
		(Some(_), None) => return false,
		(None, None) => {},
	}

	let (Ok(sup_links), Ok(sub_links)) = (sup.links(), sub.links()) else {
		return false;
	};
	if sup.is_interface() {
		sub_links.secondary_supertypes().contains(&sup.id())
	} else {
		let depth = sup_links.primary_supertypes().len().saturating_sub(1);
		sub_links.primary_supertypes().get(depth) == Some(&sup.id())
	}
}

#[cfg(test)]
mod testing {
	use std::sync::Arc;
	use anyhow::Result;
	use duke::tree::descriptor::Type;
	use raw_class_file::{ClassBuilder, flags};
	use crate::class::Class;
	use crate::subtype::is_assignable_from;

	fn class(builder: ClassBuilder, super_class: Option<&Arc<Class>>, interfaces: &[&Arc<Class>]) -> Result<Arc<Class>> {
		let class = Class::new_object(duke::read_class(&builder.build())?);
		class.link(super_class.cloned(), interfaces.iter().map(|&interface| interface.clone()).collect())?;
		Ok(class)
	}

	struct World {
		object: Arc<Class>,
		cloneable: Arc<Class>,
		serializable: Arc<Class>,
		a: Arc<Class>,
		b: Arc<Class>,
		i: Arc<Class>,
		j: Arc<Class>,
	}

	impl World {
		fn new() -> Result<World> {
			let object = class(ClassBuilder::new("java/lang/Object").super_class(None), None, &[])?;
			let cloneable = class(ClassBuilder::interface("java/lang/Cloneable"), Some(&object), &[])?;
			let serializable = class(ClassBuilder::interface("java/io/Serializable"), Some(&object), &[])?;
			let i = class(ClassBuilder::interface("I"), Some(&object), &[])?;
			let j = class(ClassBuilder::interface("J").implements("I"), Some(&object), &[&i])?;
			let a = class(ClassBuilder::new("A"), Some(&object), &[])?;
			let b = class(ClassBuilder::new("B").super_class(Some("A")).implements("J"), Some(&a), &[&j])?;
			Ok(World { object, cloneable, serializable, a, b, i, j })
		}

		fn array(&self, component: &Arc<Class>) -> Result<Arc<Class>> {
			Class::new_array(component.clone(), &self.object, vec![self.cloneable.clone(), self.serializable.clone()])
		}
	}

	#[test]
	fn classes_and_interfaces() -> Result<()> {
		let w = World::new()?;

		assert!(is_assignable_from(&w.b, &w.b));
		assert!(is_assignable_from(&w.a, &w.b));
		assert!(is_assignable_from(&w.object, &w.b));
		assert!(!is_assignable_from(&w.b, &w.a));

		// transitively through J
		assert!(is_assignable_from(&w.i, &w.b));
		assert!(is_assignable_from(&w.j, &w.b));
		assert!(is_assignable_from(&w.i, &w.j));
		assert!(!is_assignable_from(&w.j, &w.i));
		assert!(!is_assignable_from(&w.i, &w.a));

		assert!(is_assignable_from(&w.object, &w.i));
		assert!(!is_assignable_from(&w.a, &w.i));
		Ok(())
	}

	#[test]
	fn cache_is_filled_only_on_success() -> Result<()> {
		let w = World::new()?;

		assert!(!is_assignable_from(&w.b, &w.a));
		assert!(is_assignable_from(&w.a, &w.b));
		// asking again gives the same answers, with one of them from the cache
		assert!(is_assignable_from(&w.a, &w.b));
		assert!(!is_assignable_from(&w.b, &w.a));
		assert!(is_assignable_from(&w.i, &w.b));
		assert!(is_assignable_from(&w.a, &w.b));
		Ok(())
	}

	#[test]
	fn arrays() -> Result<()> {
		let w = World::new()?;
		let a_array = w.array(&w.a)?;
		let b_array = w.array(&w.b)?;
		let i_array = w.array(&w.i)?;
		let b_array_array = w.array(&b_array)?;
		let object_array = w.array(&w.object)?;

		assert_eq!(b_array.name(), "[LB;");
		assert_eq!(b_array_array.name(), "[[LB;");

		assert!(is_assignable_from(&a_array, &b_array));
		assert!(!is_assignable_from(&b_array, &a_array));
		assert!(is_assignable_from(&i_array, &b_array));
		assert!(is_assignable_from(&object_array, &b_array_array));
		assert!(!is_assignable_from(&a_array, &b_array_array));

		assert!(is_assignable_from(&w.object, &b_array));
		assert!(is_assignable_from(&w.cloneable, &b_array));
		assert!(is_assignable_from(&w.serializable, &b_array));
		assert!(!is_assignable_from(&w.a, &b_array));
		assert!(!is_assignable_from(&w.i, &b_array));
		assert!(!is_assignable_from(&a_array, &w.a));
		Ok(())
	}

	#[test]
	fn primitives() -> Result<()> {
		let w = World::new()?;
		let int = Class::new_primitive(Type::I)?;
		let long = Class::new_primitive(Type::J)?;
		let int_array = w.array(&int)?;
		let long_array = w.array(&long)?;
		let other_int_array = w.array(&int)?;

		assert!(is_assignable_from(&int, &int));
		assert!(!is_assignable_from(&long, &int));
		assert!(!is_assignable_from(&w.object, &int));
		assert!(!is_assignable_from(&int, &w.object));

		assert_eq!(int_array.name(), "[I");
		assert!(!is_assignable_from(&long_array, &int_array));
		assert!(is_assignable_from(&int_array, &other_int_array));
		assert!(is_assignable_from(&w.object, &int_array));
		assert!(!is_assignable_from(&w.array(&w.object)?, &int_array));
		Ok(())
	}

	#[test]
	fn interface_flag_matters() -> Result<()> {
		let w = World::new()?;
		let abstract_class = class(ClassBuilder::new("C").access(flags::ACC_PUBLIC | flags::ACC_ABSTRACT), Some(&w.object), &[])?;
		assert!(is_assignable_from(&w.object, &abstract_class));
		assert!(!is_assignable_from(&abstract_class, &w.b));
		Ok(())
	}
}
