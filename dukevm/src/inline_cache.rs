//! Caches for the target of virtual calls, keyed by call site.
//!
//! A call site starts out monomorphic, remembering one receiver class. Seeing a second one makes it polymorphic,
//! with a small ring of receiver classes. Once that ring is full and another receiver class shows up, the site
//! turns megamorphic and from then on uses a bounded map shared by all megamorphic sites.

use std::collections::HashMap;
use std::sync::Arc;
use indexmap::IndexMap;
use log::debug;
use parking_lot::Mutex;
use crate::class::{Class, ClassId};
use crate::error::VmResult;
use crate::method::{Method, MethodId};

/// The number of receiver classes a polymorphic call site remembers.
pub const POLYMORPHIC_WIDTH: usize = 4;

/// The identity of a call site: the calling method and the pc of the invoke instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
	pub method: MethodId,
	pub pc: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
	Monomorphic,
	Polymorphic,
	Megamorphic,
}

enum SiteCache {
	Monomorphic(ClassId, Arc<Method>),
	Polymorphic {
		entries: [Option<(ClassId, Arc<Method>)>; POLYMORPHIC_WIDTH],
		/// Where the next entry goes.
		cursor: usize,
		/// Where lookups start.
		last_hit: usize,
	},
	Megamorphic,
}

impl SiteCache {
	fn tier(&self) -> Tier {
		match self {
			SiteCache::Monomorphic(..) => Tier::Monomorphic,
			SiteCache::Polymorphic { .. } => Tier::Polymorphic,
			SiteCache::Megamorphic => Tier::Megamorphic,
		}
	}
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheCounts {
	pub hits: usize,
	pub misses: usize,
}

pub(crate) struct InlineCaches {
	sites: Mutex<HashMap<CallSite, SiteCache>>,
	/// Keyed by the resolved method and the receiver class. Ordered from least to most recently used.
	megamorphic: Mutex<IndexMap<(MethodId, ClassId), Arc<Method>>>,
	megamorphic_capacity: usize,
	counts: Mutex<CacheCounts>,
}

enum Lookup {
	Hit(Arc<Method>),
	Miss,
	MegamorphicMiss,
}

impl InlineCaches {
	pub(crate) fn new(megamorphic_capacity: usize) -> InlineCaches {
		InlineCaches {
			sites: Mutex::new(HashMap::new()),
			megamorphic: Mutex::new(IndexMap::new()),
			megamorphic_capacity: megamorphic_capacity.max(1),
			counts: Mutex::new(CacheCounts::default()),
		}
	}

	/// Gets the cached target for a receiver class at a call site, or uses `select` to find it and caches it.
	///
	/// No lock is held while `select` runs.
	pub(crate) fn lookup(
		&self,
		site: CallSite,
		resolved: &Method,
		receiver: &Arc<Class>,
		select: impl FnOnce() -> VmResult<Arc<Method>>,
	) -> VmResult<Arc<Method>> {
		match self.find(site, resolved, receiver) {
			Lookup::Hit(method) => {
				self.counts.lock().hits += 1;
				Ok(method)
			},
			Lookup::Miss => {
				self.counts.lock().misses += 1;
				let method = select()?;
				self.insert(site, resolved, receiver, method.clone());
				Ok(method)
			},
			Lookup::MegamorphicMiss => {
				self.counts.lock().misses += 1;
				let method = select()?;
				self.insert_megamorphic(resolved, receiver, method.clone());
				Ok(method)
			},
		}
	}

	fn find(&self, site: CallSite, resolved: &Method, receiver: &Arc<Class>) -> Lookup {
		let mut sites = self.sites.lock();
		match sites.get_mut(&site) {
			None => Lookup::Miss,
			Some(SiteCache::Monomorphic(class, method)) => {
				if *class == receiver.id() {
					Lookup::Hit(method.clone())
				} else {
					Lookup::Miss
				}
			},
			Some(SiteCache::Polymorphic { entries, last_hit, .. }) => {
				for offset in 0..POLYMORPHIC_WIDTH {
					let i = (*last_hit + offset) % POLYMORPHIC_WIDTH;
					if let Some((class, method)) = &entries[i] {
						if *class == receiver.id() {
							*last_hit = i;
							return Lookup::Hit(method.clone());
						}
					}
				}
				Lookup::Miss
			},
			Some(SiteCache::Megamorphic) => {
				drop(sites);
				let key = (resolved.id(), receiver.id());
				let mut megamorphic = self.megamorphic.lock();
				match megamorphic.shift_remove(&key) {
					Some(method) => {
						megamorphic.insert(key, method.clone());
						Lookup::Hit(method)
					},
					None => Lookup::MegamorphicMiss,
				}
			},
		}
	}

	fn insert(&self, site: CallSite, resolved: &Method, receiver: &Arc<Class>, method: Arc<Method>) {
		let mut sites = self.sites.lock();
		let entry = (receiver.id(), method.clone());
		match sites.get_mut(&site) {
			None => {
				sites.insert(site, SiteCache::Monomorphic(entry.0, entry.1));
			},
			Some(cache @ SiteCache::Monomorphic(..)) => {
				let SiteCache::Monomorphic(class, old) = std::mem::replace(cache, SiteCache::Megamorphic) else {
					return;
				};
				if class == entry.0 {
					*cache = SiteCache::Monomorphic(entry.0, entry.1);
					return;
				}
				debug!("call site {site:?} of {} turns polymorphic", resolved.name());
				*cache = SiteCache::Polymorphic {
					entries: [Some((class, old)), Some(entry), None, None],
					cursor: 2,
					last_hit: 1,
				};
			},
			Some(SiteCache::Polymorphic { entries, cursor, last_hit }) => {
				if entries[*cursor].is_none() {
					entries[*cursor] = Some(entry);
					*last_hit = *cursor;
					*cursor = (*cursor + 1) % POLYMORPHIC_WIDTH;
				} else {
					debug!("call site {site:?} of {} turns megamorphic", resolved.name());
					sites.insert(site, SiteCache::Megamorphic);
					drop(sites);
					self.insert_megamorphic(resolved, receiver, method);
				}
			},
			Some(SiteCache::Megamorphic) => {
				drop(sites);
				self.insert_megamorphic(resolved, receiver, method);
			},
		}
	}

	fn insert_megamorphic(&self, resolved: &Method, receiver: &Arc<Class>, method: Arc<Method>) {
		let mut megamorphic = self.megamorphic.lock();
		let key = (resolved.id(), receiver.id());
		megamorphic.shift_remove(&key);
		if megamorphic.len() >= self.megamorphic_capacity {
			// evict the least recently used
			megamorphic.shift_remove_index(0);
		}
		megamorphic.insert(key, method);
	}

	pub(crate) fn tier(&self, site: CallSite) -> Option<Tier> {
		self.sites.lock().get(&site).map(SiteCache::tier)
	}

	pub(crate) fn megamorphic_len(&self) -> usize {
		self.megamorphic.lock().len()
	}

	pub(crate) fn counts(&self) -> CacheCounts {
		*self.counts.lock()
	}
}

#[cfg(test)]
mod testing {
	use std::sync::Arc;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use raw_class_file::{ClassBuilder, flags};
	use crate::class::Class;
	use crate::error::VmResult;
	use crate::inline_cache::{CallSite, InlineCaches, Tier};
	use crate::method::Method;

	struct Fixture {
		classes: Vec<Arc<Class>>,
		site: CallSite,
	}

	impl Fixture {
		/// Classes `C0` to `C{n-1}`, all declaring `m()V`.
		fn new(n: usize) -> Result<Fixture> {
			let object = Class::new_object(duke::read_class(&ClassBuilder::new("java/lang/Object").super_class(None).build())?);
			object.link(None, Vec::new())?;

			let classes = (0..n)
				.map(|i| {
					let bytes = ClassBuilder::new(&format!("C{i}"))
						.method(flags::ACC_PUBLIC, "m", "()V", |code| { code.op(raw_class_file::insn::r#return); })
						.build();
					let class = Class::new_object(duke::read_class(&bytes)?);
					class.link(Some(object.clone()), Vec::new())?;
					Ok(class)
				})
				.collect::<Result<Vec<_>>>()?;

			let site = CallSite { method: method(&classes[0])?.id(), pc: 7 };
			Ok(Fixture { classes, site })
		}
	}

	fn method(class: &Arc<Class>) -> Result<Arc<Method>> {
		class.declared_method("m", "()V").cloned().ok_or_else(|| anyhow::anyhow!("no method m in {class:?}"))
	}

	fn call(caches: &InlineCaches, fixture: &Fixture, receiver: usize, selections: &mut usize) -> Result<Arc<Method>> {
		let resolved = method(&fixture.classes[0])?;
		let receiver = &fixture.classes[receiver];
		let selected = caches.lookup(fixture.site, &resolved, receiver, || -> VmResult<Arc<Method>> {
			*selections += 1;
			method(receiver).map_err(Into::into)
		})?;
		Ok(selected)
	}

	#[test]
	fn tiers() -> Result<()> {
		let fixture = Fixture::new(6)?;
		let caches = InlineCaches::new(16);
		let mut selections = 0;

		assert_eq!(caches.tier(fixture.site), None);

		call(&caches, &fixture, 0, &mut selections)?;
		call(&caches, &fixture, 0, &mut selections)?;
		assert_eq!(caches.tier(fixture.site), Some(Tier::Monomorphic));
		assert_eq!(selections, 1);

		call(&caches, &fixture, 1, &mut selections)?;
		assert_eq!(caches.tier(fixture.site), Some(Tier::Polymorphic));
		call(&caches, &fixture, 2, &mut selections)?;
		call(&caches, &fixture, 3, &mut selections)?;
		assert_eq!(selections, 4);

		// all four are remembered now
		for receiver in 0..4 {
			let selected = call(&caches, &fixture, receiver, &mut selections)?;
			assert!(Arc::ptr_eq(&selected, &method(&fixture.classes[receiver])?));
		}
		assert_eq!(selections, 4);
		assert_eq!(caches.tier(fixture.site), Some(Tier::Polymorphic));

		call(&caches, &fixture, 4, &mut selections)?;
		assert_eq!(caches.tier(fixture.site), Some(Tier::Megamorphic));
		assert_eq!(caches.megamorphic_len(), 1);

		call(&caches, &fixture, 4, &mut selections)?;
		assert_eq!(selections, 5);
		let selected = call(&caches, &fixture, 5, &mut selections)?;
		assert!(Arc::ptr_eq(&selected, &method(&fixture.classes[5])?));
		assert_eq!(selections, 6);

		assert_eq!(caches.counts().misses, 6);
		Ok(())
	}

	#[test]
	fn megamorphic_map_is_bounded() -> Result<()> {
		let fixture = Fixture::new(8)?;
		let caches = InlineCaches::new(2);
		let mut selections = 0;

		for receiver in 0..5 {
			call(&caches, &fixture, receiver, &mut selections)?;
		}
		assert_eq!(caches.tier(fixture.site), Some(Tier::Megamorphic));

		call(&caches, &fixture, 5, &mut selections)?;
		call(&caches, &fixture, 6, &mut selections)?;
		assert_eq!(caches.megamorphic_len(), 2);
		assert_eq!(selections, 7);

		// 4 got evicted, 6 is still there
		call(&caches, &fixture, 6, &mut selections)?;
		assert_eq!(selections, 7);
		call(&caches, &fixture, 4, &mut selections)?;
		assert_eq!(selections, 8);
		Ok(())
	}
}
