/*!
# Lexical namespace scopes

Each open element carries an [`ElementScope`] with the namespace
declarations visible at that point of the document. The visible bindings
live in a single flat list which child scopes share by reference counting:
a scope which declares nothing clones the `Rc` of its parent's list, a
scope which does declare gets a private copy with the masked ancestor
slots cleared. Masked slots are cleared in place rather than removed, so
indices into the list stay stable across the copy.

Scopes are kept on a plain stack owned by the writer; an empty stack means
the root of the document. There is no sentinel root scope object.
*/
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use smartstring::alias::String as SmartString;

use crate::error::NsError;
use crate::registry::{Namespace, RcPtr, PREFIX_XML, XMLNS_XML};
use crate::strings::{NCName, NCNameStr};

/**
# Namespace bindings inherited from outside the document

An application may hand the writer a context of prefix/URI pairs which are
considered bound on the (virtual) parent of the root element, e.g. from an
enclosing document fragment. Bindings resolved through this context are
used without emitting a declaration.
*/
pub trait NamespaceContext {
	/// Return the prefix bound to `uri`, if any.
	///
	/// An implementation may return `Some("")` to indicate the default
	/// namespace; the writer ignores such results, as a default binding
	/// cannot be adopted without a declaration.
	fn prefix_for(&self, uri: &str) -> Option<&str>;

	/// Return the URI bound to `prefix`, if any.
	fn uri_for(&self, prefix: &NCNameStr) -> Option<&str>;
}

/// Simple two-map [`NamespaceContext`] implementation.
#[derive(Debug, Default)]
pub struct RootContext {
	by_prefix: HashMap<NCName, String>,
	by_uri: HashMap<String, NCName>,
}

impl RootContext {
	pub fn new() -> Self {
		Self::default()
	}

	/// Declare `prefix` as bound to `uri` at the root.
	///
	/// A later binding for the same prefix or the same URI replaces the
	/// earlier one.
	pub fn bind<T: Into<String>>(&mut self, prefix: NCName, uri: T) {
		let uri = uri.into();
		self.by_uri.insert(uri.clone(), prefix.clone());
		self.by_prefix.insert(prefix, uri);
	}
}

impl NamespaceContext for RootContext {
	fn prefix_for(&self, uri: &str) -> Option<&str> {
		self.by_uri.get(uri).map(|p| p.as_str())
	}

	fn uri_for(&self, prefix: &NCNameStr) -> Option<&str> {
		self.by_prefix.get(prefix).map(|uri| uri.as_str())
	}
}

/**
# Pending declarations for the next element

Filled by the writer between elements and consumed by
[`ElementScope::open`]. A later prefix declaration replaces an earlier one
for the same prefix; only the last default namespace sticks.
*/
#[derive(Default)]
pub struct Declarations {
	default_ns: Option<RcPtr<Namespace>>,
	prefixes: Vec<(NCName, RcPtr<Namespace>)>,
}

impl Declarations {
	pub fn new() -> Self {
		Self::default()
	}

	/// Declare `prefix` as bound to `ns` on the next element.
	pub fn set_prefix(&mut self, prefix: NCName, ns: RcPtr<Namespace>) {
		for (existing, bound) in self.prefixes.iter_mut() {
			if *existing == prefix {
				*bound = ns;
				return;
			}
		}
		self.prefixes.push((prefix, ns));
	}

	/// Declare `ns` as the default namespace of the next element.
	pub fn set_default_namespace(&mut self, ns: RcPtr<Namespace>) {
		self.default_ns = Some(ns);
	}

	pub fn is_empty(&self) -> bool {
		self.default_ns.is_none() && self.prefixes.is_empty()
	}
}

/// Result of validating an explicit prefix against a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixStatus {
	/// The prefix is bound to the requested namespace.
	Ok,
	/// The prefix is not bound at all in this scope.
	Unbound,
	/// The prefix is bound, but to a different namespace.
	Misbound,
}

type NsEntry = Option<(NCName, RcPtr<Namespace>)>;

/**
# The namespace scope of one open element

Tracks the visible prefix bindings, the active default namespace, the
attribute names written so far (for duplicate detection) and, in
validating mode, which of the local declarations have actually been
emitted.
*/
pub struct ElementScope {
	local_name: NCName,
	prefix: Option<NCName>,
	default_ns: RcPtr<Namespace>,
	default_declared_locally: bool,
	default_written: bool,
	ns_list: RcPtr<Vec<NsEntry>>,
	local_start: usize,
	local_end: usize,
	written_flags: Option<Vec<bool>>,
	attribute_keys: HashMap<(SmartString, NCName), String>,
	next_auto_id: u32,
}

impl ElementScope {
	/// Open a scope below `parent` (`None` at the root), consuming the
	/// pending declarations.
	///
	/// `root_default` is the namespace in effect at the root, i.e. the
	/// empty namespace. With `validating`, the scope records which local
	/// declarations get written so that unused ones can be reported at
	/// close.
	pub fn open(
		parent: Option<&ElementScope>,
		root_default: &RcPtr<Namespace>,
		local_name: NCName,
		decls: Declarations,
		validating: bool,
	) -> Self {
		let (default_ns, default_declared_locally) = match decls.default_ns {
			Some(ns) => (ns, true),
			None => match parent {
				Some(p) => (p.default_ns.clone(), false),
				None => (root_default.clone(), false),
			},
		};
		let parent_list = match parent {
			Some(p) => p.ns_list.clone(),
			None => RcPtr::new(Vec::new()),
		};
		let local_start = parent_list.len();
		let (ns_list, local_end) = if decls.prefixes.is_empty() {
			// nothing declared: share the parent's list
			(parent_list, local_start)
		} else {
			let mut list = (*parent_list).clone();
			for (prefix, ns) in decls.prefixes {
				for slot in list.iter_mut() {
					if slot.as_ref().map_or(false, |(p, _)| *p == prefix) {
						// masked ancestor binding
						*slot = None;
					}
				}
				list.push(Some((prefix, ns)));
			}
			let local_end = list.len();
			(RcPtr::new(list), local_end)
		};
		let written_flags = if validating {
			Some(vec![false; local_end - local_start])
		} else {
			None
		};
		Self {
			local_name,
			prefix: None,
			default_ns,
			default_declared_locally,
			default_written: false,
			ns_list,
			local_start,
			local_end,
			written_flags,
			attribute_keys: HashMap::new(),
			next_auto_id: parent.map_or(1, |p| p.next_auto_id),
		}
	}

	pub fn local_name(&self) -> &NCNameStr {
		&self.local_name
	}

	/// The prefix the element tag was written with.
	pub fn prefix(&self) -> Option<&NCNameStr> {
		self.prefix.as_deref()
	}

	/// Record the prefix the element tag is written with. Set at most
	/// once, right after prefix resolution.
	pub fn set_prefix(&mut self, prefix: Option<NCName>) {
		debug_assert!(self.prefix.is_none());
		self.prefix = prefix;
	}

	/// The default namespace in effect for this element.
	pub fn default_ns(&self) -> &RcPtr<Namespace> {
		&self.default_ns
	}

	pub fn default_declared_locally(&self) -> bool {
		self.default_declared_locally
	}

	/// Make `ns` the default namespace of this element. Used by the
	/// repairing writer, which emits the declaration immediately.
	pub fn declare_default(&mut self, ns: RcPtr<Namespace>) {
		self.default_ns = ns;
		self.default_declared_locally = true;
		self.default_written = true;
	}

	/// Look up a prefix for `ns` among the visible bindings.
	///
	/// Returns `None` if the namespace is not reachable, `Some(None)` if
	/// it is the active default namespace (only with `default_ok`), and
	/// `Some(Some(prefix))` for a prefix binding. The innermost binding
	/// wins.
	pub fn find_prefix(&self, ns: &RcPtr<Namespace>, default_ok: bool) -> Option<Option<NCName>> {
		if default_ok && RcPtr::ptr_eq(ns, &self.default_ns) {
			return Some(None);
		}
		if ns.uri() == XMLNS_XML {
			return Some(Some(PREFIX_XML.to_ncname()));
		}
		for slot in self.ns_list.iter().rev() {
			if let Some((prefix, bound)) = slot {
				if RcPtr::ptr_eq(bound, ns) {
					return Some(Some(prefix.clone()));
				}
			}
		}
		None
	}

	/// Validate a caller-supplied prefix against the visible bindings.
	///
	/// The empty prefix means the default namespace for elements and "no
	/// namespace" for attributes; the latter is always acceptable. The
	/// reserved `xml` prefix resolves without a declaration.
	pub fn is_prefix_valid(
		&self,
		prefix: Option<&NCNameStr>,
		ns: &RcPtr<Namespace>,
		for_element: bool,
	) -> PrefixStatus {
		let prefix = match prefix {
			None => {
				if !for_element {
					return PrefixStatus::Ok;
				}
				return if RcPtr::ptr_eq(ns, &self.default_ns) {
					PrefixStatus::Ok
				} else {
					PrefixStatus::Misbound
				};
			}
			Some(p) => p,
		};
		if *prefix == **PREFIX_XML {
			return if ns.uri() == XMLNS_XML {
				PrefixStatus::Ok
			} else {
				PrefixStatus::Misbound
			};
		}
		for slot in self.ns_list.iter().rev() {
			if let Some((bound_prefix, bound_ns)) = slot {
				if **bound_prefix == *prefix {
					return if RcPtr::ptr_eq(bound_ns, ns) {
						PrefixStatus::Ok
					} else {
						PrefixStatus::Misbound
					};
				}
			}
		}
		PrefixStatus::Unbound
	}

	/// Validate an explicit default namespace write against the local
	/// declaration.
	pub fn check_default_ns_write(&mut self, ns: &RcPtr<Namespace>) -> Result<(), NsError> {
		if !self.default_declared_locally {
			return Err(NsError::ConflictingDefault {
				declared: None,
				requested: ns.uri().to_string(),
			});
		}
		if !RcPtr::ptr_eq(ns, &self.default_ns) {
			return Err(NsError::ConflictingDefault {
				declared: Some(self.default_ns.uri().to_string()),
				requested: ns.uri().to_string(),
			});
		}
		self.default_written = true;
		Ok(())
	}

	/// Validate an explicit prefixed namespace write.
	///
	/// The write must match a declaration made on this element, marking
	/// it as written, or resolve identically through the root context. An
	/// inherited declaration is not enough; it has to be redeclared on
	/// the element to be emitted again.
	pub fn check_ns_write(
		&mut self,
		root_ctx: Option<&dyn NamespaceContext>,
		prefix: &NCNameStr,
		ns: &RcPtr<Namespace>,
	) -> Result<(), NsError> {
		for i in (0..self.ns_list.len()).rev() {
			if let Some((bound_prefix, bound_ns)) = &self.ns_list[i] {
				if **bound_prefix == *prefix {
					if !RcPtr::ptr_eq(bound_ns, ns) {
						return Err(NsError::MisboundPrefix {
							prefix: Some(bound_prefix.clone()),
							requested: ns.uri().to_string(),
						});
					}
					if i < self.local_start || i >= self.local_end {
						// inherited declaration
						break;
					}
					if let Some(flags) = &mut self.written_flags {
						flags[i - self.local_start] = true;
					}
					return Ok(());
				}
			}
		}
		if let Some(ctx) = root_ctx {
			if ctx.uri_for(prefix).map_or(false, |uri| uri == ns.uri()) {
				return Ok(());
			}
		}
		Err(NsError::Undeclared {
			uri: ns.uri().to_string(),
		})
	}

	/// Record an attribute write, rejecting a duplicate `(uri, local)`
	/// pair on the same element.
	pub fn check_attr_write(
		&mut self,
		uri: &str,
		local_name: &NCNameStr,
		value: &str,
	) -> Result<(), NsError> {
		let key = (SmartString::from(uri), local_name.to_ncname());
		match self.attribute_keys.entry(key) {
			Entry::Occupied(entry) => Err(NsError::DuplicateAttribute {
				local_name: local_name.to_ncname(),
				previous: entry.get().clone(),
			}),
			Entry::Vacant(entry) => {
				entry.insert(value.to_string());
				Ok(())
			}
		}
	}

	/// Final sweep at element close: every local declaration must have
	/// been written. Discards the attribute bookkeeping.
	pub fn check_all_ns_written(&mut self) -> Result<(), NsError> {
		if self.default_declared_locally && !self.default_written {
			return Err(NsError::UnusedDeclaration { prefix: None });
		}
		if let Some(flags) = &self.written_flags {
			for (offset, written) in flags.iter().enumerate() {
				if *written {
					continue;
				}
				if let Some((prefix, _)) = &self.ns_list[self.local_start + offset] {
					return Err(NsError::UnusedDeclaration {
						prefix: Some(prefix.clone()),
					});
				}
			}
		}
		self.attribute_keys = HashMap::new();
		Ok(())
	}

	/// Add a binding to this scope after construction. Used by the
	/// repairing writer, which emits the declaration immediately.
	///
	/// Unshares the binding list if it is still shared with the parent.
	pub fn add_prefix(&mut self, prefix: NCName, ns: RcPtr<Namespace>) {
		let local_start = self.local_start;
		let list = RcPtr::make_mut(&mut self.ns_list);
		for (i, slot) in list.iter_mut().enumerate() {
			if slot.as_ref().map_or(false, |(p, _)| *p == prefix) {
				*slot = None;
				if i >= local_start {
					if let Some(flags) = &mut self.written_flags {
						flags[i - local_start] = true;
					}
				}
			}
		}
		list.push(Some((prefix, ns)));
		if let Some(flags) = &mut self.written_flags {
			flags.push(true);
		}
		self.local_end = self.ns_list.len();
	}

	/// Generate a prefix which collides neither with a visible binding
	/// nor with the root context.
	///
	/// The counter is seeded from the parent scope at construction, so
	/// sibling subtrees may generate the same prefix for different
	/// namespaces; within one scope chain the result is always fresh.
	pub fn generate_prefix(
		&mut self,
		root_ctx: Option<&dyn NamespaceContext>,
		base: &NCNameStr,
	) -> NCName {
		loop {
			let id = self.next_auto_id;
			self.next_auto_id += 1;
			let candidate = format!("{}{}", base, id);
			let taken = self
				.ns_list
				.iter()
				.any(|slot| slot.as_ref().map_or(false, |(p, _)| p.as_str() == candidate));
			if taken {
				continue;
			}
			// SAFETY: base is a valid NCName and ASCII digits are valid
			// name characters, so the concatenation is a valid NCName.
			let candidate = unsafe { NCName::from_str_unchecked(candidate) };
			if let Some(ctx) = root_ctx {
				if ctx.uri_for(&candidate).is_some() {
					continue;
				}
			}
			return candidate;
		}
	}

	#[cfg(test)]
	fn shares_list_with(&self, other: &ElementScope) -> bool {
		RcPtr::ptr_eq(&self.ns_list, &other.ns_list)
	}
}
