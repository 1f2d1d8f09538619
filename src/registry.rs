/*!
# Interned namespace URIs

Every namespace URI a document refers to is represented by exactly one
live [`Namespace`] object per [`NamespaceRegistry`]. Reference identity
(`RcPtr::ptr_eq`) is therefore sufficient to compare namespaces, which the
scope and binding code relies on throughout.

A small fixed set of well-known namespaces (the empty namespace, `xml`,
`xmlns`) is created eagerly per registry with fixed, permanent bindings.
All other URIs are interned on demand and kept alive for the lifetime of
the registry: a [`Namespace`] carries document-wide binding state (prefix
hints, the last bound prefix), which has to survive even while no scope
holds a reference to it.
*/
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use smartstring::alias::String as SmartString;

use crate::strings::{NCName, NCNameStr};

/// Wrapper pointer around interned namespaces.
///
/// The writer is single-threaded by design, so this is a plain [`Rc`].
pub type RcPtr<T> = Rc<T>;

/// XML core namespace URI (for the `xml:` prefix)
pub const XMLNS_XML: &'static str = "http://www.w3.org/XML/1998/namespace";
/// XML namespace URI (for the `xmlns:` prefix)
pub const XMLNS_XMLNS: &'static str = "http://www.w3.org/2000/xmlns/";

pub const PREFIX_XML: &'static NCNameStr = unsafe { std::mem::transmute("xml") };
pub const PREFIX_XMLNS: &'static NCNameStr = unsafe { std::mem::transmute("xmlns") };

/**
# One interned namespace URI

Carries the URI itself plus the binding state which is shared across the
whole document: the caller-supplied prefix hints and the current live
binding, which the repair algorithm uses as a fast path irrespective of
scope nesting.
*/
pub struct Namespace {
	uri: SmartString,
	preferred_prefix: RefCell<Option<NCName>>,
	prefers_default: Cell<bool>,
	bound_prefix: RefCell<Option<NCName>>,
	last_bound_prefix: RefCell<Option<NCName>>,
	permanent: Cell<bool>,
}

impl Namespace {
	fn new(uri: &str) -> Self {
		Self {
			uri: uri.into(),
			preferred_prefix: RefCell::new(None),
			prefers_default: Cell::new(false),
			bound_prefix: RefCell::new(None),
			last_bound_prefix: RefCell::new(None),
			permanent: Cell::new(false),
		}
	}

	fn new_reserved(uri: &str, prefix: &NCNameStr) -> Self {
		let ns = Self::new(uri);
		*ns.bound_prefix.borrow_mut() = Some(prefix.to_ncname());
		ns.permanent.set(true);
		ns
	}

	/// The namespace URI.
	pub fn uri(&self) -> &str {
		&self.uri
	}

	/// Whether this is the empty namespace (no namespace at all).
	pub fn is_empty_uri(&self) -> bool {
		self.uri.is_empty()
	}

	/// The caller-supplied prefix hint, if any.
	pub fn preferred_prefix(&self) -> Option<NCName> {
		self.preferred_prefix.borrow().clone()
	}

	/// Record a prefix hint. The first hint wins; later hints for the same
	/// namespace are ignored.
	pub fn suggest_prefix(&self, prefix: &NCNameStr) {
		let mut hint = self.preferred_prefix.borrow_mut();
		if hint.is_none() {
			*hint = Some(prefix.to_ncname());
		}
	}

	/// Whether this namespace should be bound as the default namespace
	/// when a fresh binding is needed.
	pub fn prefers_default(&self) -> bool {
		self.prefers_default.get()
	}

	/// Record a hint that this namespace should become the default
	/// namespace when a fresh binding is needed.
	pub fn suggest_default(&self) {
		self.prefers_default.set(true);
	}

	/// The prefix this namespace is currently live-bound to, anywhere in
	/// the document, if any.
	pub fn bound_prefix(&self) -> Option<NCName> {
		self.bound_prefix.borrow().clone()
	}

	/// The prefix this namespace was most recently bound to before the
	/// binding element closed, if any.
	pub fn last_bound_prefix(&self) -> Option<NCName> {
		self.last_bound_prefix.borrow().clone()
	}

	/// Mark the namespace as live-bound to `prefix`.
	///
	/// Replaces an earlier permanent adoption; the new binding ends with
	/// its element again.
	pub fn bind_as(&self, prefix: NCName) {
		*self.bound_prefix.borrow_mut() = Some(prefix);
		self.permanent.set(false);
	}

	/// Adopt a binding inherited from the root context. Permanent bindings
	/// survive element closes; [`Namespace::unbind`] leaves them alone.
	pub fn bind_permanently_as(&self, prefix: NCName) {
		*self.bound_prefix.borrow_mut() = Some(prefix);
		self.permanent.set(true);
	}

	/// Drop the live binding when the element which introduced it closes.
	///
	/// The dropped prefix is remembered as `last_bound_prefix` so that a
	/// later rebinding can reuse it if it is free.
	pub fn unbind(&self) {
		if self.permanent.get() {
			return;
		}
		if let Some(prefix) = self.bound_prefix.borrow_mut().take() {
			*self.last_bound_prefix.borrow_mut() = Some(prefix);
		}
	}
}

impl fmt::Debug for Namespace {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Namespace")
			.field("uri", &self.uri)
			.field("bound_prefix", &self.bound_prefix.borrow())
			.finish()
	}
}

/**
# Per-document namespace interning table

Guarantees reference-identity equality for equal URIs within one
document. The table holds strong references: the registry lives exactly
as long as its writer, and the binding state on a [`Namespace`] must not
reset just because every scope referencing it has closed.
*/
pub struct NamespaceRegistry {
	empty: RcPtr<Namespace>,
	xml: RcPtr<Namespace>,
	xmlns: RcPtr<Namespace>,
	interned: RefCell<HashMap<SmartString, RcPtr<Namespace>>>,
}

impl NamespaceRegistry {
	/// Create a new registry with the three well-known namespaces bound.
	pub fn new() -> Self {
		Self {
			empty: RcPtr::new(Namespace::new("")),
			xml: RcPtr::new(Namespace::new_reserved(XMLNS_XML, PREFIX_XML)),
			xmlns: RcPtr::new(Namespace::new_reserved(XMLNS_XMLNS, PREFIX_XMLNS)),
			interned: RefCell::new(HashMap::new()),
		}
	}

	/// The empty namespace (no namespace).
	pub fn empty_namespace(&self) -> &RcPtr<Namespace> {
		&self.empty
	}

	/// The reserved `xml` namespace.
	pub fn xml_namespace(&self) -> &RcPtr<Namespace> {
		&self.xml
	}

	/// The reserved `xmlns` namespace.
	pub fn xmlns_namespace(&self) -> &RcPtr<Namespace> {
		&self.xmlns
	}

	/// Intern a namespace URI.
	///
	/// Returns the well-known singleton for the three reserved URIs, the
	/// existing object for a URI seen before, and a fresh object
	/// otherwise.
	pub fn intern(&self, uri: &str) -> RcPtr<Namespace> {
		if uri.is_empty() {
			return self.empty.clone();
		}
		if uri == XMLNS_XML {
			return self.xml.clone();
		}
		if uri == XMLNS_XMLNS {
			return self.xmlns.clone();
		}
		let mut interned = self.interned.borrow_mut();
		match interned.get(uri) {
			Some(ns) => ns.clone(),
			None => {
				let ns = RcPtr::new(Namespace::new(uri));
				interned.insert(uri.into(), ns.clone());
				ns
			}
		}
	}

	/// Intern a namespace URI and record a preferred prefix hint.
	///
	/// The hint is only recorded if the namespace does not carry one yet
	/// (first writer wins). Hints on the reserved namespaces are ignored;
	/// their bindings are fixed.
	pub fn intern_with_prefix(&self, uri: &str, prefix: &NCNameStr) -> RcPtr<Namespace> {
		let ns = self.intern(uri);
		if !ns.permanent.get() && !ns.is_empty_uri() {
			ns.suggest_prefix(prefix);
		}
		ns
	}

	/// Number of interned URIs, not counting the well-known namespaces.
	pub fn len(&self) -> usize {
		self.interned.borrow().len()
	}
}

impl fmt::Debug for NamespaceRegistry {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("NamespaceRegistry")
			.field("instance", &(self as *const NamespaceRegistry))
			.field("interned.len()", &self.interned.borrow().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::convert::TryInto;

	#[test]
	fn interning_is_identity_preserving() {
		let reg = NamespaceRegistry::new();
		let a = reg.intern("urn:foo");
		let b = reg.intern("urn:foo");
		assert!(RcPtr::ptr_eq(&a, &b));
		let c = reg.intern("urn:bar");
		assert!(!RcPtr::ptr_eq(&a, &c));
	}

	#[test]
	fn reserved_uris_return_the_singletons() {
		let reg = NamespaceRegistry::new();
		assert!(RcPtr::ptr_eq(&reg.intern(""), reg.empty_namespace()));
		assert!(RcPtr::ptr_eq(&reg.intern(XMLNS_XML), reg.xml_namespace()));
		assert!(RcPtr::ptr_eq(&reg.intern(XMLNS_XMLNS), reg.xmlns_namespace()));
		assert_eq!(
			reg.xml_namespace().bound_prefix().unwrap().as_str(),
			"xml"
		);
	}

	#[test]
	fn first_prefix_hint_wins() {
		let reg = NamespaceRegistry::new();
		let p1: NCName = "a".try_into().unwrap();
		let p2: NCName = "b".try_into().unwrap();
		let ns = reg.intern_with_prefix("urn:foo", &p1);
		reg.intern_with_prefix("urn:foo", &p2);
		assert_eq!(ns.preferred_prefix().unwrap().as_str(), "a");
	}

	#[test]
	fn interned_state_survives_dropping_the_handle() {
		let reg = NamespaceRegistry::new();
		let hint: NCName = "p".try_into().unwrap();
		{
			let ns = reg.intern_with_prefix("urn:foo", &hint);
			ns.bind_as("q".try_into().unwrap());
			ns.unbind();
		}
		// the handle is gone, the document-wide state is not
		let again = reg.intern("urn:foo");
		assert_eq!(again.preferred_prefix().unwrap().as_str(), "p");
		assert_eq!(again.last_bound_prefix().unwrap().as_str(), "q");
		assert_eq!(reg.len(), 1);
	}

	#[test]
	fn unbind_remembers_the_last_prefix() {
		let reg = NamespaceRegistry::new();
		let ns = reg.intern("urn:foo");
		ns.bind_as("p".try_into().unwrap());
		assert_eq!(ns.bound_prefix().unwrap().as_str(), "p");
		ns.unbind();
		assert!(ns.bound_prefix().is_none());
		assert_eq!(ns.last_bound_prefix().unwrap().as_str(), "p");
	}

	#[test]
	fn permanent_bindings_survive_unbind() {
		let reg = NamespaceRegistry::new();
		let ns = reg.intern("urn:foo");
		ns.bind_permanently_as("p".try_into().unwrap());
		ns.unbind();
		assert_eq!(ns.bound_prefix().unwrap().as_str(), "p");
	}

	#[test]
	fn rebinding_replaces_a_permanent_adoption() {
		let reg = NamespaceRegistry::new();
		let ns = reg.intern("urn:foo");
		ns.bind_permanently_as("p".try_into().unwrap());
		ns.bind_as("q".try_into().unwrap());
		ns.unbind();
		assert!(ns.bound_prefix().is_none());
		assert_eq!(ns.last_bound_prefix().unwrap().as_str(), "q");
	}
}
