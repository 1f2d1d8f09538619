/*!
# Streaming namespace-aware XML writer

The [`Writer`] emits an XML 1.0 document token by token while keeping the
namespace declarations consistent. It runs in one of two modes:

* **Repairing** (see [`WriterOptions::repairing`]): the caller only passes
  namespace URIs. The writer picks or invents prefixes, emits the
  necessary `xmlns` declarations itself and reuses bindings which are
  still in scope. Caller-supplied declarations are treated as hints.

* **Non-repairing** (the default): the caller declares every binding
  explicitly via [`Writer::set_prefix`] / [`Writer::set_default_namespace`]
  and emits the declarations via [`Writer::write_namespace`] /
  [`Writer::write_default_namespace`]. The writer validates each write
  against the declarations in scope and rejects inconsistencies.

All errors are fatal. After the first error, the writer is poisoned and
every further call returns the same error; the partial output cannot be
rolled back.

## Example

```rust
use xmlout::{Writer, WriterOptions, BufSink};
use std::convert::TryInto;

let mut w = Writer::with_options(
	BufSink::new(),
	WriterOptions::default().repairing(true),
);
w.write_start_element("urn:example", "doc".try_into()?)?;
w.write_text("hello")?;
w.write_end_element()?;
let buf = w.finish()?.into_inner();
assert_eq!(&buf[..], &b"<ns1:doc xmlns:ns1=\"urn:example\">hello</ns1:doc>"[..]);
# Ok::<(), xmlout::Error>(())
```
*/
use std::mem;

use crate::error::{DocumentError, Error, NsError, Result};
use crate::registry::{Namespace, NamespaceRegistry, RcPtr, PREFIX_XML, PREFIX_XMLNS};
use crate::scope::{Declarations, ElementScope, NamespaceContext, PrefixStatus};
use crate::strings::{NCName, NCNameStr};

pub mod sink;

pub use sink::{BufSink, IoSink, Sink};

static DEFAULT_PREFIX_BASE: &'static NCNameStr = unsafe { std::mem::transmute("ns") };

/**
# Fixed-step indentation

Child tokens at nesting depth *d* are preceded by the first
`start_offset + step * d` bytes of `text` (capped at its length). The
offsets are byte offsets; `text` is emitted verbatim, so it should consist
of a line break followed by enough indentation characters for the
expected depth.

Indentation is suppressed inside elements which contain text or CDATA, so
mixed content round-trips unchanged.
*/
#[derive(Debug, Clone)]
pub struct Indent {
	text: String,
	start_offset: usize,
	step: usize,
}

impl Indent {
	pub fn new<T: Into<String>>(text: T, start_offset: usize, step: usize) -> Self {
		Self {
			text: text.into(),
			start_offset,
			step,
		}
	}

	/// Newline plus `step` spaces per nesting level, up to 64 columns.
	pub fn spaces(step: usize) -> Self {
		let mut text = String::with_capacity(65);
		text.push('\n');
		for _ in 0..64 {
			text.push(' ');
		}
		Self::new(text, 1, step)
	}

	fn slice(&self, depth: usize) -> &str {
		let mut end = (self.start_offset + self.step * depth).min(self.text.len());
		// the offsets are byte offsets; back off to a char boundary so
		// multi-byte indentation text cannot be split
		while !self.text.is_char_boundary(end) {
			end -= 1;
		}
		&self.text[..end]
	}
}

impl Default for Indent {
	fn default() -> Self {
		Self::spaces(2)
	}
}

/// Options for a [`Writer`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
	pub(crate) repairing: bool,
	pub(crate) auto_prefix_base: NCName,
	pub(crate) prefer_default_namespace: bool,
	pub(crate) indent: Option<Indent>,
}

impl Default for WriterOptions {
	fn default() -> Self {
		Self {
			repairing: false,
			auto_prefix_base: DEFAULT_PREFIX_BASE.to_ncname(),
			prefer_default_namespace: false,
			indent: None,
		}
	}
}

impl WriterOptions {
	/// Let the writer pick prefixes and emit declarations itself instead
	/// of validating caller-supplied declarations. Defaults to false.
	pub fn repairing(mut self, enabled: bool) -> Self {
		self.repairing = enabled;
		self
	}

	/// Base for generated prefixes; `"ns"` yields `ns1`, `ns2`, ….
	pub fn auto_prefix_base(mut self, base: NCName) -> Self {
		self.auto_prefix_base = base;
		self
	}

	/// In repairing mode, bind fresh element namespaces as the default
	/// namespace instead of inventing a prefix. Defaults to false.
	pub fn prefer_default_namespace(mut self, enabled: bool) -> Self {
		self.prefer_default_namespace = enabled;
		self
	}

	/// Indent child elements; `None` (the default) emits no inter-token
	/// whitespace at all.
	pub fn indent(mut self, indent: Option<Indent>) -> Self {
		self.indent = indent;
		self
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	/// Start of the document, XML declaration still allowed.
	Start,
	/// Prolog after the XML declaration or other prolog content.
	Declared,
	/// Inside a start tag, declarations and attributes allowed.
	ElementHead,
	/// Inside element content.
	Content,
	/// Root element closed, nothing allowed anymore.
	EndOfDocument,
}

/// A declaration the repairing writer decided to emit on the current tag.
enum NewDecl {
	Default(String),
	Prefixed(NCName, String),
}

#[derive(Debug, Clone, Copy, Default)]
struct Level {
	had_text: bool,
	had_children: bool,
}

/**
# Namespace binding context and document serializer

See the [module documentation](self) for the two operating modes.

The writer owns the [sink](Sink) it emits to; [`Writer::finish`] checks
that the document is complete and hands the sink back.
*/
pub struct Writer<S: Sink> {
	sink: S,
	options: WriterOptions,
	registry: NamespaceRegistry,
	root_ctx: Option<Box<dyn NamespaceContext>>,
	scopes: Vec<ElementScope>,
	levels: Vec<Level>,
	bound_stack: Vec<RcPtr<Namespace>>,
	bound_marks: Vec<usize>,
	pending: Declarations,
	auto_seq: u32,
	state: State,
	poison: Option<Error>,
}

impl<S: Sink> Writer<S> {
	pub fn new(sink: S) -> Self {
		Self::with_options(sink, WriterOptions::default())
	}

	pub fn with_options(sink: S, options: WriterOptions) -> Self {
		Self {
			sink,
			options,
			registry: NamespaceRegistry::new(),
			root_ctx: None,
			scopes: Vec::new(),
			levels: vec![Level::default()],
			bound_stack: Vec::new(),
			bound_marks: Vec::new(),
			pending: Declarations::new(),
			auto_seq: 1,
			state: State::Start,
			poison: None,
		}
	}

	/// Supply namespace bindings considered in effect outside the
	/// document. Bindings resolved through this context are used without
	/// emitting a declaration.
	///
	/// Must be set before anything is written.
	pub fn set_root_context(&mut self, ctx: Box<dyn NamespaceContext>) {
		self.root_ctx = Some(ctx);
	}

	/// The sink, for inspecting partial output.
	pub fn sink(&self) -> &S {
		&self.sink
	}

	fn check_not_poisoned(&self) -> Result<()> {
		match &self.poison {
			Some(e) => Err(e.clone()),
			None => Ok(()),
		}
	}

	fn seal<T>(&mut self, result: Result<T>) -> Result<T> {
		if let Err(e) = &result {
			self.poison = Some(e.clone());
		}
		result
	}

	/// Emit the XML declaration. Must be the first call, if used.
	pub fn write_xml_declaration(&mut self) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.xml_declaration();
		self.seal(result)
	}

	/// Declare `prefix` as bound to `uri` on the next element.
	///
	/// In repairing mode this is a hint: the prefix is remembered for the
	/// namespace and used when the writer has to invent a binding.
	pub fn set_prefix(&mut self, prefix: &NCNameStr, uri: &str) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.set_prefix_impl(prefix, uri);
		self.seal(result)
	}

	/// Declare `uri` as the default namespace of the next element.
	///
	/// In repairing mode this is a hint that the namespace should be
	/// bound as the default when a fresh binding is needed.
	pub fn set_default_namespace(&mut self, uri: &str) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.set_default_namespace_impl(uri);
		self.seal(result)
	}

	/// Open an element, resolving its namespace to a prefix.
	pub fn write_start_element(&mut self, uri: &str, local_name: &NCNameStr) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.start_element(uri, local_name, None);
		self.seal(result)
	}

	/// Open an element with a caller-chosen prefix.
	///
	/// The prefix must be bound to `uri` in scope; in repairing mode an
	/// unbound prefix is declared on the spot instead.
	pub fn write_start_element_with_prefix(
		&mut self,
		prefix: &NCNameStr,
		uri: &str,
		local_name: &NCNameStr,
	) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.start_element(uri, local_name, Some(prefix));
		self.seal(result)
	}

	/// Emit a prefixed namespace declaration on the open start tag.
	///
	/// In non-repairing mode this is the only way declarations reach the
	/// output, and the write is validated against the declarations in
	/// scope. In repairing mode it is a hint, like [`Writer::set_prefix`].
	pub fn write_namespace(&mut self, prefix: &NCNameStr, uri: &str) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.namespace_decl(prefix, uri);
		self.seal(result)
	}

	/// Emit the default namespace declaration on the open start tag.
	pub fn write_default_namespace(&mut self, uri: &str) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.default_namespace_decl(uri);
		self.seal(result)
	}

	/// Write an attribute on the open start tag. An empty `uri` means no
	/// namespace (unprefixed).
	pub fn write_attribute(&mut self, uri: &str, local_name: &NCNameStr, value: &str) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.attribute(uri, local_name, value, None);
		self.seal(result)
	}

	/// Write an attribute with a caller-chosen prefix.
	pub fn write_attribute_with_prefix(
		&mut self,
		prefix: &NCNameStr,
		uri: &str,
		local_name: &NCNameStr,
		value: &str,
	) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.attribute(uri, local_name, value, Some(prefix));
		self.seal(result)
	}

	/// Write character data, escaping as needed.
	pub fn write_text(&mut self, data: &str) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.text(data, false);
		self.seal(result)
	}

	/// Write character data as a CDATA section.
	pub fn write_cdata(&mut self, data: &str) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.text(data, true);
		self.seal(result)
	}

	/// Write a comment. The data must not contain `--` or end with `-`.
	pub fn write_comment(&mut self, data: &str) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.misc(MiscKind::Comment, data);
		self.seal(result)
	}

	/// Write a processing instruction. The data must not contain `?>`.
	pub fn write_pi(&mut self, target: &NCNameStr, data: Option<&str>) -> Result<()> {
		self.check_not_poisoned()?;
		match data {
			Some(data) => {
				let result = self.misc(MiscKind::Pi(target), data);
				self.seal(result)
			}
			None => {
				let result = self.misc(MiscKind::BarePi(target), "");
				self.seal(result)
			}
		}
	}

	/// Close the innermost open element.
	pub fn write_end_element(&mut self) -> Result<()> {
		self.check_not_poisoned()?;
		let result = self.end_element();
		self.seal(result)
	}

	/// Check that the document is complete and hand the sink back.
	pub fn finish(self) -> Result<S> {
		self.check_not_poisoned()?;
		if self.state != State::EndOfDocument {
			return Err(DocumentError::DocumentIncomplete.into());
		}
		Ok(self.sink)
	}

	fn xml_declaration(&mut self) -> Result<()> {
		if self.state != State::Start {
			return Err(DocumentError::MisplacedXmlDeclaration.into());
		}
		self.sink.write_xml_declaration()?;
		self.state = State::Declared;
		Ok(())
	}

	fn reject_reserved(prefix: &NCNameStr, uri: &str) -> Result<()> {
		if *prefix == **PREFIX_XML || *prefix == **PREFIX_XMLNS {
			return Err(NsError::MisboundPrefix {
				prefix: Some(prefix.to_ncname()),
				requested: uri.to_string(),
			}
			.into());
		}
		Ok(())
	}

	fn set_prefix_impl(&mut self, prefix: &NCNameStr, uri: &str) -> Result<()> {
		if self.state == State::EndOfDocument {
			return Err(DocumentError::EndOfDocument.into());
		}
		Self::reject_reserved(prefix, uri)?;
		if uri.is_empty() {
			// only the default namespace can be the empty namespace
			return Err(NsError::MisboundPrefix {
				prefix: Some(prefix.to_ncname()),
				requested: String::new(),
			}
			.into());
		}
		if self.options.repairing {
			self.registry.intern_with_prefix(uri, prefix);
		} else {
			let ns = self.registry.intern(uri);
			self.pending.set_prefix(prefix.to_ncname(), ns);
		}
		Ok(())
	}

	fn set_default_namespace_impl(&mut self, uri: &str) -> Result<()> {
		if self.state == State::EndOfDocument {
			return Err(DocumentError::EndOfDocument.into());
		}
		let ns = self.registry.intern(uri);
		if self.options.repairing {
			ns.suggest_default();
		} else {
			self.pending.set_default_namespace(ns);
		}
		Ok(())
	}

	fn close_head(&mut self) -> Result<()> {
		self.sink.write_head_end()?;
		self.state = State::Content;
		Ok(())
	}

	/// Mark the enclosing level as having children and emit the
	/// indentation for a child token at the current depth.
	fn indent_child(&mut self) -> Result<()> {
		if let Some(level) = self.levels.last_mut() {
			if level.had_text {
				level.had_children = true;
				return Ok(());
			}
			level.had_children = true;
		}
		if self.scopes.is_empty() {
			return Ok(());
		}
		if let Some(indent) = &self.options.indent {
			self.sink.write_raw_indentation(indent.slice(self.scopes.len()))?;
		}
		Ok(())
	}

	fn start_element(
		&mut self,
		uri: &str,
		local_name: &NCNameStr,
		explicit_prefix: Option<&NCNameStr>,
	) -> Result<()> {
		match self.state {
			State::EndOfDocument => return Err(DocumentError::EndOfDocument.into()),
			State::ElementHead => self.close_head()?,
			_ => (),
		}
		self.indent_child()?;
		let ns = self.registry.intern(uri);
		let decls = mem::take(&mut self.pending);
		let mark = self.bound_stack.len();
		let mut scope = ElementScope::open(
			self.scopes.last(),
			self.registry.empty_namespace(),
			local_name.to_ncname(),
			decls,
			!self.options.repairing,
		);
		let (prefix, new_decl) = if let Some(p) = explicit_prefix {
			self.resolve_explicit(&mut scope, p, &ns, true)?
		} else if self.options.repairing {
			self.repair_element_prefix(&mut scope, &ns)?
		} else {
			(self.resolve_strict(&scope, &ns, true)?, None)
		};
		scope.set_prefix(prefix.clone());
		self.sink.write_start_tag(prefix.as_deref(), local_name)?;
		match &new_decl {
			Some(NewDecl::Default(uri)) => self.sink.write_default_namespace_decl(uri)?,
			Some(NewDecl::Prefixed(prefix, uri)) => self.sink.write_namespace_decl(prefix, uri)?,
			None => (),
		}
		self.bound_marks.push(mark);
		self.scopes.push(scope);
		self.levels.push(Level::default());
		self.state = State::ElementHead;
		Ok(())
	}

	fn namespace_decl(&mut self, prefix: &NCNameStr, uri: &str) -> Result<()> {
		if self.state != State::ElementHead {
			return Err(DocumentError::NamespaceNotAllowed.into());
		}
		Self::reject_reserved(prefix, uri)?;
		if self.options.repairing {
			self.registry.intern_with_prefix(uri, prefix);
			return Ok(());
		}
		let ns = self.registry.intern(uri);
		let ctx = self.root_ctx.as_deref();
		let scope = match self.scopes.last_mut() {
			Some(scope) => scope,
			None => return Err(DocumentError::NamespaceNotAllowed.into()),
		};
		scope.check_ns_write(ctx, prefix, &ns)?;
		self.sink.write_namespace_decl(prefix, uri)
	}

	fn default_namespace_decl(&mut self, uri: &str) -> Result<()> {
		if self.state != State::ElementHead {
			return Err(DocumentError::NamespaceNotAllowed.into());
		}
		let ns = self.registry.intern(uri);
		if self.options.repairing {
			ns.suggest_default();
			return Ok(());
		}
		let scope = match self.scopes.last_mut() {
			Some(scope) => scope,
			None => return Err(DocumentError::NamespaceNotAllowed.into()),
		};
		scope.check_default_ns_write(&ns)?;
		self.sink.write_default_namespace_decl(uri)
	}

	fn attribute(
		&mut self,
		uri: &str,
		local_name: &NCNameStr,
		value: &str,
		explicit_prefix: Option<&NCNameStr>,
	) -> Result<()> {
		if self.state != State::ElementHead {
			return Err(DocumentError::AttributeNotAllowed.into());
		}
		let mut scope = match self.scopes.pop() {
			Some(scope) => scope,
			None => return Err(DocumentError::AttributeNotAllowed.into()),
		};
		let result = self.attribute_in(&mut scope, uri, local_name, value, explicit_prefix);
		self.scopes.push(scope);
		result
	}

	fn attribute_in(
		&mut self,
		scope: &mut ElementScope,
		uri: &str,
		local_name: &NCNameStr,
		value: &str,
		explicit_prefix: Option<&NCNameStr>,
	) -> Result<()> {
		scope.check_attr_write(uri, local_name, value)?;
		if uri.is_empty() && explicit_prefix.is_none() {
			return self.sink.write_attribute(None, local_name, value);
		}
		let ns = self.registry.intern(uri);
		let (prefix, new_decl) = if let Some(p) = explicit_prefix {
			self.resolve_explicit(scope, p, &ns, false)?
		} else if self.options.repairing {
			self.repair_attribute_prefix(scope, &ns)?
		} else {
			(self.resolve_strict(scope, &ns, false)?, None)
		};
		if let Some(NewDecl::Prefixed(prefix, uri)) = &new_decl {
			self.sink.write_namespace_decl(prefix, uri)?;
		}
		self.sink.write_attribute(prefix.as_deref(), local_name, value)
	}

	fn text(&mut self, data: &str, cdata: bool) -> Result<()> {
		match self.state {
			State::ElementHead => self.close_head()?,
			State::Content => (),
			State::EndOfDocument => return Err(DocumentError::EndOfDocument.into()),
			_ => return Err(DocumentError::TextNotAllowed.into()),
		}
		if let Some(level) = self.levels.last_mut() {
			level.had_text = true;
		}
		if cdata {
			self.sink.write_cdata(data)
		} else {
			self.sink.write_text(data)
		}
	}

	fn misc(&mut self, kind: MiscKind, data: &str) -> Result<()> {
		match self.state {
			State::EndOfDocument => return Err(DocumentError::EndOfDocument.into()),
			State::ElementHead => self.close_head()?,
			State::Start => self.state = State::Declared,
			_ => (),
		}
		self.indent_child()?;
		match kind {
			MiscKind::Comment => self.sink.write_comment(data),
			MiscKind::Pi(target) => self.sink.write_pi(target, Some(data)),
			MiscKind::BarePi(target) => self.sink.write_pi(target, None),
		}
	}

	fn end_element(&mut self) -> Result<()> {
		match self.state {
			State::EndOfDocument => return Err(DocumentError::EndOfDocument.into()),
			State::ElementHead => self.close_head()?,
			State::Content => (),
			_ => return Err(DocumentError::ElementFootNotAllowed.into()),
		}
		let mut scope = match self.scopes.pop() {
			Some(scope) => scope,
			None => return Err(DocumentError::ElementFootNotAllowed.into()),
		};
		if !self.options.repairing {
			scope.check_all_ns_written()?;
		}
		if let Some(level) = self.levels.pop() {
			if level.had_children && !level.had_text {
				if let Some(indent) = &self.options.indent {
					self.sink
						.write_raw_indentation(indent.slice(self.scopes.len()))?;
				}
			}
		}
		self.sink.write_end_tag(scope.prefix(), scope.local_name())?;
		let mark = self.bound_marks.pop().unwrap_or(0);
		while self.bound_stack.len() > mark {
			if let Some(ns) = self.bound_stack.pop() {
				ns.unbind();
			}
		}
		self.state = if self.scopes.is_empty() {
			State::EndOfDocument
		} else {
			State::Content
		};
		Ok(())
	}

	/// Whether `prefix` resolves to `ns` at the current scope, either
	/// through a visible declaration or through the root context.
	///
	/// Live bindings and root adoptions are recorded on the [`Namespace`]
	/// only; a descendant declaration can rebind the prefix, so the fast
	/// path has to be checked against the scope before it is reused.
	fn prefix_resolves_to(
		&self,
		scope: &ElementScope,
		prefix: &NCNameStr,
		ns: &RcPtr<Namespace>,
	) -> bool {
		match scope.is_prefix_valid(Some(prefix), ns, false) {
			PrefixStatus::Ok => true,
			PrefixStatus::Misbound => false,
			PrefixStatus::Unbound => match self.root_ctx.as_deref() {
				Some(ctx) => ctx.uri_for(prefix).map_or(false, |uri| uri == ns.uri()),
				None => false,
			},
		}
	}

	/// Resolve a namespace in non-repairing mode: declarations in scope,
	/// then the root context, else an error.
	fn resolve_strict(
		&self,
		scope: &ElementScope,
		ns: &RcPtr<Namespace>,
		for_element: bool,
	) -> Result<Option<NCName>> {
		if ns.is_empty_uri() {
			if !for_element {
				return Ok(None);
			}
			return if RcPtr::ptr_eq(ns, scope.default_ns()) {
				Ok(None)
			} else {
				// a different default namespace is active and the caller
				// did not redeclare it
				Err(NsError::Undeclared { uri: String::new() }.into())
			};
		}
		if let Some(resolved) = scope.find_prefix(ns, for_element) {
			return Ok(resolved);
		}
		if let Some(prefix) = self.find_root_prefix(ns) {
			if self.prefix_resolves_to(scope, &prefix, ns) {
				ns.bind_permanently_as(prefix.clone());
				return Ok(Some(prefix));
			}
		}
		Err(NsError::Undeclared {
			uri: ns.uri().to_string(),
		}
		.into())
	}

	/// Validate a caller-chosen prefix; in repairing mode an unbound
	/// prefix is declared on the current element instead of rejected.
	fn resolve_explicit(
		&mut self,
		scope: &mut ElementScope,
		prefix: &NCNameStr,
		ns: &RcPtr<Namespace>,
		for_element: bool,
	) -> Result<(Option<NCName>, Option<NewDecl>)> {
		if *prefix == **PREFIX_XMLNS || ns.is_empty_uri() {
			return Err(NsError::MisboundPrefix {
				prefix: Some(prefix.to_ncname()),
				requested: ns.uri().to_string(),
			}
			.into());
		}
		match scope.is_prefix_valid(Some(prefix), ns, for_element) {
			PrefixStatus::Ok => Ok((Some(prefix.to_ncname()), None)),
			PrefixStatus::Misbound => Err(NsError::MisboundPrefix {
				prefix: Some(prefix.to_ncname()),
				requested: ns.uri().to_string(),
			}
			.into()),
			PrefixStatus::Unbound => {
				if !self.options.repairing {
					return Err(NsError::Undeclared {
						uri: ns.uri().to_string(),
					}
					.into());
				}
				let prefix = prefix.to_ncname();
				ns.bind_as(prefix.clone());
				self.bound_stack.push(ns.clone());
				scope.add_prefix(prefix.clone(), ns.clone());
				Ok((
					Some(prefix.clone()),
					Some(NewDecl::Prefixed(prefix, ns.uri().to_string())),
				))
			}
		}
	}

	/// Pick a prefix for an element namespace in repairing mode.
	fn repair_element_prefix(
		&mut self,
		scope: &mut ElementScope,
		ns: &RcPtr<Namespace>,
	) -> Result<(Option<NCName>, Option<NewDecl>)> {
		// 1. the active default namespace needs no prefix at all
		if RcPtr::ptr_eq(ns, scope.default_ns()) {
			return Ok((None, None));
		}
		// 2. the empty namespace cannot be bound to a prefix; when a
		//    foreign default is active it must be redeclared as xmlns=""
		if ns.is_empty_uri() {
			scope.declare_default(ns.clone());
			return Ok((None, Some(NewDecl::Default(String::new()))));
		}
		// 3. a binding still live anywhere up the tree, unless a nested
		//    declaration rebound the prefix since
		if let Some(prefix) = ns.bound_prefix() {
			if self.prefix_resolves_to(scope, &prefix, ns) {
				return Ok((Some(prefix), None));
			}
		}
		// 4. a binding inherited from the root context, adopted without
		//    emitting a declaration
		if let Some(prefix) = self.find_root_prefix(ns) {
			if self.prefix_resolves_to(scope, &prefix, ns) {
				ns.bind_permanently_as(prefix.clone());
				return Ok((Some(prefix), None));
			}
		}
		// 5. a fresh binding
		if ns.prefers_default() || self.options.prefer_default_namespace {
			scope.declare_default(ns.clone());
			return Ok((None, Some(NewDecl::Default(ns.uri().to_string()))));
		}
		let prefix = self.pick_fresh_prefix(ns);
		ns.bind_as(prefix.clone());
		self.bound_stack.push(ns.clone());
		scope.add_prefix(prefix.clone(), ns.clone());
		Ok((
			Some(prefix.clone()),
			Some(NewDecl::Prefixed(prefix, ns.uri().to_string())),
		))
	}

	/// Pick a prefix for an attribute namespace in repairing mode.
	/// Attributes never use the default namespace.
	fn repair_attribute_prefix(
		&mut self,
		scope: &mut ElementScope,
		ns: &RcPtr<Namespace>,
	) -> Result<(Option<NCName>, Option<NewDecl>)> {
		if let Some(prefix) = ns.bound_prefix() {
			if self.prefix_resolves_to(scope, &prefix, ns) {
				return Ok((Some(prefix), None));
			}
		}
		if let Some(prefix) = self.find_root_prefix(ns) {
			if self.prefix_resolves_to(scope, &prefix, ns) {
				ns.bind_permanently_as(prefix.clone());
				return Ok((Some(prefix), None));
			}
		}
		let prefix = match ns.last_bound_prefix() {
			Some(p) if !self.is_prefix_taken(&p) => p,
			_ => match ns.preferred_prefix() {
				Some(p) if !self.is_prefix_taken(&p) => p,
				_ => scope.generate_prefix(self.root_ctx.as_deref(), &self.options.auto_prefix_base),
			},
		};
		ns.bind_as(prefix.clone());
		self.bound_stack.push(ns.clone());
		scope.add_prefix(prefix.clone(), ns.clone());
		Ok((
			Some(prefix.clone()),
			Some(NewDecl::Prefixed(prefix, ns.uri().to_string())),
		))
	}

	fn pick_fresh_prefix(&mut self, ns: &RcPtr<Namespace>) -> NCName {
		if let Some(prefix) = ns.last_bound_prefix() {
			if !self.is_prefix_taken(&prefix) {
				return prefix;
			}
		}
		if let Some(prefix) = ns.preferred_prefix() {
			if !self.is_prefix_taken(&prefix) {
				return prefix;
			}
		}
		self.generate_unbound_prefix()
	}

	/// Whether a prefix is reserved, live-bound, or spoken for by the
	/// root context.
	fn is_prefix_taken(&self, prefix: &NCNameStr) -> bool {
		if *prefix == **PREFIX_XML || *prefix == **PREFIX_XMLNS {
			return true;
		}
		for ns in &self.bound_stack {
			if ns.bound_prefix().map_or(false, |p| p == *prefix) {
				return true;
			}
		}
		if let Some(ctx) = &self.root_ctx {
			if ctx.uri_for(prefix).is_some() {
				return true;
			}
		}
		false
	}

	/// Generate a fresh prefix from the document-wide counter.
	fn generate_unbound_prefix(&mut self) -> NCName {
		loop {
			let candidate = format!("{}{}", self.options.auto_prefix_base, self.auto_seq);
			self.auto_seq += 1;
			// SAFETY: the base is a valid NCName and ASCII digits are
			// valid name characters.
			let candidate = unsafe { NCName::from_str_unchecked(candidate) };
			if !self.is_prefix_taken(&candidate) {
				return candidate;
			}
		}
	}

	fn find_root_prefix(&self, ns: &RcPtr<Namespace>) -> Option<NCName> {
		let ctx = self.root_ctx.as_deref()?;
		let prefix = ctx.prefix_for(ns.uri())?;
		if prefix.is_empty() {
			// a root default binding cannot be adopted without a
			// declaration
			return None;
		}
		let prefix = NCNameStr::from_str(prefix).ok()?;
		Some(prefix.to_ncname())
	}
}

enum MiscKind<'x> {
	Comment,
	Pi(&'x NCNameStr),
	BarePi(&'x NCNameStr),
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scope::RootContext;
	use bytes::BytesMut;
	use std::convert::TryInto;

	fn name<'x>(s: &'x str) -> &'x NCNameStr {
		NCNameStr::from_str(s).unwrap()
	}

	fn strict() -> Writer<BufSink> {
		Writer::new(BufSink::new())
	}

	fn repairing() -> Writer<BufSink> {
		Writer::with_options(BufSink::new(), WriterOptions::default().repairing(true))
	}

	fn finish_bytes(w: Writer<BufSink>) -> BytesMut {
		w.finish().unwrap().into_inner()
	}

	#[test]
	fn plain_document() {
		let mut w = strict();
		w.write_start_element("", name("root")).unwrap();
		w.write_text("hello").unwrap();
		w.write_end_element().unwrap();
		assert_eq!(&finish_bytes(w)[..], b"<root>hello</root>");
	}

	#[test]
	fn xml_declaration_must_come_first() {
		let mut w = strict();
		w.write_xml_declaration().unwrap();
		w.write_start_element("", name("root")).unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<root></root>"[..]
		);

		let mut w = strict();
		w.write_comment(" x ").unwrap();
		assert!(matches!(
			w.write_xml_declaration(),
			Err(Error::Document(DocumentError::MisplacedXmlDeclaration))
		));
	}

	#[test]
	fn strict_undeclared_namespace_is_an_error() {
		let mut w = strict();
		match w.write_start_element("urn:x", name("a")) {
			Err(Error::Ns(NsError::Undeclared { uri })) => assert_eq!(uri, "urn:x"),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn strict_declared_flow() {
		let mut w = strict();
		w.set_prefix(name("p"), "urn:x").unwrap();
		w.write_start_element("urn:x", name("root")).unwrap();
		w.write_namespace(name("p"), "urn:x").unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<p:root xmlns:p=\"urn:x\"></p:root>"[..]
		);
	}

	#[test]
	fn strict_default_namespace_flow() {
		let mut w = strict();
		w.set_default_namespace("urn:x").unwrap();
		w.write_start_element("urn:x", name("root")).unwrap();
		w.write_default_namespace("urn:x").unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<root xmlns=\"urn:x\"></root>"[..]
		);
	}

	#[test]
	fn strict_unwritten_declaration_fails_at_close() {
		let mut w = strict();
		w.set_prefix(name("p"), "urn:x").unwrap();
		w.write_start_element("", name("root")).unwrap();
		match w.write_end_element() {
			Err(Error::Ns(NsError::UnusedDeclaration { prefix: Some(p) })) => {
				assert_eq!(p.as_str(), "p")
			}
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn errors_poison_the_writer() {
		let mut w = strict();
		w.set_prefix(name("p"), "urn:x").unwrap();
		w.write_start_element("", name("root")).unwrap();
		let first = w.write_end_element().unwrap_err();
		let second = w.write_text("x").unwrap_err();
		assert_eq!(first, second);
		assert_eq!(w.finish().unwrap_err(), first);
	}

	#[test]
	fn repairing_invents_a_prefix() {
		let mut w = repairing();
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<ns1:a xmlns:ns1=\"urn:x\"></ns1:a>"[..]
		);
	}

	#[test]
	fn repairing_reuses_the_live_binding() {
		let mut w = repairing();
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_start_element("urn:x", name("b")).unwrap();
		w.write_end_element().unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<ns1:a xmlns:ns1=\"urn:x\"><ns1:b></ns1:b></ns1:a>"[..]
		);
	}

	#[test]
	fn repairing_honours_prefix_hints() {
		let mut w = repairing();
		w.set_prefix(name("p"), "urn:x").unwrap();
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_end_element().unwrap();
		assert_eq!(&finish_bytes(w)[..], &b"<p:a xmlns:p=\"urn:x\"></p:a>"[..]);
	}

	#[test]
	fn repairing_honours_default_hints() {
		let mut w = repairing();
		w.set_default_namespace("urn:x").unwrap();
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_end_element().unwrap();
		assert_eq!(&finish_bytes(w)[..], &b"<a xmlns=\"urn:x\"></a>"[..]);
	}

	#[test]
	fn repairing_can_prefer_the_default_globally() {
		let mut w = Writer::with_options(
			BufSink::new(),
			WriterOptions::default()
				.repairing(true)
				.prefer_default_namespace(true),
		);
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_end_element().unwrap();
		assert_eq!(&finish_bytes(w)[..], &b"<a xmlns=\"urn:x\"></a>"[..]);
	}

	#[test]
	fn repairing_attribute_gets_a_prefix() {
		let mut w = repairing();
		w.write_start_element("", name("a")).unwrap();
		w.write_attribute("urn:y", name("k"), "v").unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<a xmlns:ns1=\"urn:y\" ns1:k=\"v\"></a>"[..]
		);
	}

	#[test]
	fn attributes_never_use_the_default_namespace() {
		let mut w = repairing();
		w.set_default_namespace("urn:x").unwrap();
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_attribute("urn:x", name("k"), "v").unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<a xmlns=\"urn:x\" xmlns:ns1=\"urn:x\" ns1:k=\"v\"></a>"[..]
		);
	}

	#[test]
	fn repairing_rebinds_the_empty_namespace() {
		let mut w = repairing();
		w.set_default_namespace("urn:x").unwrap();
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_start_element("", name("plain")).unwrap();
		w.write_end_element().unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<a xmlns=\"urn:x\"><plain xmlns=\"\"></plain></a>"[..]
		);
	}

	#[test]
	fn closed_bindings_are_reused_for_siblings() {
		let mut w = repairing();
		w.write_start_element("", name("r")).unwrap();
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_end_element().unwrap();
		w.write_start_element("urn:x", name("b")).unwrap();
		w.write_end_element().unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<r><ns1:a xmlns:ns1=\"urn:x\"></ns1:a><ns1:b xmlns:ns1=\"urn:x\"></ns1:b></r>"[..]
		);
	}

	#[test]
	fn root_context_bindings_are_adopted_silently() {
		let mut ctx = RootContext::new();
		ctx.bind("p".try_into().unwrap(), "urn:x");
		let mut w = repairing();
		w.set_root_context(Box::new(ctx));
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_end_element().unwrap();
		assert_eq!(&finish_bytes(w)[..], b"<p:a></p:a>");
	}

	#[test]
	fn strict_mode_falls_back_to_the_root_context() {
		let mut ctx = RootContext::new();
		ctx.bind("p".try_into().unwrap(), "urn:x");
		let mut w = strict();
		w.set_root_context(Box::new(ctx));
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_end_element().unwrap();
		assert_eq!(&finish_bytes(w)[..], b"<p:a></p:a>");
	}

	#[test]
	fn rebound_adopted_prefixes_are_not_reused() {
		let mut ctx = RootContext::new();
		ctx.bind("p".try_into().unwrap(), "urn:x");
		let mut w = repairing();
		w.set_root_context(Box::new(ctx));
		w.write_start_element("urn:x", name("a")).unwrap();
		// rebinds p away from urn:x for this subtree
		w.write_start_element_with_prefix(name("p"), "urn:y", name("b"))
			.unwrap();
		w.write_attribute("urn:x", name("k"), "v").unwrap();
		w.write_start_element("urn:x", name("c")).unwrap();
		w.write_end_element().unwrap();
		w.write_end_element().unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<p:a><p:b xmlns:p=\"urn:y\" xmlns:ns1=\"urn:x\" ns1:k=\"v\">\
			   <ns1:c></ns1:c></p:b></p:a>"[..]
		);
	}

	#[test]
	fn rebound_root_prefixes_do_not_resolve_strictly() {
		let mut ctx = RootContext::new();
		ctx.bind("p".try_into().unwrap(), "urn:x");
		let mut w = strict();
		w.set_root_context(Box::new(ctx));
		w.set_prefix(name("p"), "urn:y").unwrap();
		w.write_start_element("urn:y", name("a")).unwrap();
		w.write_namespace(name("p"), "urn:y").unwrap();
		match w.write_start_element("urn:x", name("b")) {
			Err(Error::Ns(NsError::Undeclared { uri })) => assert_eq!(uri, "urn:x"),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn explicit_prefix_requires_a_declaration_in_strict_mode() {
		let mut w = strict();
		assert!(matches!(
			w.write_start_element_with_prefix(name("p"), "urn:x", name("a")),
			Err(Error::Ns(NsError::Undeclared { .. }))
		));

		let mut w = strict();
		w.set_prefix(name("p"), "urn:x").unwrap();
		w.write_start_element_with_prefix(name("p"), "urn:x", name("a"))
			.unwrap();
		w.write_namespace(name("p"), "urn:x").unwrap();
		w.write_end_element().unwrap();
		assert_eq!(&finish_bytes(w)[..], &b"<p:a xmlns:p=\"urn:x\"></p:a>"[..]);
	}

	#[test]
	fn explicit_prefix_is_declared_in_repairing_mode() {
		let mut w = repairing();
		w.write_start_element_with_prefix(name("p"), "urn:x", name("a"))
			.unwrap();
		w.write_end_element().unwrap();
		assert_eq!(&finish_bytes(w)[..], &b"<p:a xmlns:p=\"urn:x\"></p:a>"[..]);
	}

	#[test]
	fn misbound_prefix_is_rejected() {
		let mut w = strict();
		w.set_prefix(name("p"), "urn:x").unwrap();
		w.write_start_element("", name("root")).unwrap();
		match w.write_attribute_with_prefix(name("p"), "urn:y", name("k"), "v") {
			Err(Error::Ns(NsError::MisboundPrefix { prefix: Some(p), requested })) => {
				assert_eq!(p.as_str(), "p");
				assert_eq!(requested, "urn:y");
			}
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn duplicate_attributes_are_rejected_in_repairing_mode() {
		let mut w = repairing();
		w.write_start_element("", name("a")).unwrap();
		w.write_attribute("urn:x", name("k"), "1").unwrap();
		assert!(matches!(
			w.write_attribute("urn:x", name("k"), "2"),
			Err(Error::Ns(NsError::DuplicateAttribute { .. }))
		));
	}

	#[test]
	fn reserved_prefixes_cannot_be_declared() {
		let mut w = strict();
		assert!(matches!(
			w.set_prefix(name("xmlns"), "urn:x"),
			Err(Error::Ns(NsError::MisboundPrefix { .. }))
		));
	}

	#[test]
	fn xml_prefix_needs_no_declaration() {
		let mut w = strict();
		w.write_start_element("", name("root")).unwrap();
		w.write_attribute(
			"http://www.w3.org/XML/1998/namespace",
			name("lang"),
			"en",
		)
		.unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<root xml:lang=\"en\"></root>"[..]
		);
	}

	#[test]
	fn indentation_is_fixed_step_and_text_suppressed() {
		let mut w = Writer::with_options(
			BufSink::new(),
			WriterOptions::default().indent(Some(Indent::spaces(2))),
		);
		w.write_start_element("", name("root")).unwrap();
		w.write_start_element("", name("a")).unwrap();
		w.write_text("text").unwrap();
		w.write_end_element().unwrap();
		w.write_start_element("", name("b")).unwrap();
		w.write_start_element("", name("c")).unwrap();
		w.write_end_element().unwrap();
		w.write_end_element().unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<root>\n  <a>text</a>\n  <b>\n    <c></c>\n  </b>\n</root>"[..]
		);
	}

	#[test]
	fn multibyte_indentation_text_is_clamped_to_char_boundaries() {
		let mut w = Writer::with_options(
			BufSink::new(),
			WriterOptions::default().indent(Some(Indent::new("\n\u{a0}\u{a0}", 1, 1))),
		);
		w.write_start_element("", name("root")).unwrap();
		w.write_start_element("", name("a")).unwrap();
		w.write_start_element("", name("b")).unwrap();
		w.write_end_element().unwrap();
		w.write_end_element().unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<root>\n<a>\n\xc2\xa0<b></b>\n</a>\n</root>"[..]
		);
	}

	#[test]
	fn inherited_declarations_cannot_be_written_again() {
		let mut w = strict();
		w.set_prefix(name("p"), "urn:x").unwrap();
		w.write_start_element("urn:x", name("a")).unwrap();
		w.write_namespace(name("p"), "urn:x").unwrap();
		w.write_start_element("urn:x", name("b")).unwrap();
		match w.write_namespace(name("p"), "urn:x") {
			Err(Error::Ns(NsError::Undeclared { uri })) => assert_eq!(uri, "urn:x"),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn content_after_the_root_element_is_rejected() {
		let mut w = strict();
		w.write_start_element("", name("root")).unwrap();
		w.write_end_element().unwrap();
		assert!(matches!(
			w.write_text("x"),
			Err(Error::Document(DocumentError::EndOfDocument))
		));
	}

	#[test]
	fn incomplete_documents_are_rejected_by_finish() {
		let mut w = strict();
		w.write_start_element("", name("root")).unwrap();
		assert!(matches!(
			w.finish(),
			Err(Error::Document(DocumentError::DocumentIncomplete))
		));

		let w = strict();
		assert!(matches!(
			w.finish(),
			Err(Error::Document(DocumentError::DocumentIncomplete))
		));
	}

	#[test]
	fn attributes_are_only_allowed_in_the_head() {
		let mut w = strict();
		w.write_start_element("", name("root")).unwrap();
		w.write_text("x").unwrap();
		assert!(matches!(
			w.write_attribute("", name("k"), "v"),
			Err(Error::Document(DocumentError::AttributeNotAllowed))
		));
	}

	#[test]
	fn comments_and_pis_in_the_prolog() {
		let mut w = strict();
		w.write_xml_declaration().unwrap();
		w.write_comment(" c ").unwrap();
		w.write_pi(name("t"), Some("d")).unwrap();
		w.write_start_element("", name("root")).unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!-- c --><?t d?><root></root>"[..]
		);
	}

	#[test]
	fn cdata_counts_as_text_for_indentation() {
		let mut w = Writer::with_options(
			BufSink::new(),
			WriterOptions::default().indent(Some(Indent::spaces(2))),
		);
		w.write_start_element("", name("root")).unwrap();
		w.write_cdata("raw").unwrap();
		w.write_start_element("", name("a")).unwrap();
		w.write_end_element().unwrap();
		w.write_end_element().unwrap();
		assert_eq!(
			&finish_bytes(w)[..],
			&b"<root><![CDATA[raw]]><a></a></root>"[..]
		);
	}
}
