/*!
# Streaming, namespace-repairing XML 1.0 writer

This crate emits namespace-well-formed XML 1.0 documents token by token.
Its core is a namespace binding engine: element and attribute names are
passed as `(uri, local_name)` pairs, and the [`Writer`] either validates
the prefix bindings the caller declared (non-repairing mode) or picks,
reuses and invents prefixes itself, emitting the necessary `xmlns`
declarations along the way (repairing mode).

Namespace URIs are interned per document ([`NamespaceRegistry`]), so all
binding decisions compare cheap reference identities instead of strings.
The declarations visible at each element are kept in copy-on-write
lexical scopes: an element which declares nothing shares its parent's
binding list outright.

## Quick start

```rust
use xmlout::{Writer, WriterOptions, BufSink};
use std::convert::TryInto;

let mut w = Writer::with_options(
	BufSink::new(),
	WriterOptions::default().repairing(true),
);
w.set_prefix("jc".try_into()?, "urn:example:jclark")?;
w.write_start_element("urn:example:jclark", "doc".try_into()?)?;
w.write_attribute("", "version".try_into()?, "1")?;
w.write_text("hello")?;
w.write_end_element()?;
let buf = w.finish()?.into_inner();
assert_eq!(
	&buf[..],
	&b"<jc:doc xmlns:jc=\"urn:example:jclark\" version=\"1\">hello</jc:doc>"[..],
);
# Ok::<(), xmlout::Error>(())
```

Output goes to a [`Sink`]; [`BufSink`] collects the document in memory
and [`IoSink`] streams it to any [`std::io::Write`].

## Non-goals

This is a writer only: there is no parsing, no tree API, no DTD or schema
validation, and no entity expansion. Text and attribute values are
escaped, nothing more.
*/
pub mod error;
pub mod registry;
pub mod scope;
pub mod strings;
pub mod writer;

#[cfg(test)]
mod tests;

#[doc(inline)]
pub use error::{DocumentError, Error, NsError, Result};
#[doc(inline)]
pub use registry::{Namespace, NamespaceRegistry, RcPtr, XMLNS_XML, XMLNS_XMLNS};
#[doc(inline)]
pub use scope::{Declarations, ElementScope, NamespaceContext, PrefixStatus, RootContext};
#[doc(inline)]
pub use strings::{NCName, NCNameStr, NameError};
#[doc(inline)]
pub use writer::{BufSink, Indent, IoSink, Sink, Writer, WriterOptions};

/// XML version implemented by this crate.
pub const XML_VERSION: &'static str = "1.0";
